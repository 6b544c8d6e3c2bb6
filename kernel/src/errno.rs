//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 标准错误代码定义
//!
//! 和 include/uapi/asm-generic/errno.h 编号一致，只保留调度与线程子系统用到的部分

/// 标准错误代码
///
/// 使用方法：
/// ```rust
/// use rux_lwp::errno::Errno;
///
/// fn lookup(found: bool) -> Result<(), Errno> {
///     if !found {
///         return Err(Errno::NoSuchProcess);
///     }
///     Ok(())
/// }
///
/// assert_eq!(lookup(false).unwrap_err().as_neg_i32(), -3);
/// ```
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Errno {
    /// Operation not permitted (EPERM, 1)
    OperationNotPermitted = 1,

    /// No such process (ESRCH, 3)
    NoSuchProcess = 3,

    /// Interrupted system call (EINTR, 4)
    InterruptedSystemCall = 4,

    /// No child process (ECHILD, 10)
    NoChild = 10,

    /// Try again (EAGAIN, 11)
    TryAgain = 11,

    /// Out of memory (ENOMEM, 12)
    OutOfMemory = 12,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,

    /// Too many open files (EMFILE, 24)
    TooManyOpenFiles = 24,

    /// Resource deadlock would occur (EDEADLK, 35)
    DeadlockWouldOccur = 35,
}

impl Errno {
    /// 获取错误代码的正数值（用于比较）
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 获取错误代码的负数值（用于系统调用返回）
    #[inline]
    pub const fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }

    /// 获取错误代码的负数值（isize，用于系统调用返回）
    #[inline]
    pub const fn as_neg_isize(self) -> isize {
        -(self as i32) as isize
    }
}

/// 内核内部统一的结果类型
pub type KResult<T> = Result<T, Errno>;

/// 常用的错误代码常量
pub mod constants {
    pub const EPERM: i32 = 1;
    pub const ESRCH: i32 = 3;
    pub const EINTR: i32 = 4;
    pub const ECHILD: i32 = 10;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EINVAL: i32 = 22;
    pub const EMFILE: i32 = 24;
    pub const EDEADLK: i32 = 35;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_values() {
        assert_eq!(Errno::NoSuchProcess.as_i32(), constants::ESRCH);
        assert_eq!(Errno::TryAgain.as_i32(), constants::EAGAIN);
        assert_eq!(Errno::OutOfMemory.as_i32(), constants::ENOMEM);
        assert_eq!(Errno::InvalidArgument.as_i32(), constants::EINVAL);
        assert_eq!(Errno::DeadlockWouldOccur.as_i32(), constants::EDEADLK);
    }

    #[test]
    fn test_errno_negative() {
        assert_eq!(Errno::NoSuchProcess.as_neg_i32(), -3);
        assert_eq!(Errno::NoChild.as_neg_isize(), -10);
        assert_eq!(Errno::InvalidArgument.as_neg_isize(), -22);
    }
}
