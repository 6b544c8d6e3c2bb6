//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 系统调用入口
//!
//! 对应 xv6 的 sysproc.c：把内核接口包装成返回 `isize` 的系统调用，
//! 失败时返回负的错误码。每个调用返回前经过 `trap_return`，被 kill 的调用者在这里退出。
//!
//! um 中用户指针就是宿主机引用，输出参数直接以 `&mut` 传入。

use crate::errno::{Errno, KResult};
use crate::kernel::Kernel;
use crate::process::{StartRoutine, ThreadHandle};
use crate::sync::{RwLock, Semaphore};

/// 返回用户态
fn ret(kernel: &'static Kernel, result: KResult<isize>) -> isize {
    kernel.trap_return();
    match result {
        Ok(value) => value,
        Err(e) => e.as_neg_isize(),
    }
}

pub fn sys_thread_create(
    kernel: &'static Kernel,
    thread: &mut ThreadHandle,
    routine: StartRoutine,
    arg: usize,
) -> isize {
    let result = kernel.thread_create(routine, arg).map(|handle| {
        *thread = handle;
        0
    });
    ret(kernel, result)
}

pub fn sys_thread_exit(kernel: &'static Kernel, retval: usize) -> ! {
    kernel.thread_exit(retval)
}

pub fn sys_thread_join(kernel: &'static Kernel, thread: ThreadHandle, retval: &mut usize) -> isize {
    let result = kernel.thread_join(thread).map(|value| {
        *retval = value;
        0
    });
    ret(kernel, result)
}

pub fn sys_getlev(kernel: &'static Kernel) -> isize {
    let level = kernel.get_feedback_level();
    ret(kernel, Ok(level as isize))
}

pub fn sys_set_cpu_share(kernel: &'static Kernel, share: i32) -> isize {
    let result = kernel.set_cpu_share(share).map(|_| 0);
    ret(kernel, result)
}

pub fn sys_yield(kernel: &'static Kernel) -> isize {
    kernel.yield_now();
    ret(kernel, Ok(0))
}

pub fn sys_xem_init(kernel: &'static Kernel, sem: &Semaphore) -> isize {
    sem.init(1);
    ret(kernel, Ok(0))
}

pub fn sys_xem_wait(kernel: &'static Kernel, sem: &Semaphore) -> isize {
    sem.wait(kernel);
    ret(kernel, Ok(0))
}

pub fn sys_xem_post(kernel: &'static Kernel, sem: &Semaphore) -> isize {
    sem.post(kernel);
    ret(kernel, Ok(0))
}

pub fn sys_rwlock_init(kernel: &'static Kernel, rw: &RwLock) -> isize {
    rw.init();
    ret(kernel, Ok(0))
}

pub fn sys_rwlock_acquire_read(kernel: &'static Kernel, rw: &RwLock) -> isize {
    rw.acquire_read(kernel);
    ret(kernel, Ok(0))
}

pub fn sys_rwlock_release_read(kernel: &'static Kernel, rw: &RwLock) -> isize {
    rw.release_read(kernel);
    ret(kernel, Ok(0))
}

pub fn sys_rwlock_acquire_write(kernel: &'static Kernel, rw: &RwLock) -> isize {
    rw.acquire_write(kernel);
    ret(kernel, Ok(0))
}

pub fn sys_rwlock_release_write(kernel: &'static Kernel, rw: &RwLock) -> isize {
    rw.release_write(kernel);
    ret(kernel, Ok(0))
}

pub fn sys_fork(kernel: &'static Kernel, routine: StartRoutine, arg: usize) -> isize {
    let result = kernel.fork(routine, arg).map(|pid| pid as isize);
    ret(kernel, result)
}

pub fn sys_exit(kernel: &'static Kernel, status: i32) -> ! {
    kernel.exit(status)
}

/// 返回子进程 pid，`status` 非空时写入退出状态
pub fn sys_wait(kernel: &'static Kernel, status: Option<&mut i32>) -> isize {
    let result = kernel.wait().map(|(pid, xstate)| {
        if let Some(status) = status {
            *status = xstate;
        }
        pid as isize
    });
    ret(kernel, result)
}

pub fn sys_kill(kernel: &'static Kernel, pid: i32) -> isize {
    let result = if pid <= 0 {
        Err(Errno::NoSuchProcess)
    } else {
        kernel.kill(pid as u32).map(|_| 0)
    };
    ret(kernel, result)
}

pub fn sys_getpid(kernel: &'static Kernel) -> isize {
    let pid = kernel.getpid();
    ret(kernel, Ok(pid as isize))
}

pub fn sys_sbrk(kernel: &'static Kernel, n: isize) -> isize {
    let result = kernel.sbrk(n).map(|old| old as isize);
    ret(kernel, result)
}

pub fn sys_sleep(kernel: &'static Kernel, n: i32) -> isize {
    let result = if n < 0 {
        Err(Errno::InvalidArgument)
    } else {
        kernel.sleep_ticks(n as u64).map(|_| 0)
    };
    ret(kernel, result)
}

pub fn sys_uptime(kernel: &'static Kernel) -> isize {
    let ticks = kernel.uptime();
    ret(kernel, Ok(ticks as isize))
}
