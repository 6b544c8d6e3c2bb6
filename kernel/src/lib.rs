//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Rux LWP：混合调度器与轻量级进程
//!
//! 内核的调度与线程子系统：
//! - 多级反馈队列 + 比例份额 (stride) 的混合调度
//! - 同一地址空间内的轻量级进程 (thread_create/exit/join)
//! - sleep/wakeup 阻塞原语，以及建立在它之上的信号量和读写锁
//!
//! 内存管理和文件系统是外部服务，通过 `mm::Vm`、`fs::Vfs` 接入。
//! 平台相关的上下文切换和中断控制在 `arch` 中，目前提供宿主机用户态移植 `arch::um`。

#![no_std]

extern crate alloc;
#[cfg(feature = "um")]
extern crate std;

pub mod arch;
pub mod config;
pub mod errno;
pub mod fs;
pub mod kernel;
pub mod mm;
pub mod process;
pub mod sched;
pub mod sync;
pub mod syscall;

#[cfg(test)]
mod tests;

pub use errno::{Errno, KResult};
pub use kernel::Kernel;
pub use process::{Pid, ProcState, StartRoutine, ThreadHandle, Tid};
