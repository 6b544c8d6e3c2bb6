//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程管理模块
//!
//! 对应 Linux 的 kernel/fork.c、kernel/exit.c：
//! - `proc`: 控制块 (task_struct)
//! - `table`: 控制块表
//! - `fork`: 进程创建
//! - `exit`: 进程退出与线程组回收
//! - `wait`: 等待子进程、kill
//! - `lwp`: 轻量级进程（线程）

pub mod exit;
pub mod fork;
pub mod lwp;
pub mod proc;
pub mod table;
pub mod wait;

pub use proc::{
    Channel, Pid, Proc, ProcFlags, ProcState, SlotId, StartRoutine, ThreadHandle, Tid, TrapFrame,
};
pub use table::{ProcTable, TableGuard};
