//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 宿主机用户态移植 (um)
//!
//! 对应 Linux 的 arch/um：内核运行在宿主操作系统的进程里。
//!
//! - 每个 CPU 的调度循环和每个执行实体各由一个宿主线程承载
//! - 上下文切换就是在线程之间传递唯一的运行令牌，同一 CPU 上任何时刻只有一个线程在跑
//! - 中断开关和关中断嵌套深度保存在线程局部变量里，随执行流一起切换

pub mod context;
pub mod cpu;
