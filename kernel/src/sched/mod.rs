//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 调度器模块
//!
//! 对应 Linux 的 kernel/sched/：
//! - `policy`: 调度类与调度实体（反馈队列 + 比例份额）
//! - `group`: 线程组内的轮转环
//! - `sched`: 调度循环、上下文切换入口、睡眠与唤醒

pub mod group;
pub mod policy;
pub mod sched;

pub use policy::{Sched, SchedClass, SchedEntity, SchedState, TOP_LEVEL};
