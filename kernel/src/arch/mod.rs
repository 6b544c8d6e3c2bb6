//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 架构相关代码
//!
//! 内核核心只依赖这里导出的窄接口：
//! - `Context` / `switch` - 保存当前执行点并恢复另一个
//! - `intr_on` / `intr_off` / `intr_get` - 本 CPU 中断开关
//! - `push_off` / `pop_off` - 可嵌套的关中断
//! - `cpu_id` - 当前 CPU 编号
//!
//! 当前支持的架构：
//! - **um** - 宿主机用户态移植，默认启用

#[cfg(feature = "um")]
pub mod um;

#[cfg(feature = "um")]
pub use um::context::{switch, Context};

#[cfg(feature = "um")]
pub use um::cpu::{
    cpu_id, intena, intr_get, intr_off, intr_on, noff, pop_off, push_off, set_intena, start_cpu,
    wait_for_interrupt,
};

#[cfg(not(feature = "um"))]
compile_error!("no architecture selected: enable the `um` feature");
