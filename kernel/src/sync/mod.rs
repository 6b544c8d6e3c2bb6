//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 同步原语 (Synchronization Primitives)
//!
//! 对应 Linux 的 include/linux/spinlock.h、include/linux/semaphore.h：
//! - `spinlock`: 关中断自旋锁，可以跨上下文切换转交
//! - `semaphore`: 计数信号量，建立在 sleep/wakeup 之上
//! - `rwlock`: 由两个信号量组成的读写锁

pub mod rwlock;
pub mod semaphore;
pub mod spinlock;

pub use rwlock::RwLock;
pub use semaphore::Semaphore;
pub use spinlock::{SpinLock, SpinLockGuard};
