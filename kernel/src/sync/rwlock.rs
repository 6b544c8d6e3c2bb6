//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 读写锁
//!
//! 经典的读者优先实现，由两个信号量组成：
//! - `guard` 保护读者计数
//! - `write` 是写者互斥门，第一个读者进入时取得，最后一个读者离开时释放
//!
//! 已知限制：读者不断到来时，等待中的写者可能一直拿不到锁。

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::kernel::Kernel;

use super::semaphore::Semaphore;

pub struct RwLock {
    /// 读者计数，只在持有 `guard` 时修改
    readers: AtomicUsize,
    guard: Semaphore,
    write: Semaphore,
}

impl RwLock {
    pub const fn new() -> Self {
        Self {
            readers: AtomicUsize::new(0),
            guard: Semaphore::new(1),
            write: Semaphore::new(1),
        }
    }

    /// 运行时初始化，锁必须处于空闲状态
    pub fn init(&self) {
        self.readers.store(0, Ordering::Relaxed);
        self.guard.init(1);
        self.write.init(1);
    }

    pub fn acquire_read(&self, kernel: &Kernel) {
        self.guard.wait(kernel);
        if self.readers.fetch_add(1, Ordering::Relaxed) == 0 {
            self.write.wait(kernel);
        }
        self.guard.post(kernel);
    }

    pub fn release_read(&self, kernel: &Kernel) {
        self.guard.wait(kernel);
        if self.readers.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.write.post(kernel);
        }
        self.guard.post(kernel);
    }

    pub fn acquire_write(&self, kernel: &Kernel) {
        self.write.wait(kernel);
    }

    pub fn release_write(&self, kernel: &Kernel) {
        self.write.post(kernel);
    }

    /// 当前读者数，仅供参考
    pub fn readers(&self) -> usize {
        self.readers.load(Ordering::Relaxed)
    }
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}
