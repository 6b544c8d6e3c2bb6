//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 信号量 (Semaphore) 机制
//!
//! 对应 Linux 的 include/linux/semaphore.h 和 kernel/locking/semaphore.c：
//! - P 操作 (wait): 计数不大于 0 时睡眠，之后减 1
//! - V 操作 (post): 加 1 并唤醒一个等待者
//!
//! 计数由信号量自己的自旋锁保护，睡眠通过 `Kernel::sleep` 原子地释放这把锁。
//! `post` 只唤醒等待最久的一个睡眠者，不会惊群。

use crate::kernel::Kernel;
use crate::process::Channel;

use super::spinlock::SpinLock;

/// 信号量
///
/// # 示例
/// ```ignore
/// let sem = Semaphore::new(1);
/// sem.wait(kernel);
/// // ... 临界区 ...
/// sem.post(kernel);
/// ```
pub struct Semaphore {
    value: SpinLock<i32>,
}

impl Semaphore {
    /// 创建新信号量，`value` 为初始计数
    pub const fn new(value: i32) -> Self {
        Self {
            value: SpinLock::new(value, "xem"),
        }
    }

    /// 重新设置计数（运行时初始化）
    pub fn init(&self, value: i32) {
        *self.value.lock() = value;
    }

    /// 等待通道：信号量的地址
    fn chan(&self) -> Channel {
        Channel::Addr(self as *const Self as usize)
    }

    /// P 操作
    pub fn wait(&self, kernel: &Kernel) {
        let mut value = self.value.lock();
        while *value <= 0 {
            value = kernel.sleep(self.chan(), value);
        }
        *value -= 1;
    }

    /// 非阻塞的 P 操作，计数不足时返回 false
    pub fn try_wait(&self) -> bool {
        let mut value = self.value.lock();
        if *value <= 0 {
            return false;
        }
        *value -= 1;
        true
    }

    /// V 操作
    pub fn post(&self, kernel: &Kernel) {
        let mut value = self.value.lock();
        *value += 1;
        kernel.wakeup_one(self.chan());
    }

    /// 当前计数，仅供参考
    pub fn count(&self) -> i32 {
        *self.value.lock()
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(1)
    }
}
