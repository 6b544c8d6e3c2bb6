//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 自旋锁
//!
//! 对应 Linux 的 spin_lock_irqsave()/spin_unlock_irqrestore()：
//! - 底层互斥使用 `spin::Mutex`
//! - 持锁期间关闭本 CPU 中断，`push_off`/`pop_off` 支持嵌套
//! - 记录持锁 CPU，用于 `holding()` 断言

use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::arch;

const NO_CPU: usize = usize::MAX;

pub struct SpinLock<T> {
    name: &'static str,
    cpu: AtomicUsize,
    inner: spin::Mutex<T>,
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    guard: ManuallyDrop<spin::MutexGuard<'a, T>>,
}

impl<T> SpinLock<T> {
    pub const fn new(value: T, name: &'static str) -> Self {
        Self {
            name,
            cpu: AtomicUsize::new(NO_CPU),
            inner: spin::Mutex::new(value),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 获取锁，重入是致命错误
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        arch::push_off();
        if self.holding() {
            panic!("acquire: {} already held", self.name);
        }
        let guard = self.inner.lock();
        self.cpu.store(arch::cpu_id(), Ordering::Relaxed);
        SpinLockGuard {
            lock: self,
            guard: ManuallyDrop::new(guard),
        }
    }

    /// 本 CPU 是否持有该锁，调用者需处于关中断状态
    pub fn holding(&self) -> bool {
        self.inner.is_locked() && self.cpu.load(Ordering::Relaxed) == arch::cpu_id()
    }

    /// 释放由切换方转交过来的锁
    ///
    /// # Safety
    ///
    /// 只能由刚被切入、且没有持有该锁守卫的执行流调用，
    /// 切换方在切换前持有该锁，锁的所有权随 CPU 一起转交
    pub unsafe fn unlock_handoff(&self) {
        if !self.holding() {
            panic!("release: {} not held", self.name);
        }
        self.cpu.store(NO_CPU, Ordering::Relaxed);
        self.inner.force_unlock();
        arch::pop_off();
    }
}

impl<'a, T> SpinLockGuard<'a, T> {
    /// 守卫所属的锁，`sleep` 用它在唤醒后重新加锁
    pub fn spinlock(&self) -> &'a SpinLock<T> {
        self.lock
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        if !self.lock.holding() {
            panic!("release: {} not held", self.lock.name);
        }
        self.lock.cpu.store(NO_CPU, Ordering::Relaxed);
        // 先放锁再开中断
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        arch::pop_off();
    }
}
