//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! um 的 CPU 局部状态
//!
//! 真实硬件上 `noff`/`intena` 是每 CPU 变量，在 `sched()` 中跨切换保存恢复。
//! um 中它们跟随宿主线程，持锁方和放锁方总在同一个线程上配对，嵌套深度自然平衡。

use core::cell::Cell;

use alloc::format;
use std::thread::JoinHandle;
use std::time::Duration;

std::thread_local! {
    static CPU_ID: Cell<usize> = const { Cell::new(0) };
    static INTR: Cell<bool> = const { Cell::new(false) };
    static NOFF: Cell<usize> = const { Cell::new(0) };
    static INTENA: Cell<bool> = const { Cell::new(false) };
}

/// 空闲时等待一个时钟滴答的时长
const TICK: Duration = Duration::from_micros(100);

/// 当前 CPU 编号
///
/// 调用者应处于关中断状态，否则返回后可能已被迁移
#[inline]
pub fn cpu_id() -> usize {
    CPU_ID.with(|c| c.get())
}

pub(super) fn set_cpu_id(id: usize) {
    CPU_ID.with(|c| c.set(id));
}

/// 中断是否打开
#[inline]
pub fn intr_get() -> bool {
    INTR.with(|i| i.get())
}

/// 打开中断
#[inline]
pub fn intr_on() {
    INTR.with(|i| i.set(true));
}

/// 关闭中断
#[inline]
pub fn intr_off() {
    INTR.with(|i| i.set(false));
}

/// 可嵌套的关中断
///
/// 对应 Linux 的 local_irq_save()，第一层记录进入前的中断状态
pub fn push_off() {
    let old = intr_get();
    intr_off();
    NOFF.with(|n| {
        if n.get() == 0 {
            INTENA.with(|e| e.set(old));
        }
        n.set(n.get() + 1);
    });
}

/// 与 `push_off` 配对，最外层恢复进入前的中断状态
pub fn pop_off() {
    if intr_get() {
        panic!("pop_off: interruptible");
    }
    let depth = NOFF.with(|n| n.get());
    if depth == 0 {
        panic!("pop_off: unbalanced");
    }
    NOFF.with(|n| n.set(depth - 1));
    if depth == 1 && intena() {
        intr_on();
    }
}

/// 当前关中断嵌套深度
#[inline]
pub fn noff() -> usize {
    NOFF.with(|n| n.get())
}

/// 最外层 `push_off` 之前中断是否打开
#[inline]
pub fn intena() -> bool {
    INTENA.with(|e| e.get())
}

#[inline]
pub fn set_intena(on: bool) {
    INTENA.with(|e| e.set(on));
}

/// 新执行流第一次被切入时，继承调度器持有控制块表锁时的关中断状态
pub(super) fn inherit_handoff() {
    INTR.with(|i| i.set(false));
    NOFF.with(|n| n.set(1));
    INTENA.with(|e| e.set(true));
}

/// 空闲等待下一个中断
///
/// um 没有时钟硬件，睡眠一个滴答后返回 `true`，表示时钟中断已到达
pub fn wait_for_interrupt() -> bool {
    std::thread::sleep(TICK);
    true
}

/// 启动一个 CPU：新建宿主线程，设置 CPU 编号后运行 `entry(arg, id)`
pub fn start_cpu<T: Sync + 'static>(
    id: usize,
    entry: fn(&'static T, usize),
    arg: &'static T,
) -> Option<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("cpu{}", id))
        .spawn(move || {
            set_cpu_id(id);
            entry(arg, id);
        })
        .ok()
}
