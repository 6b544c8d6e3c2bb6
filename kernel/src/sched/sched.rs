//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 调度器核心
//!
//! 对应 Linux 的 kernel/sched/core.c：
//! - `scheduler()` - 每个 CPU 的调度循环
//! - `sched()` - 切换到本 CPU 的调度循环
//! - `yield_now()` - 时钟滴答记账后按需让出 CPU
//! - `sleep()` / `wakeup()` - 基于等待通道的阻塞原语
//!
//! 锁的转交：切换前持有控制块表锁，被切入的一方负责释放。
//! 除控制块表锁外，任何锁都不能跨越上下文切换。

use core::sync::atomic::Ordering;

use crate::arch;
use crate::errno::{Errno, KResult};
use crate::process::{Channel, ProcFlags, ProcState, ProcTable, TableGuard};
use crate::sync::SpinLockGuard;

use super::policy::Sched;
use crate::kernel::Kernel;

/// `yield_now` 记账后的去向
enum Next {
    /// 继续运行
    Stay,
    /// 组内直接切换到兄弟线程
    Sibling(usize),
    /// 回到调度循环
    Scheduler,
}

impl Kernel {
    /// 在调度状态锁下操作，控制块表锁必须已经持有
    pub(crate) fn with_sched<R>(&self, table: &mut ProcTable, f: impl FnOnce(&mut Sched<'_>) -> R) -> R {
        debug_assert!(self.table.holding(), "sched: ptable lock not held");
        let mut state = self.sched.lock();
        f(&mut Sched {
            table,
            state: &mut *state,
        })
    }

    /// 每个 CPU 的调度循环
    ///
    /// 开中断后选出下一个执行实体并切换过去，它让出 CPU 时回到这里。
    /// 没有可运行者时空闲等待一个滴答。关机后返回。
    pub fn scheduler(&'static self, cpu: usize) {
        let this = &self.cpus[cpu];
        log::info!("sched: cpu{} online", cpu);
        loop {
            arch::intr_on();
            if self.is_halted() {
                break;
            }

            let mut table = self.table.lock();
            let mut rover = this.rover();
            let picked = self.with_sched(&mut table, |s| s.pick_next(&mut rover));
            this.set_rover(rover);

            let Some(next) = picked else {
                drop(table);
                if arch::wait_for_interrupt() && cpu == 0 {
                    self.clock_tick();
                }
                continue;
            };

            self.install_space(cpu, table[next].vm);
            self.with_sched(&mut table, |s| s.set_state(next, ProcState::Running));
            this.set_current(Some(next));
            let to = match &table[next].context {
                Some(context) => context.clone(),
                None => panic!("sched: pid {} has no context", table[next].pid),
            };
            arch::switch(this.scheduler(), &to);

            // 执行实体让出 CPU，可能已经换了一个 CPU 的调度循环回来
            this.set_current(None);
            drop(table);
        }
        log::info!("sched: cpu{} halted", cpu);
    }

    /// 切换前的断言
    fn check_switch(&self, table: &TableGuard<'_>, me: usize) {
        if !self.table.holding() {
            panic!("sched: ptable lock not held");
        }
        if arch::noff() != 1 {
            panic!("sched: locks held ({})", arch::noff());
        }
        if table[me].state == ProcState::Running {
            panic!("sched: pid {} tid {} still running", table[me].pid, table[me].tid);
        }
        if arch::intr_get() {
            panic!("sched: interruptible");
        }
    }

    fn context_of(table: &TableGuard<'_>, index: usize) -> arch::Context {
        match &table[index].context {
            Some(context) => context.clone(),
            None => panic!("sched: pid {} has no context", table[index].pid),
        }
    }

    /// 切换到本 CPU 的调度循环
    ///
    /// 调用者持有控制块表锁（且只持有这一把），并已把自己的状态改为非 RUNNING
    pub(crate) fn sched(&self, table: &mut TableGuard<'_>) {
        let me = self.me();
        self.check_switch(table, me);
        let intena = arch::intena();
        let from = Self::context_of(table, me);
        let cpu = arch::cpu_id();
        arch::switch(&from, self.cpus[cpu].scheduler());
        arch::set_intena(intena);
    }

    /// 不经过调度循环，直接切换到同组的另一个执行实体
    pub(crate) fn switch_direct(&self, table: &mut TableGuard<'_>, me: usize, next: usize) {
        self.check_switch(table, me);
        let cpu = arch::cpu_id();
        self.with_sched(table, |s| s.set_state(next, ProcState::Running));
        self.install_space(cpu, table[next].vm);
        self.cpus[cpu].set_current(Some(next));
        let from = Self::context_of(table, me);
        let to = Self::context_of(table, next);
        let intena = arch::intena();
        arch::switch(&from, &to);
        arch::set_intena(intena);
    }

    /// 时钟滴答到来时的让出
    ///
    /// 记账一个滴答（降级、优先级提升、pass 推进）；时间片用完或级别变化时回到调度循环，
    /// 多线程组时间片未用完时在组内轮转
    pub fn yield_now(&self) {
        let mut table = self.table.lock();
        let me = self.me();
        let now = self.ticks();
        let next = self.with_sched(&mut table, |s| {
            let resched = s.charge_tick(me, now);
            let group = s.table[me].group;
            if resched {
                s.set_state(me, ProcState::Runnable);
                return Next::Scheduler;
            }
            if s.table[group].thread_count > 1 {
                s.set_state(me, ProcState::Runnable);
                return match s.pick_thread(group) {
                    Some(sibling) if sibling != me => Next::Sibling(sibling),
                    _ => {
                        s.set_state(me, ProcState::Running);
                        Next::Stay
                    }
                };
            }
            Next::Stay
        });
        match next {
            Next::Stay => {}
            Next::Sibling(sibling) => self.switch_direct(&mut table, me, sibling),
            Next::Scheduler => self.sched(&mut table),
        }
    }

    /// 原子地释放 `guard` 并在 `chan` 上睡眠，唤醒后重新加锁
    ///
    /// 先拿控制块表锁再放 `guard`，唤醒方必须持有 `guard` 对应的锁或控制块表锁，不会丢失唤醒
    pub fn sleep<'a, T>(&self, chan: Channel, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> {
        let lock = guard.spinlock();
        let mut table = self.table.lock();
        drop(guard);
        self.sleep_locked(&mut table, chan);
        drop(table);
        lock.lock()
    }

    /// 已持有控制块表锁时在 `chan` 上睡眠
    pub(crate) fn sleep_locked(&self, table: &mut TableGuard<'_>, chan: Channel) {
        let me = self.me();
        table[me].chan = Some(chan);
        table[me].sleep_seq = self.sleep_seq.fetch_add(1, Ordering::Relaxed);
        // 主线程正在回收本组，睡眠的兄弟线程可以立即被回收
        let group = table[me].group;
        let exiting = group != me && table[group].flags.contains(ProcFlags::EXITING);
        self.with_sched(table, |s| {
            s.set_state(me, ProcState::Sleeping);
            if exiting {
                s.wakeup(Channel::GroupExit(group));
            }
        });
        self.sched(table);
        table[me].chan = None;
    }

    /// 唤醒 `chan` 上的所有睡眠者
    pub fn wakeup(&self, chan: Channel) {
        let mut table = self.table.lock();
        self.with_sched(&mut table, |s| s.wakeup(chan));
    }

    /// 只唤醒 `chan` 上等待最久的一个睡眠者
    pub fn wakeup_one(&self, chan: Channel) -> bool {
        let mut table = self.table.lock();
        self.with_sched(&mut table, |s| s.wakeup_one(chan))
    }

    /// 时钟滴答：推进时间并唤醒按滴答睡眠者
    pub(crate) fn clock_tick(&self) {
        {
            let _time = self.tickslock.lock();
            self.ticks.fetch_add(1, Ordering::Relaxed);
        }
        self.wakeup(Channel::Ticks);
    }

    /// 时钟中断
    ///
    /// CPU 0 推进滴答；正在运行的执行实体记账并按需让出，返回用户态前检查 kill
    pub fn timer_interrupt(&'static self) {
        arch::push_off();
        let cpu = arch::cpu_id();
        arch::pop_off();
        if cpu == 0 {
            self.clock_tick();
        }
        if self.current_index().is_some() {
            self.yield_now();
        }
        self.trap_return();
    }

    /// 睡眠 `n` 个滴答，被 kill 时提前返回 EINTR
    pub fn sleep_ticks(&self, n: u64) -> KResult<()> {
        let mut time = self.tickslock.lock();
        let start = self.ticks();
        while self.ticks() - start < n {
            if self.is_killed() {
                return Err(Errno::InterruptedSystemCall);
            }
            time = self.sleep(Channel::Ticks, time);
        }
        Ok(())
    }

    /// 系统启动以来的滴答数
    pub fn uptime(&self) -> u64 {
        let _time = self.tickslock.lock();
        self.ticks()
    }

    pub(crate) fn is_killed(&self) -> bool {
        let me = self.me();
        self.table.lock()[me].killed()
    }

    /// 当前线程组的反馈队列级别，比例份额组返回 -1
    pub fn get_feedback_level(&self) -> i32 {
        let table = self.table.lock();
        let me = self.me();
        table[table[me].group].se.level()
    }

    /// 为当前线程组申请 `share`% 的 CPU
    pub fn set_cpu_share(&self, share: i32) -> KResult<()> {
        let mut table = self.table.lock();
        let me = self.me();
        let pid = table[me].pid;
        let result = self.with_sched(&mut table, |s| s.set_cpu_share(me, share));
        match result {
            Ok(()) => log::debug!("sched: pid {} share {}%", pid, share),
            Err(_) => log::warn!("sched: pid {} share {}% rejected", pid, share),
        }
        result
    }

    /// 输出所有存活控制块，调试用
    ///
    /// 对应 xv6 的 procdump()
    pub fn procdump(&self) {
        let table = self.table.lock();
        for (i, p) in table.iter().enumerate() {
            if p.state() == ProcState::Unused {
                continue;
            }
            let level = table[p.group].se.level();
            log::info!(
                "{} {}:{} {:?} {} lev {} {}",
                i,
                p.pid(),
                p.tid(),
                p.state(),
                p.name(),
                level,
                if p.killed() { "killed" } else { "" }
            );
        }
    }
}
