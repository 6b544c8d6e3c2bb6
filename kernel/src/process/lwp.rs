//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 轻量级进程 (LWP)
//!
//! 同一线程组的线程共享地址空间，各自拥有内核栈、执行点、用户栈页和调度身份。
//! 用户栈页依次追加在线程组地址空间的顶端。
//!
//! 线程退出后成为僵尸，由组内线程 `thread_join` 回收，不经过父进程。

use alloc::vec::Vec;

use crate::errno::{Errno, KResult};
use crate::kernel::Kernel;
use crate::mm::{page_round_up, PAGE_SIZE};

use super::proc::{Channel, ProcFlags, ProcState, StartRoutine, ThreadHandle, TrapFrame};
use super::table::ProcTable;

impl Kernel {
    /// 在当前线程组中创建线程，从 `routine(arg)` 开始执行
    ///
    /// 没有空闲槽位时返回 EAGAIN，内核栈或用户栈分配失败时返回 ENOMEM，失败时不留下任何状态
    pub fn thread_create(&'static self, routine: StartRoutine, arg: usize) -> KResult<ThreadHandle> {
        let me = self.me();
        let mut table = self.table.lock();
        let group = table[me].group;
        if table[group].flags.contains(ProcFlags::EXITING) {
            return Err(Errno::TryAgain);
        }
        let index = self.alloc_proc(&mut table)?;

        let (space, base) = (table[group].vm, page_round_up(table[group].sz));
        let Some(sz) = space.and_then(|space| self.vm.map_user_pages(space, base, base + PAGE_SIZE)) else {
            self.discard(&mut table, index);
            return Err(Errno::OutOfMemory);
        };

        let leader = &mut table[group];
        leader.sz = sz;
        let tid = leader.next_tid;
        leader.next_tid += 1;
        leader.thread_count += 1;
        let pid = leader.pid;
        let name = leader.name.clone();
        let ofile = table[me].ofile.map(|f| f.map(|f| self.fs.dup(f)));
        let cwd = table[me].cwd.map(|c| self.fs.idup(c));

        let t = &mut table[index];
        t.pid = pid;
        t.tid = tid;
        t.group = group;
        t.name = name;
        t.vm = space;
        t.ustack = base;
        t.tf = TrapFrame {
            entry: Some(routine),
            arg,
            sp: base + PAGE_SIZE,
        };
        t.ofile = ofile;
        t.cwd = cwd;
        self.with_sched(&mut table, |s| {
            s.ring_insert(group, index);
            s.set_state(index, ProcState::Runnable);
        });
        log::debug!("lwp: pid {} created tid {}", pid, tid);
        Ok(ThreadHandle { pid, tid })
    }

    /// 退出当前线程，`retval` 交给 join 它的线程
    ///
    /// 主线程调用时等同于 `exit`。等待本线程的组员被唤醒；
    /// 主线程可运行时直接切换过去，否则回到调度循环。
    pub fn thread_exit(&'static self, retval: usize) -> ! {
        let me = self.me();
        let mut table = self.table.lock();
        if table[me].is_main() {
            drop(table);
            self.exit(retval as i32);
        }

        let (group, pid, tid) = (table[me].group, table[me].pid, table[me].tid);
        self.release_thread(&mut table, me);
        table[me].retval = retval;
        let exiting = table[group].flags.contains(ProcFlags::EXITING);

        let main_ready = self.with_sched(&mut table, |s| {
            s.ring_remove(me);
            s.set_state(me, ProcState::Zombie);
            let joiners: Vec<usize> = core::iter::once(group)
                .chain(s.table.siblings(group))
                .filter(|&i| {
                    let p = &s.table[i];
                    p.state == ProcState::Sleeping
                        && p.waiting_tid == Some(tid)
                        && p.chan == Some(Channel::Join(i))
                })
                .collect();
            for i in joiners {
                s.table[i].waiting_tid = None;
                s.set_state(i, ProcState::Runnable);
            }
            if exiting {
                s.wakeup(Channel::GroupExit(group));
            }
            s.eligible(group)
        });
        log::debug!("lwp: pid {} tid {} exit", pid, tid);

        if main_ready {
            self.switch_direct(&mut table, me, group);
        } else {
            self.sched(&mut table);
        }
        panic!("lwp: zombie pid {} tid {} resumed", pid, tid);
    }

    /// 等待线程 `handle` 退出并回收它，返回它的退出值
    ///
    /// 只能 join 本组的非主线程，每个线程只能被成功 join 一次
    pub fn thread_join(&self, handle: ThreadHandle) -> KResult<usize> {
        let me = self.me();
        let mut table = self.table.lock();
        let group = table[me].group;
        if handle.pid != table[group].pid || handle.tid == 0 {
            return Err(Errno::NoSuchProcess);
        }
        if handle.tid == table[me].tid {
            return Err(Errno::DeadlockWouldOccur);
        }
        loop {
            let target = table
                .find_thread(handle.pid, handle.tid)
                .ok_or(Errno::NoSuchProcess)?;
            if table[target].state == ProcState::Zombie {
                let retval = self.reclaim_thread(&mut table, target);
                log::debug!("lwp: pid {} joined tid {}", handle.pid, handle.tid);
                return Ok(retval);
            }
            if table[me].killed() {
                return Err(Errno::InterruptedSystemCall);
            }
            table[me].waiting_tid = Some(handle.tid);
            self.sleep_locked(&mut table, Channel::Join(me));
            table[me].waiting_tid = None;
        }
    }

    /// 回收线程槽位，返回它的退出值
    ///
    /// 不是僵尸的线程（线程组退出时）先释放私有资源
    pub(crate) fn reclaim_thread(&self, table: &mut ProcTable, index: usize) -> usize {
        if table[index].state != ProcState::Zombie {
            self.release_thread(table, index);
        }
        let retval = table[index].retval;
        self.with_sched(table, |s| {
            s.ring_remove(index);
            s.set_state(index, ProcState::Unused);
        });
        self.discard(table, index);
        retval
    }
}
