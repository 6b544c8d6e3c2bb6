//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程退出
//!
//! 对应 Linux 的 kernel/exit.c：do_exit() → exit_notify()
//!
//! 主线程退出时先回收整个线程组：不在运行的兄弟线程立即回收，
//! 正在其他 CPU 上运行的兄弟线程标记 KILLED，主线程等它们在下一次返回用户态时退出，
//! 或在它们睡眠时把它们回收。

use alloc::vec::Vec;

use crate::config::{NOFILE, NPROC};
use crate::kernel::Kernel;
use crate::mm::PAGE_SIZE;

use super::proc::{Channel, ProcFlags, ProcState};
use super::table::ProcTable;

impl Kernel {
    /// 退出当前进程
    ///
    /// LWP 调用时杀死整个线程组并退出自己。init 退出是致命错误。
    pub fn exit(&'static self, status: i32) -> ! {
        let me = self.me();
        if self.is_init(me) {
            panic!("proc: init exiting");
        }
        let (is_main, pid) = {
            let table = self.table.lock();
            (table[me].is_main(), table[me].pid)
        };
        if !is_main {
            // 组内其他线程（包括主线程）在返回用户态时退出
            let _ = self.kill(pid);
            self.thread_exit(0);
        }

        self.reap_group(me);

        let mut table = self.table.lock();
        self.close_files(&mut table, me);

        // 子进程交给 init
        let id = table.id_of(me);
        let init = self.initproc().map(|i| table.id_of(i));
        let mut orphan_zombie = false;
        for i in 0..NPROC {
            if table.is_leader(i) && table[i].parent == Some(id) {
                table[i].parent = init;
                orphan_zombie |= table[i].state == ProcState::Zombie;
            }
        }

        let parent = table[me].parent.filter(|&parent| table.get(parent).is_ok());
        table[me].xstate = status;
        self.with_sched(&mut table, |s| {
            if let (true, Some(init)) = (orphan_zombie, init) {
                s.wakeup(Channel::Child(init.index()));
            }
            if let Some(parent) = parent {
                s.wakeup(Channel::Child(parent.index()));
            }
            s.leave_share(me);
            s.set_state(me, ProcState::Zombie);
        });
        log::debug!("proc: pid {} exit {}", pid, status);

        self.sched(&mut table);
        panic!("proc: zombie pid {} resumed", pid);
    }

    /// 回收线程组内除主线程外的所有线程
    ///
    /// 之后线程组不能再创建线程
    fn reap_group(&self, me: usize) {
        let mut table = self.table.lock();
        table[me].flags.insert(ProcFlags::EXITING);
        loop {
            let siblings: Vec<usize> = table.siblings(me).collect();
            let mut running = 0;
            for i in siblings {
                if table[i].state == ProcState::Running {
                    table[i].flags.insert(ProcFlags::KILLED);
                    running += 1;
                } else {
                    self.reclaim_thread(&mut table, i);
                }
            }
            if running == 0 {
                break;
            }
            log::trace!("proc: pid {} waiting for {} thread(s)", table[me].pid, running);
            self.sleep_locked(&mut table, Channel::GroupExit(me));
        }
    }

    /// 关闭执行实体的所有文件并释放工作目录
    pub(crate) fn close_files(&self, table: &mut ProcTable, index: usize) {
        for fd in 0..NOFILE {
            if let Some(file) = table[index].ofile[fd].take() {
                self.fs.close(file);
            }
        }
        if let Some(cwd) = table[index].cwd.take() {
            self.fs.iput(cwd);
        }
    }

    /// 释放 LWP 的私有资源：文件、工作目录、用户栈页，线程计数减一
    ///
    /// 用户栈在地址空间顶端时地址空间随之缩小
    pub(crate) fn release_thread(&self, table: &mut ProcTable, index: usize) {
        self.close_files(table, index);
        let group = table[index].group;
        let base = core::mem::take(&mut table[index].ustack);
        if base != 0 {
            if let Some(space) = table[group].vm {
                let top = base + PAGE_SIZE;
                if self.vm.unmap_user_pages(space, base, top).is_some() && top == table[group].sz {
                    table[group].sz = base;
                }
            }
        }
        table[group].thread_count -= 1;
    }

    /// 回收僵尸进程：释放地址空间、内核栈和槽位
    pub(crate) fn reap_process(&self, table: &mut ProcTable, index: usize) {
        if let Some(space) = table[index].vm.take() {
            self.vm.free_address_space(space, table[index].sz);
        }
        self.discard(table, index);
    }

    /// 关机：停止所有 CPU 的调度循环，调用者永远睡眠
    pub fn power_off(&self, code: usize) -> ! {
        log::info!("proc: power off ({})", code);
        self.halt(code);
        let mut table = self.table.lock();
        loop {
            self.sleep_locked(&mut table, Channel::Halt);
        }
    }
}
