//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 等待子进程与 kill
//!
//! 对应 Linux 的 kernel/exit.c::do_wait() 和 kernel/signal.c::kill_pid_info()

use alloc::vec::Vec;

use crate::config::NPROC;
use crate::errno::{Errno, KResult};
use crate::kernel::Kernel;

use super::proc::{Channel, Pid, ProcFlags, ProcState};

impl Kernel {
    /// 等待任一子进程退出，返回它的 pid 和退出状态
    ///
    /// 没有子进程或调用者已被 kill 时返回 ECHILD
    pub fn wait(&self) -> KResult<(Pid, i32)> {
        let me = self.me();
        let mut table = self.table.lock();
        let group = table[me].group;
        loop {
            let id = table.id_of(group);
            let mut havekids = false;
            for i in 0..NPROC {
                if !table.is_leader(i) || table[i].parent != Some(id) {
                    continue;
                }
                havekids = true;
                if table[i].state == ProcState::Zombie {
                    let (pid, xstate) = (table[i].pid, table[i].xstate);
                    self.reap_process(&mut table, i);
                    log::debug!("proc: reaped pid {} status {}", pid, xstate);
                    return Ok((pid, xstate));
                }
            }
            if !havekids || table[me].killed() {
                return Err(Errno::NoChild);
            }
            self.sleep_locked(&mut table, Channel::Child(group));
        }
    }

    /// 标记线程组内所有线程为 KILLED
    ///
    /// 在下一次返回用户态时生效，不会唤醒睡眠者
    pub fn kill(&self, pid: Pid) -> KResult<()> {
        let mut table = self.table.lock();
        let group = table.find_group(pid).ok_or(Errno::NoSuchProcess)?;
        let members: Vec<usize> = core::iter::once(group).chain(table.siblings(group)).collect();
        for i in members {
            table[i].flags.insert(ProcFlags::KILLED);
        }
        log::debug!("proc: kill pid {}", pid);
        Ok(())
    }
}
