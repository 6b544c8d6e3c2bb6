//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 控制块表
//!
//! 固定容量的槽位数组，由一把自旋锁保护所有结构性修改。
//! 分配时线性扫描空闲槽位，返回带代数的 `SlotId`。

use core::ops::{Index, IndexMut};

use crate::config::NPROC;
use crate::errno::{Errno, KResult};
use crate::sync::SpinLockGuard;

use super::proc::{Pid, Proc, ProcState, SlotId, Tid};

/// 持有控制块表锁的守卫
///
/// 可能发生上下文切换的函数接收 `&mut TableGuard`，而不是从守卫派生的 `&mut ProcTable`，
/// 切换回来后重新解引用
pub type TableGuard<'a> = SpinLockGuard<'a, ProcTable>;

pub struct ProcTable {
    procs: [Proc; NPROC],
    next_pid: Pid,
}

impl ProcTable {
    pub fn new() -> Self {
        Self {
            procs: core::array::from_fn(|_| Proc::new()),
            next_pid: 1,
        }
    }

    /// 预留一个空闲槽位，状态置为 EMBRYO
    ///
    /// 槽位以单线程进程的缺省值初始化，`group` 指向自己
    pub fn reserve(&mut self) -> KResult<usize> {
        let index = self
            .procs
            .iter()
            .position(|p| p.state == ProcState::Unused)
            .ok_or(Errno::TryAgain)?;
        let generation = self.procs[index].generation;
        self.procs[index] = Proc::new();
        let p = &mut self.procs[index];
        p.generation = generation;
        p.state = ProcState::Embryo;
        p.group = index;
        Ok(index)
    }

    /// 释放槽位，代数加一使旧句柄失效
    ///
    /// 调用者负责先归还内核栈、上下文等资源
    pub fn release(&mut self, index: usize) {
        let generation = self.procs[index].generation.wrapping_add(1);
        self.procs[index] = Proc::new();
        self.procs[index].generation = generation;
    }

    pub fn alloc_pid(&mut self) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }

    pub fn id_of(&self, index: usize) -> SlotId {
        SlotId {
            index,
            generation: self.procs[index].generation,
        }
    }

    /// 按句柄查找，过期或空闲槽位返回 ESRCH
    pub fn get(&self, id: SlotId) -> KResult<&Proc> {
        let p = self.procs.get(id.index).ok_or(Errno::NoSuchProcess)?;
        if p.generation != id.generation || p.state == ProcState::Unused {
            return Err(Errno::NoSuchProcess);
        }
        Ok(p)
    }

    /// 槽位是否为某个存活线程组的主线程
    #[inline]
    pub fn is_leader(&self, index: usize) -> bool {
        let p = &self.procs[index];
        p.state != ProcState::Unused && p.state != ProcState::Embryo && p.group == index
    }

    /// 按 (pid, tid) 查找存活的控制块
    pub fn find_thread(&self, pid: Pid, tid: Tid) -> Option<usize> {
        self.procs.iter().position(|p| {
            p.state != ProcState::Unused
                && p.state != ProcState::Embryo
                && p.pid == pid
                && p.tid == tid
        })
    }

    /// 按 pid 查找线程组主线程
    pub fn find_group(&self, pid: Pid) -> Option<usize> {
        self.find_thread(pid, 0)
    }

    /// 线程组 `group` 中除主线程外的存活成员
    pub fn siblings(&self, group: usize) -> impl Iterator<Item = usize> + '_ {
        (0..NPROC).filter(move |&i| {
            let p = &self.procs[i];
            i != group && p.state != ProcState::Unused && p.state != ProcState::Embryo && p.group == group
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Proc> {
        self.procs.iter()
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for ProcTable {
    type Output = Proc;

    fn index(&self, index: usize) -> &Proc {
        &self.procs[index]
    }
}

impl IndexMut<usize> for ProcTable {
    fn index_mut(&mut self, index: usize) -> &mut Proc {
        &mut self.procs[index]
    }
}
