//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程创建
//!
//! 对应 Linux 的 kernel/fork.c：
//! 1. 预留控制块槽位 (EMBRYO)
//! 2. 分配内核栈，构造从 `forkret` 开始的执行点
//! 3. 复制地址空间、文件描述符和工作目录
//! 4. 置为 RUNNABLE
//!
//! 任何一步失败都回滚之前的分配，槽位重新变为 UNUSED。

use core::sync::atomic::Ordering;

use crate::arch::Context;
use crate::config::NOFILE;
use crate::errno::{Errno, KResult};
use crate::fs::FileRef;
use crate::kernel::{forkret, Kernel};
use crate::mm::PAGE_SIZE;

use super::proc::{Pid, ProcState, StartRoutine, Tid, TrapFrame};
use super::table::ProcTable;

impl Kernel {
    /// 分配控制块、内核栈和执行点
    ///
    /// 返回的槽位处于 EMBRYO，调用者填好其余字段后置为 RUNNABLE，失败时调用 `discard`
    pub(crate) fn alloc_proc(&'static self, table: &mut ProcTable) -> KResult<usize> {
        let index = table.reserve()?;
        let Some(kstack) = self.vm.alloc_kernel_stack() else {
            table.release(index);
            return Err(Errno::OutOfMemory);
        };
        let Some(context) = Context::spawn(forkret, self) else {
            self.vm.free_kernel_stack(kstack);
            table.release(index);
            return Err(Errno::OutOfMemory);
        };
        table[index].kstack = Some(kstack);
        table[index].context = Some(context);
        Ok(index)
    }

    /// 归还内核栈和执行点，释放槽位
    pub(crate) fn discard(&self, table: &mut ProcTable, index: usize) {
        let p = &mut table[index];
        if let Some(kstack) = p.kstack.take() {
            self.vm.free_kernel_stack(kstack);
        }
        if let Some(context) = p.context.take() {
            context.retire();
        }
        table.release(index);
    }

    /// 创建第一个进程
    ///
    /// 地址空间一页，工作目录为根目录，`entry(arg)` 返回时关机
    pub fn user_init(&'static self, name: &str, entry: StartRoutine, arg: usize) -> KResult<Pid> {
        let mut table = self.table.lock();
        if self.initproc().is_some() {
            return Err(Errno::OperationNotPermitted);
        }
        let index = self.alloc_proc(&mut table)?;
        let Some(space) = self.vm.create_address_space(PAGE_SIZE) else {
            self.discard(&mut table, index);
            return Err(Errno::OutOfMemory);
        };

        let pid = table.alloc_pid();
        let p = &mut table[index];
        p.pid = pid;
        p.name = name.into();
        p.vm = Some(space);
        p.sz = PAGE_SIZE;
        p.tf = TrapFrame {
            entry: Some(entry),
            arg,
            sp: PAGE_SIZE,
        };
        p.cwd = Some(self.fs.root());
        self.initproc.store(index, Ordering::Relaxed);
        self.with_sched(&mut table, |s| s.set_state(index, ProcState::Runnable));
        log::info!("proc: init pid {} ({})", pid, name);
        Ok(pid)
    }

    /// 创建子进程
    ///
    /// 子进程复制调用者所在线程组的地址空间、调用线程的文件描述符和工作目录，
    /// 从 `entry(arg)` 开始执行
    pub fn fork(&'static self, entry: StartRoutine, arg: usize) -> KResult<Pid> {
        let me = self.me();
        let mut table = self.table.lock();
        let group = table[me].group;
        let index = self.alloc_proc(&mut table)?;

        let (parent_space, sz) = (table[group].vm, table[group].sz);
        let Some(space) = parent_space.and_then(|space| self.vm.duplicate_address_space(space, sz)) else {
            self.discard(&mut table, index);
            return Err(Errno::OutOfMemory);
        };

        let pid = table.alloc_pid();
        let parent = table.id_of(group);
        let name = table[group].name.clone();
        let ofile = table[me].ofile.map(|f| f.map(|f| self.fs.dup(f)));
        let cwd = table[me].cwd.map(|c| self.fs.idup(c));

        let child = &mut table[index];
        child.pid = pid;
        child.parent = Some(parent);
        child.name = name;
        child.vm = Some(space);
        child.sz = sz;
        child.tf = TrapFrame {
            entry: Some(entry),
            arg,
            sp: sz,
        };
        child.ofile = ofile;
        child.cwd = cwd;
        self.with_sched(&mut table, |s| s.set_state(index, ProcState::Runnable));
        log::debug!("proc: pid {} forked pid {}", table[group].pid, pid);
        Ok(pid)
    }

    /// 扩大或缩小线程组的地址空间，返回原来的大小
    pub fn sbrk(&self, n: isize) -> KResult<usize> {
        let me = self.me();
        let mut table = self.table.lock();
        let group = table[me].group;
        let old = table[group].sz;
        let space = table[group].vm.ok_or(Errno::OutOfMemory)?;
        let new = if n > 0 {
            let end = old.checked_add(n as usize).ok_or(Errno::OutOfMemory)?;
            self.vm.map_user_pages(space, old, end).ok_or(Errno::OutOfMemory)?
        } else if n < 0 {
            let end = old.checked_sub(n.unsigned_abs()).ok_or(Errno::InvalidArgument)?;
            self.vm.unmap_user_pages(space, end, old).ok_or(Errno::InvalidArgument)?;
            end
        } else {
            old
        };
        table[group].sz = new;
        Ok(old)
    }

    /// 把打开文件放入调用线程的描述符表，返回描述符
    pub fn install_file(&self, file: FileRef) -> KResult<usize> {
        let me = self.me();
        let mut table = self.table.lock();
        let fd = (0..NOFILE)
            .find(|&fd| table[me].ofile[fd].is_none())
            .ok_or(Errno::TooManyOpenFiles)?;
        table[me].ofile[fd] = Some(file);
        Ok(fd)
    }

    pub fn getpid(&self) -> Pid {
        let me = self.me();
        self.table.lock()[me].pid
    }

    pub fn gettid(&self) -> Tid {
        let me = self.me();
        self.table.lock()[me].tid
    }
}
