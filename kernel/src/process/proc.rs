//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程/线程控制块
//!
//! 对应 Linux 的 struct task_struct (include/linux/sched.h)
//!
//! 每个可调度实体（进程的主线程或一个 LWP）占用控制块表中的一个槽位。
//! 线程组（进程及其所有 LWP）的调度类字段、地址空间大小和线程计数记录在主线程的控制块上，
//! LWP 通过 `group` 指向主线程的槽位。

use alloc::string::String;
use bitflags::bitflags;

use crate::arch::Context;
use crate::config::NOFILE;
use crate::fs::{FileRef, InodeRef};
use crate::kernel::Kernel;
use crate::mm::{AddressSpace, KernelStack};
use crate::sched::SchedEntity;

/// 进程 ID，同一线程组内的所有线程共享
pub type Pid = u32;

/// 线程 ID，组内单调递增，主线程为 0
pub type Tid = u32;

/// 用户态入口
///
/// um 中用户代码是一个 Rust 函数，返回值即线程或进程的退出值
pub type StartRoutine = fn(&'static Kernel, usize) -> usize;

/// 控制块状态
///
/// UNUSED → EMBRYO → RUNNABLE ⇄ RUNNING ⇄ SLEEPING, RUNNABLE/RUNNING → ZOMBIE → UNUSED
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProcState {
    Unused = 0,
    Embryo = 1,
    Sleeping = 2,
    Runnable = 3,
    Running = 4,
    Zombie = 5,
}

impl ProcState {
    /// 可运行或正在运行，计入反馈队列的人数
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, ProcState::Runnable | ProcState::Running)
    }
}

bitflags! {
    /// 控制块标志
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct ProcFlags: u32 {
        /// 下次返回用户态时退出
        const KILLED = 1 << 0;
        /// 线程组正在退出（只出现在主线程上）
        const EXITING = 1 << 1;
    }
}

/// 控制块句柄：槽位下标 + 代数
///
/// 槽位每次被释放代数加一，过期句柄查找失败而不是指向新主人
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SlotId {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

impl SlotId {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// 用户可见的线程句柄
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ThreadHandle {
    pub pid: Pid,
    pub tid: Tid,
}

/// 等待通道
///
/// 把睡眠者与应当唤醒它的事件对应起来
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Channel {
    /// 父进程等待子进程退出，参数为父线程组主线程槽位
    Child(usize),
    /// 等待组内某个线程退出，参数为等待者槽位
    Join(usize),
    /// 主线程等待组内其余线程退出
    GroupExit(usize),
    /// 时钟滴答
    Ticks,
    /// 同步原语，参数为其地址
    Addr(usize),
    /// 关机后永不唤醒
    Halt,
}

/// 陷入帧
///
/// um 中只需要记录用户态入口、参数和用户栈顶
#[derive(Copy, Clone, Default)]
pub struct TrapFrame {
    pub entry: Option<StartRoutine>,
    pub arg: usize,
    pub sp: usize,
}

/// 控制块
pub struct Proc {
    pub(crate) generation: u32,
    pub(crate) state: ProcState,
    pub(crate) pid: Pid,
    pub(crate) tid: Tid,
    /// 线程组主线程的槽位（主线程指向自己）
    pub(crate) group: usize,
    /// 父进程（仅主线程）
    pub(crate) parent: Option<SlotId>,
    pub(crate) name: String,
    pub(crate) flags: ProcFlags,
    pub(crate) chan: Option<Channel>,
    /// 入睡序号，`wakeup_one` 唤醒等待最久的睡眠者
    pub(crate) sleep_seq: u64,
    pub(crate) xstate: i32,
    pub(crate) retval: usize,
    /// 正在 join 的线程 ID
    pub(crate) waiting_tid: Option<Tid>,

    // 以下线程组字段只在主线程上有效
    pub(crate) se: SchedEntity,
    /// 处于 RUNNABLE/RUNNING 的组成员数
    pub(crate) active: usize,
    pub(crate) thread_count: usize,
    pub(crate) next_tid: Tid,
    /// 地址空间大小
    pub(crate) sz: usize,

    /// 组内轮转环的下一个线程
    pub(crate) t_link: Option<usize>,
    /// 比例份额链表的下一个线程组
    pub(crate) s_link: Option<usize>,

    pub(crate) kstack: Option<KernelStack>,
    pub(crate) context: Option<Context>,
    pub(crate) tf: TrapFrame,
    pub(crate) vm: Option<AddressSpace>,
    /// LWP 私有用户栈页的起始地址
    pub(crate) ustack: usize,
    pub(crate) ofile: [Option<FileRef>; NOFILE],
    pub(crate) cwd: Option<InodeRef>,
}

impl Proc {
    pub fn new() -> Self {
        Self {
            generation: 0,
            state: ProcState::Unused,
            pid: 0,
            tid: 0,
            group: 0,
            parent: None,
            name: String::new(),
            flags: ProcFlags::empty(),
            chan: None,
            sleep_seq: 0,
            xstate: 0,
            retval: 0,
            waiting_tid: None,
            se: SchedEntity::new(),
            active: 0,
            thread_count: 1,
            next_tid: 1,
            sz: 0,
            t_link: None,
            s_link: None,
            kstack: None,
            context: None,
            tf: TrapFrame::default(),
            vm: None,
            ustack: 0,
            ofile: [None; NOFILE],
            cwd: None,
        }
    }

    pub fn state(&self) -> ProcState {
        self.state
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 是否为线程组主线程
    #[inline]
    pub fn is_main(&self) -> bool {
        self.tid == 0
    }

    pub fn killed(&self) -> bool {
        self.flags.contains(ProcFlags::KILLED)
    }
}

impl Default for Proc {
    fn default() -> Self {
        Self::new()
    }
}
