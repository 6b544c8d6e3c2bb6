//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 内核实例
//!
//! 控制块表、调度状态、每 CPU 状态和外部服务都挂在 `Kernel` 上。
//! 内核实例创建后永不释放，所有执行实体持有 `&'static Kernel`。

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::arch::{self, Context};
use crate::config::MAX_CPUS;
use crate::errno::{Errno, KResult};
use crate::fs::Vfs;
use crate::mm::{AddressSpace, Vm};
use crate::process::{ProcFlags, ProcTable};
use crate::sched::SchedState;
use crate::sync::SpinLock;

const NONE: usize = usize::MAX;

/// 每 CPU 状态
///
/// 只由所属 CPU 在关中断时访问
pub struct Cpu {
    /// 正在运行的执行实体槽位
    current: AtomicUsize,
    /// 调度循环的执行点
    scheduler: Context,
    /// 反馈队列扫描游标
    rover: AtomicUsize,
    /// 已启用的地址空间，0 表示只有内核页表
    space: AtomicUsize,
}

impl Cpu {
    fn new() -> Self {
        Self {
            current: AtomicUsize::new(NONE),
            scheduler: Context::new(),
            rover: AtomicUsize::new(0),
            space: AtomicUsize::new(0),
        }
    }

    pub(crate) fn current(&self) -> Option<usize> {
        match self.current.load(Ordering::Relaxed) {
            NONE => None,
            index => Some(index),
        }
    }

    pub(crate) fn set_current(&self, index: Option<usize>) {
        self.current.store(index.unwrap_or(NONE), Ordering::Relaxed);
    }

    pub(crate) fn scheduler(&self) -> &Context {
        &self.scheduler
    }

    pub(crate) fn rover(&self) -> usize {
        self.rover.load(Ordering::Relaxed)
    }

    pub(crate) fn set_rover(&self, rover: usize) {
        self.rover.store(rover, Ordering::Relaxed);
    }
}

pub struct Kernel {
    pub(crate) table: SpinLock<ProcTable>,
    pub(crate) sched: SpinLock<SchedState>,
    pub(crate) cpus: Vec<Cpu>,
    pub(crate) ticks: AtomicU64,
    pub(crate) tickslock: SpinLock<()>,
    pub(crate) sleep_seq: AtomicU64,
    pub(crate) initproc: AtomicUsize,
    halted: AtomicBool,
    halt_code: AtomicUsize,
    pub(crate) vm: Arc<dyn Vm>,
    pub(crate) fs: Arc<dyn Vfs>,
}

impl Kernel {
    /// 创建内核实例
    ///
    /// `ncpu` 取值 1..=MAX_CPUS
    pub fn new(ncpu: usize, vm: Arc<dyn Vm>, fs: Arc<dyn Vfs>) -> KResult<&'static Kernel> {
        if ncpu == 0 || ncpu > MAX_CPUS {
            return Err(Errno::InvalidArgument);
        }
        let kernel = Box::new(Kernel {
            table: SpinLock::new(ProcTable::new(), "ptable"),
            sched: SpinLock::new(SchedState::new(), "sched"),
            cpus: (0..ncpu).map(|_| Cpu::new()).collect(),
            ticks: AtomicU64::new(0),
            tickslock: SpinLock::new((), "time"),
            sleep_seq: AtomicU64::new(0),
            initproc: AtomicUsize::new(NONE),
            halted: AtomicBool::new(false),
            halt_code: AtomicUsize::new(0),
            vm,
            fs,
        });
        log::info!(
            "{} {}: {} cpu(s)",
            crate::config::KERNEL_NAME,
            crate::config::KERNEL_VERSION,
            ncpu
        );
        Ok(Box::leak(kernel))
    }

    pub fn ncpu(&self) -> usize {
        self.cpus.len()
    }

    /// 启动所有 CPU 的调度循环
    #[cfg(feature = "um")]
    pub fn start_cpus(&'static self) -> KResult<Vec<std::thread::JoinHandle<()>>> {
        (0..self.ncpu())
            .map(|id| arch::start_cpu(id, cpu_main, self).ok_or(Errno::OutOfMemory))
            .collect()
    }

    /// 当前 CPU 上正在运行的执行实体
    pub(crate) fn current_index(&self) -> Option<usize> {
        arch::push_off();
        let current = self.cpus.get(arch::cpu_id()).and_then(Cpu::current);
        arch::pop_off();
        current
    }

    /// 当前执行实体，没有时是致命错误
    pub(crate) fn me(&self) -> usize {
        self.current_index()
            .unwrap_or_else(|| panic!("proc: no current process on cpu{}", arch::cpu_id()))
    }

    pub(crate) fn is_init(&self, index: usize) -> bool {
        self.initproc.load(Ordering::Relaxed) == index
    }

    pub(crate) fn initproc(&self) -> Option<usize> {
        match self.initproc.load(Ordering::Relaxed) {
            NONE => None,
            index => Some(index),
        }
    }

    /// 系统启动以来的滴答数
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// 切换当前 CPU 的地址空间，与已启用的相同时跳过
    pub(crate) fn install_space(&self, cpu: usize, space: Option<AddressSpace>) {
        let want = space.map_or(0, |s| s.0 + 1);
        if self.cpus[cpu].space.swap(want, Ordering::Relaxed) != want {
            self.vm.install(space);
        }
    }

    /// 停止所有 CPU 的调度循环
    pub fn halt(&self, code: usize) {
        self.halt_code.store(code, Ordering::Relaxed);
        self.halted.store(true, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn halt_code(&self) -> usize {
        self.halt_code.load(Ordering::Relaxed)
    }

    /// 返回用户态前的检查：被 kill 的执行实体在这里退出
    pub fn trap_return(&'static self) {
        let Some(me) = self.current_index() else {
            return;
        };
        let (killed, is_main) = {
            let table = self.table.lock();
            (table[me].flags.contains(ProcFlags::KILLED), table[me].is_main())
        };
        if killed {
            if is_main {
                self.exit(-1);
            } else {
                self.thread_exit(0);
            }
        }
    }
}

fn cpu_main(kernel: &'static Kernel, id: usize) {
    kernel.scheduler(id);
}

/// 新执行实体的第一站
///
/// 对应 xv6 的 forkret()：释放调度器转交的控制块表锁，然后进入用户态入口。
/// 入口返回后按主线程/LWP 分别退出，init 返回则关机。
pub(crate) fn forkret(kernel: &'static Kernel) -> ! {
    // SAFETY: 切换方持有控制块表锁切入本执行流
    unsafe { kernel.table.unlock_handoff() };

    kernel.trap_return();

    let me = kernel.me();
    let (tf, is_main) = {
        let table = kernel.table.lock();
        (table[me].tf, table[me].is_main())
    };
    let ret = match tf.entry {
        Some(entry) => entry(kernel, tf.arg),
        None => 0,
    };

    if kernel.is_init(me) {
        kernel.power_off(ret);
    }
    if is_main {
        kernel.exit(ret as i32)
    } else {
        kernel.thread_exit(ret)
    }
}
