//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 宿主机测试
//!
//! 运行测试：
//! ```bash
//! cargo test --package rux-lwp
//! ```
//!
//! `Machine` 用模拟的内存管理器和文件系统启动一个内核，在若干宿主 CPU 上运行 init，
//! 返回 init 的退出值（即关机码）。模拟器记录内核栈、地址空间页和引用计数，支持注入分配失败。

use std::boxed::Box;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use std::vec::Vec;

use crate::fs::{FileRef, InodeRef, Vfs};
use crate::kernel::Kernel;
use crate::mm::{page_round_up, AddressSpace, KernelStack, Vm, KSTACK_SIZE, PAGE_SIZE};
use crate::process::StartRoutine;

pub mod sched;

/// 等待关机的最长时间
const TIMEOUT: Duration = Duration::from_secs(60);

const ROOT_INODE: usize = 1;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct VmState {
    next_kstack: usize,
    next_space: usize,
    kstacks: BTreeSet<usize>,
    spaces: BTreeMap<usize, BTreeSet<usize>>,
    kstack_budget: Option<usize>,
    page_budget: Option<usize>,
    installs: usize,
}

impl VmState {
    fn take_page(&mut self) -> bool {
        match &mut self.page_budget {
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
            None => true,
        }
    }
}

/// 模拟内存管理器
#[derive(Default)]
pub struct MockVm {
    state: Mutex<VmState>,
}

impl MockVm {
    /// 限制之后还能分配的内核栈数，`None` 表示不限
    pub fn set_kstack_budget(&self, budget: Option<usize>) {
        locked(&self.state).kstack_budget = budget;
    }

    /// 限制之后还能映射的用户页数，`None` 表示不限
    pub fn set_page_budget(&self, budget: Option<usize>) {
        locked(&self.state).page_budget = budget;
    }

    pub fn live_kstacks(&self) -> usize {
        locked(&self.state).kstacks.len()
    }

    pub fn live_spaces(&self) -> usize {
        locked(&self.state).spaces.len()
    }

    pub fn installs(&self) -> usize {
        locked(&self.state).installs
    }
}

impl Vm for MockVm {
    fn alloc_kernel_stack(&self) -> Option<KernelStack> {
        let mut state = locked(&self.state);
        match &mut state.kstack_budget {
            Some(0) => return None,
            Some(n) => *n -= 1,
            None => {}
        }
        state.next_kstack += KSTACK_SIZE;
        let base = state.next_kstack;
        state.kstacks.insert(base);
        Some(KernelStack::new(base))
    }

    fn free_kernel_stack(&self, stack: KernelStack) {
        if !locked(&self.state).kstacks.remove(&stack.base()) {
            panic!("vm: double free of kernel stack {:#x}", stack.base());
        }
    }

    fn create_address_space(&self, size: usize) -> Option<AddressSpace> {
        let mut state = locked(&self.state);
        let mut pages = BTreeSet::new();
        for page in (0..page_round_up(size)).step_by(PAGE_SIZE) {
            if !state.take_page() {
                return None;
            }
            pages.insert(page);
        }
        state.next_space += 1;
        let id = state.next_space;
        state.spaces.insert(id, pages);
        Some(AddressSpace(id))
    }

    fn map_user_pages(&self, space: AddressSpace, from: usize, to: usize) -> Option<usize> {
        let mut state = locked(&self.state);
        let mut mapped = Vec::new();
        for page in (page_round_up(from)..page_round_up(to)).step_by(PAGE_SIZE) {
            if !state.take_page() {
                let pages = state.spaces.get_mut(&space.0)?;
                for page in mapped {
                    pages.remove(&page);
                }
                return None;
            }
            if !state.spaces.get_mut(&space.0)?.insert(page) {
                panic!("vm: page {:#x} mapped twice", page);
            }
            mapped.push(page);
        }
        Some(to)
    }

    fn unmap_user_pages(&self, space: AddressSpace, from: usize, to: usize) -> Option<usize> {
        let mut state = locked(&self.state);
        let pages = state.spaces.get_mut(&space.0)?;
        for page in (page_round_up(from)..page_round_up(to)).step_by(PAGE_SIZE) {
            pages.remove(&page);
        }
        Some(from)
    }

    fn duplicate_address_space(&self, space: AddressSpace, _size: usize) -> Option<AddressSpace> {
        let mut state = locked(&self.state);
        let pages = state.spaces.get(&space.0)?.clone();
        for _ in 0..pages.len() {
            if !state.take_page() {
                return None;
            }
        }
        state.next_space += 1;
        let id = state.next_space;
        state.spaces.insert(id, pages);
        Some(AddressSpace(id))
    }

    fn free_address_space(&self, space: AddressSpace, _size: usize) {
        if locked(&self.state).spaces.remove(&space.0).is_none() {
            panic!("vm: double free of address space {}", space.0);
        }
    }

    fn install(&self, _space: Option<AddressSpace>) {
        locked(&self.state).installs += 1;
    }
}

#[derive(Default)]
struct FsState {
    next_file: usize,
    files: BTreeMap<usize, usize>,
    inodes: BTreeMap<usize, usize>,
}

fn put(refs: &mut BTreeMap<usize, usize>, id: usize, what: &str) {
    match refs.get_mut(&id) {
        Some(1) => {
            refs.remove(&id);
        }
        Some(n) => *n -= 1,
        None => panic!("fs: {} {} released too many times", what, id),
    }
}

/// 模拟文件系统，只记录引用计数
#[derive(Default)]
pub struct MockFs {
    state: Mutex<FsState>,
}

impl MockFs {
    /// 打开一个新文件，引用计数为 1
    pub fn open(&self) -> FileRef {
        let mut state = locked(&self.state);
        state.next_file += 1;
        let id = state.next_file;
        state.files.insert(id, 1);
        FileRef(id)
    }

    pub fn file_refs(&self, file: FileRef) -> usize {
        locked(&self.state).files.get(&file.0).copied().unwrap_or(0)
    }

    pub fn root_refs(&self) -> usize {
        locked(&self.state).inodes.get(&ROOT_INODE).copied().unwrap_or(0)
    }
}

impl Vfs for MockFs {
    fn dup(&self, file: FileRef) -> FileRef {
        match locked(&self.state).files.get_mut(&file.0) {
            Some(n) => *n += 1,
            None => panic!("fs: dup of closed file {}", file.0),
        }
        file
    }

    fn close(&self, file: FileRef) {
        put(&mut locked(&self.state).files, file.0, "file");
    }

    fn idup(&self, inode: InodeRef) -> InodeRef {
        *locked(&self.state).inodes.entry(inode.0).or_insert(0) += 1;
        inode
    }

    fn iput(&self, inode: InodeRef) {
        put(&mut locked(&self.state).inodes, inode.0, "inode");
    }

    fn root(&self) -> InodeRef {
        self.idup(InodeRef(ROOT_INODE))
    }
}

/// 一台用模拟外设启动的机器
pub struct Machine {
    pub kernel: &'static Kernel,
    pub vm: Arc<MockVm>,
    pub fs: Arc<MockFs>,
}

impl Machine {
    pub fn new(ncpu: usize) -> Self {
        let vm = Arc::new(MockVm::default());
        let fs = Arc::new(MockFs::default());
        let kernel = Kernel::new(ncpu, vm.clone(), fs.clone()).expect("kernel boot");
        Self { kernel, vm, fs }
    }

    /// 以 `entry(arg)` 为 init 启动机器，返回关机码
    pub fn run(&self, entry: StartRoutine, arg: usize) -> usize {
        self.kernel.user_init("init", entry, arg).expect("user_init");
        let cpus = self.kernel.start_cpus().expect("start cpus");
        let deadline = Instant::now() + TIMEOUT;
        while !self.kernel.is_halted() {
            if Instant::now() > deadline {
                panic!("machine: timed out");
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        // 调度循环全部退出后，测试线程才能安全地检查内核状态
        for cpu in cpus {
            cpu.join().expect("cpu loop panicked");
        }
        self.kernel.halt_code()
    }
}

/// 把测试状态交给执行实体，返回可作为启动参数的地址
pub fn share<T: Sync + 'static>(value: T) -> (&'static T, usize) {
    let value: &'static T = Box::leak(Box::new(value));
    (value, value as *const T as usize)
}

/// 取回 `share` 交出的状态
pub fn shared<T: Sync + 'static>(arg: usize) -> &'static T {
    // SAFETY: `arg` 来自 `share`，指向一个永不释放的 `T`
    unsafe { &*(arg as *const T) }
}

/// 模拟 `n` 次时钟中断
pub fn spin(kernel: &'static Kernel, n: usize) {
    for _ in 0..n {
        kernel.timer_interrupt();
    }
}
