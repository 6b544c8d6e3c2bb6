//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 内存管理接口
//!
//! 调度与线程子系统不直接管理页，只通过 `Vm` 调用外部内存管理器：
//! 分配内核栈、映射用户页、复制或释放地址空间、切换当前 CPU 的页表。

pub use crate::config::{KSTACK_SIZE, PAGE_SIZE};

/// 地址空间句柄
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AddressSpace(pub usize);

/// 一段内核栈
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KernelStack {
    base: usize,
}

impl KernelStack {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    pub fn base(&self) -> usize {
        self.base
    }
}

/// 向上对齐到页边界
#[inline]
pub const fn page_round_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// 外部内存管理器
///
/// 实现可能在内核自旋锁持有期间被调用，不得阻塞，也不得回调调度器
pub trait Vm: Send + Sync {
    /// 分配一页内核栈
    fn alloc_kernel_stack(&self) -> Option<KernelStack>;

    fn free_kernel_stack(&self, stack: KernelStack);

    /// 创建新的用户地址空间并映射 `[0, size)`
    fn create_address_space(&self, size: usize) -> Option<AddressSpace>;

    /// 映射 `[from, to)`，返回新的地址空间大小
    fn map_user_pages(&self, space: AddressSpace, from: usize, to: usize) -> Option<usize>;

    /// 解除 `[from, to)` 的映射，返回新的地址空间大小
    fn unmap_user_pages(&self, space: AddressSpace, from: usize, to: usize) -> Option<usize>;

    /// 复制地址空间 `[0, size)`
    fn duplicate_address_space(&self, space: AddressSpace, size: usize) -> Option<AddressSpace>;

    fn free_address_space(&self, space: AddressSpace, size: usize);

    /// 在当前 CPU 上启用该地址空间，`None` 表示只使用内核页表
    fn install(&self, space: Option<AddressSpace>);
}
