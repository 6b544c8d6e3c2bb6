//! Rux LWP 内核配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "rux-lwp";

/// 内核版本
pub const KERNEL_VERSION: &str = "0.1.0";

// ============================================================
// SMP 配置
// ============================================================

/// 最大CPU数量
pub const MAX_CPUS: usize = 8;

// ============================================================
// 内存配置
// ============================================================

/// 页大小
pub const PAGE_SIZE: usize = 4096;

/// 内核栈大小（字节）
pub const KSTACK_SIZE: usize = 4096;

// ============================================================
// 进程配置
// ============================================================

/// 控制块表容量
pub const NPROC: usize = 64;

/// 每个执行实体的打开文件数上限
pub const NOFILE: usize = 16;

// ============================================================
// 调度器配置
// ============================================================

/// 反馈队列级数
pub const MLFQ_LEVELS: usize = 3;

/// 各级时间片（滴答），下标为级别
pub const MLFQ_QUANTUM: [u32; MLFQ_LEVELS] = [20, 10, 5];

/// 各级时间配额（滴答），0 表示最低级不再降级
pub const MLFQ_ALLOTMENT: [u32; MLFQ_LEVELS] = [0, 40, 20];

/// 优先级提升间隔（滴答）
pub const BOOST_INTERVAL: u64 = 200;

/// stride 被除数
pub const STRIDE_DIVIDEND: u64 = 10000;

/// 比例份额总上限（百分比）
pub const MAX_STRIDE_SHARE: u32 = 80;

/// 比例份额实体的时间片（滴答）
pub const STRIDE_QUANTUM: u32 = 1;
