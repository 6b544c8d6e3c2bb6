//! Rux LWP 内核构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml 配置文件
//! 2. 生成 src/config.rs

use std::env;
use std::fs;
use std::path::PathBuf;

/// 读取 `[section] key` 形式的整数配置，缺省时使用 `default`
fn int(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

fn main() {
    println!("cargo:rerun-if-changed=../Kernel.toml");
    println!("cargo:rerun-if-changed=build.rs");

    let config_content = fs::read_to_string("../Kernel.toml")
        .expect("无法读取 Kernel.toml");

    let config: toml::Value = toml::from_str(&config_content)
        .expect("配置文件解析失败");

    if let Some(general) = config.get("general") {
        if let Some(name) = general.get("name").and_then(|v| v.as_str()) {
            println!("cargo:rustc-env=CARGO_KERNEL_NAME={}", name);
        }
        if let Some(version) = general.get("version").and_then(|v| v.as_str()) {
            println!("cargo:rustc-env=CARGO_KERNEL_VERSION={}", version);
        }
    }

    generate_config_code(&config);
}

fn generate_config_code(config: &toml::Value) {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR 未设置"));

    let kernel_name = config.get("general")
        .and_then(|g| g.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or("rux-lwp");

    let kernel_version = config.get("general")
        .and_then(|g| g.get("version"))
        .and_then(|v| v.as_str())
        .unwrap_or("0.1.0");

    let page_size = int(config, "memory", "page_size", 4096);
    let kstack_pages = int(config, "memory", "kernel_stack_pages", 1);

    let config_header = format!(
        r#"//! Rux LWP 内核配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "{}";

/// 内核版本
pub const KERNEL_VERSION: &str = "{}";

// ============================================================
// SMP 配置
// ============================================================

/// 最大CPU数量
pub const MAX_CPUS: usize = {};

// ============================================================
// 内存配置
// ============================================================

/// 页大小
pub const PAGE_SIZE: usize = {};

/// 内核栈大小（字节）
pub const KSTACK_SIZE: usize = {};

// ============================================================
// 进程配置
// ============================================================

/// 控制块表容量
pub const NPROC: usize = {};

/// 每个执行实体的打开文件数上限
pub const NOFILE: usize = {};

// ============================================================
// 调度器配置
// ============================================================

/// 反馈队列级数
pub const MLFQ_LEVELS: usize = 3;

/// 各级时间片（滴答），下标为级别
pub const MLFQ_QUANTUM: [u32; MLFQ_LEVELS] = [{}, {}, {}];

/// 各级时间配额（滴答），0 表示最低级不再降级
pub const MLFQ_ALLOTMENT: [u32; MLFQ_LEVELS] = [0, {}, {}];

/// 优先级提升间隔（滴答）
pub const BOOST_INTERVAL: u64 = {};

/// stride 被除数
pub const STRIDE_DIVIDEND: u64 = {};

/// 比例份额总上限（百分比）
pub const MAX_STRIDE_SHARE: u32 = {};

/// 比例份额实体的时间片（滴答）
pub const STRIDE_QUANTUM: u32 = {};
"#,
        kernel_name,
        kernel_version,
        int(config, "smp", "max_cpus", 8),
        page_size,
        page_size * kstack_pages,
        int(config, "process", "max_procs", 64),
        int(config, "process", "max_open_files", 16),
        int(config, "scheduler", "level0_quantum", 20),
        int(config, "scheduler", "level1_quantum", 10),
        int(config, "scheduler", "level2_quantum", 5),
        int(config, "scheduler", "level1_allotment", 40),
        int(config, "scheduler", "level2_allotment", 20),
        int(config, "scheduler", "boost_interval", 200),
        int(config, "scheduler", "stride_dividend", 10000),
        int(config, "scheduler", "max_stride_share", 80),
        int(config, "scheduler", "stride_quantum", 1),
    );

    let config_file = manifest_dir.join("src").join("config.rs");

    // 只有内容变化时才写入，避免每次编译都更新文件时间戳
    let existing_content = fs::read_to_string(&config_file).unwrap_or_default();
    if existing_content != config_header {
        fs::write(&config_file, &config_header)
            .expect("写入配置文件失败");
    }
}
