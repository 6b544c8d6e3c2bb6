//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! um 上下文切换
//!
//! 对应真实架构的 cpu_switch_to：保存当前执行点，恢复另一个。
//! 每个上下文有一道闸门，`switch` 打开目标的闸门并交出 CPU 编号，然后在自己的闸门上等待。

use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// 闸门令牌：已回收的上下文永远不会再被调度
const RETIRED: usize = usize::MAX;

/// 执行实体宿主线程的栈大小
const STACK_SIZE: usize = 256 * 1024;

struct Gate {
    token: Mutex<Option<usize>>,
    cond: Condvar,
}

impl Gate {
    fn new() -> Self {
        Self {
            token: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    fn open(&self, cpu: usize) {
        let mut token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        *token = Some(cpu);
        self.cond.notify_one();
    }

    fn wait(&self) -> usize {
        let mut token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(cpu) = token.take() {
                return cpu;
            }
            token = self.cond.wait(token).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// 保存的执行点
///
/// 克隆得到的是同一个执行点的引用
#[derive(Clone)]
pub struct Context {
    gate: Arc<Gate>,
}

impl Context {
    /// 当前宿主线程自身的执行点（CPU 调度循环使用）
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Gate::new()),
        }
    }

    /// 构造一个新执行点，第一次被切入时在新栈上运行 `entry(arg)`
    ///
    /// 新执行流继承切换方持有的控制块表锁，`entry` 负责释放它
    pub fn spawn<T: Sync + 'static>(entry: fn(&'static T) -> !, arg: &'static T) -> Option<Self> {
        let gate = Arc::new(Gate::new());
        let start = Arc::clone(&gate);
        std::thread::Builder::new()
            .stack_size(STACK_SIZE)
            .spawn(move || {
                let cpu = start.wait();
                if cpu == RETIRED {
                    return;
                }
                drop(start);
                super::cpu::set_cpu_id(cpu);
                super::cpu::inherit_handoff();
                entry(arg)
            })
            .ok()?;
        Some(Self { gate })
    }

    /// 控制块被回收时调用，该执行点不会再被切入
    pub fn retire(&self) {
        self.gate.open(RETIRED);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// 保存当前执行点到 `from`，切换到 `to`
///
/// 返回时当前执行流已被某个 CPU 重新切入
pub fn switch(from: &Context, to: &Context) {
    to.gate.open(super::cpu::cpu_id());
    let cpu = from.gate.wait();
    if cpu == RETIRED {
        loop {
            std::thread::park();
        }
    }
    super::cpu::set_cpu_id(cpu);
}
