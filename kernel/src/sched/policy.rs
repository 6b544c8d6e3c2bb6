//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 混合调度策略：多级反馈队列 (MLFQ) + 比例份额 (stride)
//!
//! 调度单位是线程组，调度类字段记录在主线程控制块上：
//! - 反馈队列三级，2 为最高级；组用完本级配额后降一级，每隔 `BOOST_INTERVAL` 个滴答全部提回最高级
//! - 比例份额组按 `STRIDE_DIVIDEND / share` 累加 pass，pass 最小者先运行
//! - 整个反馈队列作为一个虚拟实体参与 pass 比较，其 stride 由剩余的未分配份额决定
//!
//! 本文件中的操作都通过 `Sched` 视图进行，构造它需要同时持有控制块表和调度状态，
//! 保证加锁顺序固定为：控制块表锁在外，调度状态锁在内。

use crate::config::{
    BOOST_INTERVAL, MAX_STRIDE_SHARE, MLFQ_ALLOTMENT, MLFQ_LEVELS, MLFQ_QUANTUM, NPROC,
    STRIDE_DIVIDEND, STRIDE_QUANTUM,
};
use crate::errno::{Errno, KResult};
use crate::process::{Channel, ProcState, ProcTable};

/// 反馈队列最高级
pub const TOP_LEVEL: usize = MLFQ_LEVELS - 1;

/// 四舍五入的整数除法
#[inline]
const fn div_round(dividend: u64, divisor: u64) -> u64 {
    (dividend + divisor / 2) / divisor
}

/// 调度类
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SchedClass {
    /// 反馈队列，参数为级别
    Feedback(usize),
    /// 比例份额
    Share,
}

/// 调度实体
///
/// 对应 Linux 的 struct sched_entity，记录在线程组主线程上
#[derive(Debug, Copy, Clone)]
pub struct SchedEntity {
    pub class: SchedClass,
    /// 时间片（滴答）
    pub quantum: u32,
    /// 本级时间配额（滴答），0 表示不再降级
    pub allotment: u32,
    /// 进入本级（或本类）以来消耗的滴答
    pub ticks: u32,
    /// 份额百分比
    pub share: u32,
    pub stride: u64,
    pub pass: u64,
}

impl SchedEntity {
    pub const fn new() -> Self {
        Self {
            class: SchedClass::Feedback(TOP_LEVEL),
            quantum: MLFQ_QUANTUM[TOP_LEVEL],
            allotment: MLFQ_ALLOTMENT[TOP_LEVEL],
            ticks: 0,
            share: 0,
            stride: 0,
            pass: 0,
        }
    }

    /// 进入反馈队列第 `level` 级，重置时间片、配额和计数
    fn enter_level(&mut self, level: usize) {
        self.class = SchedClass::Feedback(level);
        self.quantum = MLFQ_QUANTUM[level];
        self.allotment = MLFQ_ALLOTMENT[level];
        self.ticks = 0;
    }

    /// 用户可见的级别，比例份额组为 -1
    pub fn level(&self) -> i32 {
        match self.class {
            SchedClass::Feedback(level) => level as i32,
            SchedClass::Share => -1,
        }
    }
}

impl Default for SchedEntity {
    fn default() -> Self {
        Self::new()
    }
}

/// 调度状态
pub struct SchedState {
    /// 上次优先级提升的时刻
    pub(crate) boost_time: u64,
    /// 反馈队列整体的 pass 和 stride
    pub(crate) mlfq_pass: u64,
    pub(crate) mlfq_stride: u64,
    /// 反馈队列中活跃的线程组数
    pub(crate) mlfq_count: usize,
    /// 各级活跃线程组数
    pub(crate) qlevels: [usize; MLFQ_LEVELS],
    /// 比例份额链表头
    pub(crate) stride_head: Option<usize>,
    /// 已分配的份额总和
    pub(crate) stride_share: u32,
    /// 各线程组的下一个线程游标，按主线程槽位索引
    pub(crate) next_t: [Option<usize>; NPROC],
}

impl SchedState {
    pub const fn new() -> Self {
        Self {
            boost_time: 0,
            mlfq_pass: 0,
            mlfq_stride: div_round(STRIDE_DIVIDEND, 100),
            mlfq_count: 0,
            qlevels: [0; MLFQ_LEVELS],
            stride_head: None,
            stride_share: 0,
            next_t: [None; NPROC],
        }
    }

    pub fn stride_share(&self) -> u32 {
        self.stride_share
    }

    pub fn mlfq_count(&self) -> usize {
        self.mlfq_count
    }

    pub fn qlevel(&self, level: usize) -> usize {
        self.qlevels[level]
    }
}

impl Default for SchedState {
    fn default() -> Self {
        Self::new()
    }
}

/// 同时持有控制块表和调度状态的视图
pub struct Sched<'a> {
    pub table: &'a mut ProcTable,
    pub state: &'a mut SchedState,
}

impl Sched<'_> {
    /// 迁移状态，维护线程组活跃计数和反馈队列人数
    ///
    /// 所有改变可运行性的状态修改都必须经过这里
    pub fn set_state(&mut self, index: usize, new: ProcState) {
        let old = self.table[index].state;
        self.table[index].state = new;
        if old.is_active() == new.is_active() {
            return;
        }
        let group = self.table[index].group;
        if new.is_active() {
            self.table[group].active += 1;
            if self.table[group].active == 1 {
                self.mlfq_add(group);
            }
        } else {
            let leader = &mut self.table[group];
            if leader.active == 0 {
                panic!("sched: pid {} active count underflow", leader.pid);
            }
            leader.active -= 1;
            if leader.active == 0 {
                self.mlfq_rm(group);
            }
        }
    }

    fn mlfq_add(&mut self, group: usize) {
        if let SchedClass::Feedback(level) = self.table[group].se.class {
            self.state.qlevels[level] += 1;
            self.state.mlfq_count += 1;
        }
    }

    fn mlfq_rm(&mut self, group: usize) {
        if let SchedClass::Feedback(level) = self.table[group].se.class {
            if self.state.qlevels[level] == 0 || self.state.mlfq_count == 0 {
                panic!("sched: level {} population underflow", level);
            }
            self.state.qlevels[level] -= 1;
            self.state.mlfq_count -= 1;
        }
    }

    /// 把线程组移到反馈队列第 `level` 级
    fn set_level(&mut self, group: usize, level: usize) {
        let active = self.table[group].active > 0;
        if active {
            self.mlfq_rm(group);
        }
        self.table[group].se.enter_level(level);
        if active {
            self.mlfq_add(group);
        }
    }

    /// 降一级，已在最低级时返回 false
    pub fn lower_level(&mut self, group: usize) -> bool {
        match self.table[group].se.class {
            SchedClass::Feedback(level) if level > 0 => {
                self.set_level(group, level - 1);
                true
            }
            _ => false,
        }
    }

    /// 优先级提升：所有活跃的反馈队列线程组回到最高级
    pub fn priority_boost(&mut self) {
        for i in 0..NPROC {
            if self.table.is_leader(i)
                && self.table[i].active > 0
                && matches!(self.table[i].se.class, SchedClass::Feedback(_))
            {
                self.set_level(i, TOP_LEVEL);
            }
        }
    }

    /// 记账一个滴答，返回是否需要重新调度
    ///
    /// 依次处理：降级、周期性优先级提升、pass 推进、时间片检查
    pub fn charge_tick(&mut self, index: usize, now: u64) -> bool {
        let group = self.table[index].group;
        let se = &mut self.table[group].se;
        se.ticks += 1;
        let class = se.class;
        let consumed = se.ticks;

        let mut lowered = false;
        if let SchedClass::Feedback(level) = class {
            let allotment = MLFQ_ALLOTMENT[level];
            if allotment > 0 && consumed >= allotment {
                lowered = self.lower_level(group);
            }
        }

        if now.saturating_sub(self.state.boost_time) >= BOOST_INTERVAL {
            self.state.boost_time = now;
            self.priority_boost();
            log::trace!("sched: priority boost at tick {}", now);
        }

        if self.state.stride_head.is_some() {
            match class {
                SchedClass::Share => {
                    let se = &mut self.table[group].se;
                    se.pass += se.stride;
                }
                SchedClass::Feedback(_) => self.state.mlfq_pass += self.state.mlfq_stride,
            }
        }

        let se = &mut self.table[group].se;
        let expired = se.ticks % se.quantum.max(1) == 0;
        if expired && se.allotment == 0 {
            // 没有时间配额的组（最低级、比例份额）按时间片清零
            se.ticks = 0;
        }
        lowered || expired
    }

    // ---------- 比例份额 ----------

    pub fn in_share_list(&self, group: usize) -> bool {
        let mut cur = self.state.stride_head;
        for _ in 0..NPROC {
            match cur {
                Some(i) if i == group => return true,
                Some(i) => cur = self.table[i].s_link,
                None => return false,
            }
        }
        false
    }

    fn share_unlink(&mut self, group: usize) {
        let mut prev: Option<usize> = None;
        let mut cur = self.state.stride_head;
        for _ in 0..NPROC {
            let Some(i) = cur else { return };
            if i == group {
                let next = self.table[i].s_link.take();
                match prev {
                    Some(p) => self.table[p].s_link = next,
                    None => self.state.stride_head = next,
                }
                return;
            }
            prev = Some(i);
            cur = self.table[i].s_link;
        }
    }

    fn update_mlfq_stride(&mut self) {
        let rest = 100 - self.state.stride_share as u64;
        self.state.mlfq_stride = div_round(STRIDE_DIVIDEND, rest);
    }

    /// 申请 CPU 份额
    ///
    /// 拒绝非正数，以及会使份额总和超过 `MAX_STRIDE_SHARE` 的请求，拒绝时不修改任何状态。
    /// 已在比例份额链表中的组用新份额替换旧份额并保留 pass，首次加入的组 pass 从 0 开始。
    pub fn set_cpu_share(&mut self, index: usize, share: i32) -> KResult<()> {
        if share <= 0 {
            return Err(Errno::InvalidArgument);
        }
        let share = share as u32;
        let group = self.table[index].group;
        let previous = match self.table[group].se.class {
            SchedClass::Share => self.table[group].se.share,
            SchedClass::Feedback(_) => 0,
        };
        let total = self.state.stride_share - previous + share;
        if total > MAX_STRIDE_SHARE {
            return Err(Errno::InvalidArgument);
        }

        if let SchedClass::Feedback(_) = self.table[group].se.class {
            if self.table[group].active > 0 {
                self.mlfq_rm(group);
            }
            self.table[group].s_link = self.state.stride_head;
            self.state.stride_head = Some(group);
            self.table[group].se.pass = 0;
        }

        let se = &mut self.table[group].se;
        se.class = SchedClass::Share;
        se.share = share;
        se.stride = div_round(STRIDE_DIVIDEND, share as u64);
        se.quantum = STRIDE_QUANTUM;
        se.allotment = 0;
        se.ticks = 0;

        self.state.stride_share = total;
        self.update_mlfq_stride();
        Ok(())
    }

    /// 线程组离开比例份额链表（退出时调用），之后按新组处理
    pub fn leave_share(&mut self, group: usize) {
        if self.table[group].se.class != SchedClass::Share {
            return;
        }
        self.share_unlink(group);
        self.state.stride_share -= self.table[group].se.share;
        self.update_mlfq_stride();
        if self.state.stride_head.is_none() {
            self.state.mlfq_pass = 0;
        }
        let active = self.table[group].active > 0;
        self.table[group].se = SchedEntity::new();
        if active {
            self.mlfq_add(group);
        }
    }

    // ---------- 选择 ----------

    /// pass 最小的可运行比例份额组，同 pass 时链表靠前者优先
    fn share_candidate(&self) -> Option<(usize, u64)> {
        let mut best: Option<(usize, u64)> = None;
        let mut cur = self.state.stride_head;
        for _ in 0..NPROC {
            let Some(i) = cur else { break };
            if self.group_eligible(i) {
                let pass = self.table[i].se.pass;
                if best.map_or(true, |(_, min)| pass < min) {
                    best = Some((i, pass));
                }
            }
            cur = self.table[i].s_link;
        }
        best
    }

    /// 从 `rover` 开始扫描一整圈，找第 `level` 级第一个可运行的线程组
    fn scan_level(&self, level: usize, rover: &mut usize) -> Option<usize> {
        for _ in 0..NPROC {
            let i = *rover;
            *rover = (i + 1) % NPROC;
            if self.table.is_leader(i)
                && self.table[i].se.class == SchedClass::Feedback(level)
                && self.group_eligible(i)
            {
                return Some(i);
            }
        }
        None
    }

    /// 选出下一个要运行的执行实体
    ///
    /// 1. 比例份额组的最小 pass 不大于反馈队列整体 pass 时选它（相等时优先比例份额）
    /// 2. 否则从高到低扫描反馈队列各级
    /// 3. 线程组有多个线程时，用组内游标选出具体线程
    ///
    /// 反馈队列没有可运行者时回退到比例份额候选
    pub fn pick_next(&mut self, rover: &mut usize) -> Option<usize> {
        let candidate = self.share_candidate();
        if let Some((group, pass)) = candidate {
            if self.state.mlfq_count == 0 || pass <= self.state.mlfq_pass {
                return self.pick_thread(group);
            }
        }

        for level in (0..MLFQ_LEVELS).rev() {
            if self.state.qlevels[level] == 0 {
                continue;
            }
            if let Some(group) = self.scan_level(level, rover) {
                return self.pick_thread(group);
            }
        }

        candidate.and_then(|(group, _)| self.pick_thread(group))
    }

    // ---------- 睡眠与唤醒 ----------

    /// 唤醒 `chan` 上的所有睡眠者
    pub fn wakeup(&mut self, chan: Channel) {
        for i in 0..NPROC {
            if self.table[i].state == ProcState::Sleeping && self.table[i].chan == Some(chan) {
                self.set_state(i, ProcState::Runnable);
            }
        }
    }

    /// 只唤醒 `chan` 上等待最久的一个睡眠者
    pub fn wakeup_one(&mut self, chan: Channel) -> bool {
        let oldest = (0..NPROC)
            .filter(|&i| {
                self.table[i].state == ProcState::Sleeping && self.table[i].chan == Some(chan)
            })
            .min_by_key(|&i| self.table[i].sleep_seq);
        match oldest {
            Some(i) => {
                self.set_state(i, ProcState::Runnable);
                true
            }
            None => false,
        }
    }
}
