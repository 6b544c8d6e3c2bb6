//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 线程组内的轮转环
//!
//! 组内线程通过 `t_link` 串成以主线程为锚点的循环链表，只有主线程时环为空。
//! `next_t` 游标指向下一个应当运行的线程，组内切换严格按环的顺序，跳过不可运行的成员。

use crate::config::NPROC;
use crate::process::ProcState;

use super::policy::Sched;

impl Sched<'_> {
    /// 该执行实体现在能否被切入
    #[inline]
    pub fn eligible(&self, index: usize) -> bool {
        let p = &self.table[index];
        p.state == ProcState::Runnable && p.waiting_tid.is_none()
    }

    /// 线程组中是否有可运行的成员
    pub fn group_eligible(&self, group: usize) -> bool {
        if self.table[group].t_link.is_none() {
            return self.eligible(group);
        }
        let mut cur = group;
        for _ in 0..NPROC {
            if self.eligible(cur) {
                return true;
            }
            cur = self.table[cur].t_link.unwrap_or(group);
            if cur == group {
                break;
            }
        }
        false
    }

    /// 从游标开始沿环找第一个可运行的线程，游标停在它的后继
    pub fn pick_thread(&mut self, group: usize) -> Option<usize> {
        if self.table[group].t_link.is_none() {
            return self.eligible(group).then_some(group);
        }
        let start = self.state.next_t[group].unwrap_or(group);
        let mut cur = start;
        for _ in 0..NPROC {
            let next = self.table[cur].t_link.unwrap_or(group);
            if self.eligible(cur) {
                self.state.next_t[group] = Some(next);
                return Some(cur);
            }
            cur = next;
            if cur == start {
                break;
            }
        }
        None
    }

    /// 把新线程加入环
    ///
    /// 第一个 LWP 建立环并初始化游标，之后的线程插在游标所指线程之后
    pub fn ring_insert(&mut self, group: usize, thread: usize) {
        match self.table[group].t_link {
            None => {
                self.table[group].t_link = Some(thread);
                self.table[thread].t_link = Some(group);
                self.state.next_t[group] = Some(thread);
            }
            Some(_) => {
                let at = self.state.next_t[group].unwrap_or(group);
                self.table[thread].t_link = self.table[at].t_link;
                self.table[at].t_link = Some(thread);
            }
        }
    }

    /// 把线程移出环，游标指向它时前移到后继
    pub fn ring_remove(&mut self, thread: usize) {
        let group = self.table[thread].group;
        let mut prev = group;
        let mut found = false;
        for _ in 0..NPROC {
            match self.table[prev].t_link {
                Some(next) if next == thread => {
                    found = true;
                    break;
                }
                Some(next) if next != group => prev = next,
                _ => break,
            }
        }
        if !found {
            return;
        }

        let next = self.table[thread].t_link.take();
        self.table[prev].t_link = next;
        if self.state.next_t[group] == Some(thread) {
            self.state.next_t[group] = next;
        }
        if self.table[group].t_link == Some(group) {
            self.table[group].t_link = None;
            self.state.next_t[group] = None;
        }
    }

    /// 环中非主线程成员的数量
    pub fn ring_len(&self, group: usize) -> usize {
        let mut len = 0;
        let mut cur = self.table[group].t_link;
        for _ in 0..NPROC {
            match cur {
                Some(i) if i != group => {
                    len += 1;
                    cur = self.table[i].t_link;
                }
                _ => break,
            }
        }
        len
    }
}
