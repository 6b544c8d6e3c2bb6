// 测试：混合调度
//
// 测试内容：
// 1. getlev - 降级与周期性优先级提升的时间线
// 2. set_cpu_share - 参数检查、总量上限、退出时归还份额
// 3. 比例份额进程实际得到的 CPU 比例
// 4. LWP 看到的是线程组的级别
// 5. 组内切换不重新加载地址空间，进程间切换才加载
// 6. 不持有控制块表锁时操作调度状态是致命错误

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use super::{locked, share, shared, spin, Machine, MockVm};
use crate::config::BOOST_INTERVAL;
use crate::errno::KResult;
use crate::kernel::Kernel;
use crate::process::ProcTable;
use crate::syscall;

// ---------- 1. getlev ----------

fn timeline_main(kernel: &'static Kernel, arg: usize) -> usize {
    let levels: &Mutex<Vec<i32>> = shared(arg);
    let mut seen = Vec::new();
    seen.push(kernel.get_feedback_level());
    for _ in 0..BOOST_INTERVAL {
        kernel.timer_interrupt();
        seen.push(kernel.get_feedback_level());
    }
    *locked(levels) = seen;
    kernel.uptime() as usize
}

#[test]
fn test_getlev_timeline() {
    let machine = Machine::new(1);
    let (levels, arg) = share(Mutex::<Vec<i32>>::new(Vec::new()));
    // 只有 init 在运行，每次时钟中断都记在它头上
    assert_eq!(machine.run(timeline_main, arg), BOOST_INTERVAL as usize);

    let expected: Vec<i32> = (0..=BOOST_INTERVAL)
        .map(|tick| match tick {
            0..=19 => 2,
            20..=59 => 1,
            t if t < BOOST_INTERVAL => 0,
            _ => 2,
        })
        .collect();
    assert_eq!(*locked(levels), expected);
}

// ---------- 2. set_cpu_share ----------

#[derive(Default)]
struct Shares {
    parent: Mutex<Vec<isize>>,
    child: Mutex<Vec<isize>>,
}

fn share_child(kernel: &'static Kernel, arg: usize) -> usize {
    let s: &Shares = shared(arg);
    let rets = [
        syscall::sys_set_cpu_share(kernel, 40),
        syscall::sys_set_cpu_share(kernel, 30),
        syscall::sys_getlev(kernel),
    ];
    locked(&s.child).extend(rets);
    0
}

fn share_main(kernel: &'static Kernel, arg: usize) -> usize {
    let s: &Shares = shared(arg);
    let mut rets = Vec::new();
    rets.push(syscall::sys_set_cpu_share(kernel, 0));
    rets.push(syscall::sys_set_cpu_share(kernel, 81));
    rets.push(syscall::sys_getlev(kernel));
    rets.push(syscall::sys_set_cpu_share(kernel, 50));
    rets.push(syscall::sys_getlev(kernel));

    kernel.fork(share_child, arg).expect("fork");
    kernel.wait().expect("wait");

    // 子进程的 30% 已经归还，自己的 50% 换成 80%
    rets.push(syscall::sys_set_cpu_share(kernel, 80));
    rets.push(syscall::sys_set_cpu_share(kernel, 1));
    *locked(&s.parent) = rets;
    0
}

#[test]
fn test_set_cpu_share() {
    let machine = Machine::new(1);
    let (s, arg) = share(Shares::default());
    assert_eq!(machine.run(share_main, arg), 0);

    assert_eq!(*locked(&s.parent), [-22, -22, 2, 0, -1, 0, 0]);
    // 50 + 40 超过上限，50 + 30 恰好等于上限
    assert_eq!(*locked(&s.child), [-22, 0, -1]);
}

// ---------- 3. 比例份额 ----------

const START: u64 = 10;
const END: u64 = START + 1000;

#[derive(Default)]
struct Race {
    ran: [AtomicUsize; 2],
}

/// 等到 `START` 后一起开跑，统计 `END` 之前自己记账的滴答数
fn race(kernel: &'static Kernel, r: &Race, lane: usize) {
    while kernel.uptime() < START {
        kernel.sleep_ticks(1).expect("sleep");
    }
    let mut ticks = 0;
    while kernel.uptime() < END {
        kernel.timer_interrupt();
        ticks += 1;
    }
    r.ran[lane].store(ticks, Ordering::Relaxed);
}

fn share_racer(kernel: &'static Kernel, arg: usize) -> usize {
    kernel.set_cpu_share(20).expect("set_cpu_share");
    race(kernel, shared(arg), 0);
    0
}

fn mlfq_racer(kernel: &'static Kernel, arg: usize) -> usize {
    race(kernel, shared(arg), 1);
    0
}

fn race_main(kernel: &'static Kernel, arg: usize) -> usize {
    kernel.fork(share_racer, arg).expect("fork");
    kernel.fork(mlfq_racer, arg).expect("fork");
    kernel.wait().expect("wait");
    kernel.wait().expect("wait");
    0
}

#[test]
fn test_stride_share_ratio() {
    let machine = Machine::new(1);
    let (r, arg) = share(Race::default());
    assert_eq!(machine.run(race_main, arg), 0);

    let shared_ticks = r.ran[0].load(Ordering::Relaxed);
    let mlfq_ticks = r.ran[1].load(Ordering::Relaxed);
    let total = shared_ticks + mlfq_ticks;
    assert!(total >= 990, "only {} ticks charged", total);
    let percent = shared_ticks * 100 / total;
    assert!(
        (15..=25).contains(&percent),
        "20% share got {}% ({} of {})",
        percent,
        shared_ticks,
        total
    );
}

// ---------- 4. LWP 的级别 ----------

fn report_level(kernel: &'static Kernel, _arg: usize) -> usize {
    (kernel.get_feedback_level() + 1) as usize
}

fn lwp_level_main(kernel: &'static Kernel, arg: usize) -> usize {
    let seen: &Mutex<Vec<KResult<usize>>> = shared(arg);
    let mut results = Vec::new();
    let handle = kernel.thread_create(report_level, 0).expect("thread_create");
    results.push(kernel.thread_join(handle));

    kernel.set_cpu_share(10).expect("set_cpu_share");
    let handle = kernel.thread_create(report_level, 0).expect("thread_create");
    results.push(kernel.thread_join(handle));

    results.push(Ok(syscall::sys_yield(kernel) as usize));
    *locked(seen) = results;
    0
}

#[test]
fn test_lwp_reports_group_level() {
    let machine = Machine::new(1);
    let (seen, arg) = share(Mutex::<Vec<KResult<usize>>>::new(Vec::new()));
    assert_eq!(machine.run(lwp_level_main, arg), 0);
    // 级别 + 1：反馈队列最高级为 3，比例份额为 0
    assert_eq!(*locked(seen), [Ok(3), Ok(0), Ok(0)]);
}

// ---------- 5. 地址空间切换 ----------

struct Spaces {
    vm: Arc<MockVm>,
    ran: Mutex<Vec<u32>>,
    installs: Mutex<Vec<usize>>,
}

fn take_turns(kernel: &'static Kernel, arg: usize) -> usize {
    let sp: &Spaces = shared(arg);
    for _ in 0..8 {
        locked(&sp.ran).push(kernel.gettid());
        spin(kernel, 1);
    }
    0
}

fn return_now(_kernel: &'static Kernel, _arg: usize) -> usize {
    0
}

fn spaces_main(kernel: &'static Kernel, arg: usize) -> usize {
    let sp: &Spaces = shared(arg);
    let record = || locked(&sp.installs).push(sp.vm.installs());

    record();
    let handle = kernel.thread_create(take_turns, arg).expect("thread_create");
    take_turns(kernel, arg);
    kernel.thread_join(handle).expect("thread_join");
    record();

    kernel.fork(return_now, 0).expect("fork");
    kernel.wait().expect("wait");
    record();
    0
}

#[test]
fn test_address_space_switch_only_between_processes() {
    let machine = Machine::new(1);
    let (sp, arg) = share(Spaces {
        vm: machine.vm.clone(),
        ran: Mutex::new(Vec::new()),
        installs: Mutex::new(Vec::new()),
    });
    assert_eq!(machine.run(spaces_main, arg), 0);

    // 两个线程确实交替运行过
    let ran = locked(&sp.ran);
    assert_eq!(ran.len(), 16);
    assert!(ran.windows(2).any(|w| w[0] != w[1]));

    // 换到子进程一次，换回 init 一次
    let installs = locked(&sp.installs);
    assert_eq!(installs[1], installs[0]);
    assert_eq!(installs[2], installs[0] + 2);
}

// ---------- 6. 锁顺序 ----------

#[test]
#[should_panic(expected = "ptable lock not held")]
fn test_sched_state_requires_table_lock() {
    let machine = Machine::new(1);
    let mut table = ProcTable::new();
    machine.kernel.with_sched(&mut table, |s| s.state.mlfq_count());
}
