// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// 调度器状态
///
/// NotStarted只在首次排空前出现；此后在Running和Idle之间
/// 切换。"启动即运行"建模为首个tick触发的NotStarted到
/// Running转换，而不是可变的首次运行标志位。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// 尚未触发过排空
    NotStarted,
    /// 一轮排空正在进行
    Running,
    /// 上一轮排空已结束，等待下个tick
    Idle,
}

/// 周期排空调度器
///
/// 保证工作池在进程启动后立即被触发一次，此后按固定周期
/// 触发，与任何单个调用方的生命周期无关。重叠策略：上一轮
/// 排空未结束时本次tick跳过（至多一轮并发排空），保持
/// 工作器的单消息处理纪律不需要跨轮次成立。
pub struct DrainScheduler {
    state: Arc<Mutex<SchedulerState>>,
    interval: Duration,
}

impl DrainScheduler {
    /// 创建新的调度器实例
    ///
    /// # 参数
    ///
    /// * `interval` - 排空周期
    pub fn new(interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState::NotStarted)),
            interval,
        }
    }

    /// 当前调度器状态
    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    /// 启动调度器后台任务
    ///
    /// tokio的interval首个tick立即完成，即冷启动排空。
    /// 排空在独立任务中运行，tick循环因此能观察到重叠
    /// 并跳过。
    ///
    /// # 参数
    ///
    /// * `drain` - 每次触发执行的排空动作
    ///
    /// # 返回值
    ///
    /// 返回后台任务的句柄
    pub fn start<F, Fut>(&self, drain: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let state = self.state.clone();
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let claimed = {
                    let mut state = state.lock();
                    if *state == SchedulerState::Running {
                        false
                    } else {
                        *state = SchedulerState::Running;
                        true
                    }
                };
                if !claimed {
                    info!("Previous drain run still active, skipping tick");
                    metrics::counter!("scheduler_ticks_skipped_total").increment(1);
                    continue;
                }

                let run_state = state.clone();
                let run = drain();
                tokio::spawn(async move {
                    run.await;
                    *run_state.lock() = SchedulerState::Idle;
                });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_first_run_fires_immediately() {
        let runs = Arc::new(AtomicU32::new(0));
        let scheduler = DrainScheduler::new(Duration::from_secs(300));
        assert_eq!(scheduler.state(), SchedulerState::NotStarted);

        let counter = runs.clone();
        let handle = scheduler.start(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_tick_is_skipped() {
        let runs = Arc::new(AtomicU32::new(0));
        let scheduler = DrainScheduler::new(Duration::from_millis(100));

        let counter = runs.clone();
        let handle = scheduler.start(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                // 一轮排空跨越多个tick周期
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });

        // 首轮排空运行期间，所有tick都被跳过
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(), SchedulerState::Running);

        // 首轮结束后，下一个tick启动第二轮
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_recurring_ticks_keep_draining() {
        let runs = Arc::new(AtomicU32::new(0));
        let scheduler = DrainScheduler::new(Duration::from_secs(60));

        let counter = runs.clone();
        let handle = scheduler.start(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(185)).await;
        // 立即一次加三个完整周期
        assert_eq!(runs.load(Ordering::SeqCst), 4);

        handle.abort();
    }
}
