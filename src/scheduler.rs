use crate::info;
use chrono::{DateTime, Local, NaiveTime, TimeZone};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::AbortHandle;

/// 全局定时任务管理器
pub struct Scheduler {
    tasks: Mutex<HashMap<u64, AbortHandle>>,
    next_id: AtomicU64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// 添加一个灵活调度任务
    ///
    /// `next_run_calculator` 接收当前时间，返回下一次执行时间，返回 None 时任务停止。
    pub fn add_schedule<C, F, Fut>(&self, mut next_run_calculator: C, mut task_gen: F) -> u64
    where
        C: FnMut(DateTime<Local>) -> Option<DateTime<Local>> + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let mut next_time = next_run_calculator(Local::now());

        let handle = tokio::spawn(async move {
            while let Some(target_time) = next_time {
                let now = Local::now();

                if target_time > now {
                    let duration = (target_time - now)
                        .to_std()
                        .unwrap_or(Duration::from_millis(0));
                    tokio::time::sleep(duration).await;
                }

                task_gen().await;

                next_time = next_run_calculator(Local::now());
            }
        });

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.insert(id, handle.abort_handle());
        }
        id
    }

    /// 每天特定时间执行
    pub fn add_daily_at<F, Fut>(&self, at: NaiveTime, task_gen: F) -> u64
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_schedule(move |now| next_daily_run(now, at), task_gen)
    }

    pub fn remove(&self, id: u64) {
        if let Ok(mut tasks) = self.tasks.lock()
            && let Some(handle) = tasks.remove(&id)
        {
            handle.abort();
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shutdown(&self) {
        info!(target: "Scheduler", "正在清理定时任务...");
        if let Ok(mut tasks) = self.tasks.lock() {
            for (_, handle) in tasks.drain() {
                handle.abort();
            }
        }
    }
}

/// 计算 `at` 的下一次出现时间：今天还没到就是今天，否则顺延到明天
pub fn next_daily_run(now: DateTime<Local>, at: NaiveTime) -> Option<DateTime<Local>> {
    let today = now.date_naive();
    if let Some(target) = Local.from_local_datetime(&today.and_time(at)).single()
        && target > now
    {
        return Some(target);
    }

    // 今天已经过了，或者是无效时间（如夏令时跳变），定在明天
    let tomorrow = today.succ_opt()?;
    Local.from_local_datetime(&tomorrow.and_time(at)).single()
}

/// 解析 "HH:MM" 或 "HH:MM:SS"
pub fn parse_daily_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_short_and_long_times() {
        assert_eq!(parse_daily_time("23:00"), NaiveTime::from_hms_opt(23, 0, 0));
        assert_eq!(parse_daily_time(" 07:30:15 "), NaiveTime::from_hms_opt(7, 30, 15));
        assert_eq!(parse_daily_time("25:00"), None);
        assert_eq!(parse_daily_time("soon"), None);
    }

    #[test]
    fn next_run_rolls_to_tomorrow_once_passed() {
        let at = NaiveTime::from_hms_opt(12, 0, 0).unwrap();

        let morning = Local.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let next = next_daily_run(morning, at).unwrap();
        assert_eq!(next.date_naive(), morning.date_naive());
        assert_eq!(next.hour(), 12);

        let evening = Local.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap();
        let next = next_daily_run(evening, at).unwrap();
        assert_eq!(next.date_naive(), evening.date_naive().succ_opt().unwrap());
    }

    #[tokio::test]
    async fn removed_tasks_are_forgotten() {
        let scheduler = Scheduler::new();
        let at = NaiveTime::from_hms_opt(3, 0, 0).unwrap();
        let id = scheduler.add_daily_at(at, || async {});
        assert_eq!(scheduler.len(), 1);

        scheduler.remove(id);
        assert!(scheduler.is_empty());
    }
}
