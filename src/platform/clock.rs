/// Clock & Scheduler
///
/// Cooperative tick-driven scheduling shared by every orchestrator, plus
/// named maintenance windows entered/exited at fixed daily wall-clock times.
use chrono::{Local, NaiveTime};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Duration;

/// A cooperative cancellation flag. Orchestrator loops check this between
/// steps rather than being forcibly aborted, so in-flight I/O drains on its
/// own timeout instead of being cut off mid-write.
#[derive(Clone, Default)]
pub struct RunningFlag(Arc<AtomicBool>);

impl RunningFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// A named daily maintenance window, e.g. 02:00 for 30 minutes.
#[derive(Debug, Clone, Copy)]
pub struct MaintenanceWindow {
    pub hour: u32,
    pub minute: u32,
    pub duration: Duration,
}

impl MaintenanceWindow {
    pub fn new(hour: u32, minute: u32, duration: Duration) -> Self {
        Self {
            hour,
            minute,
            duration,
        }
    }

    /// Whether `now` (local time) falls inside this window's daily occurrence.
    pub fn contains(&self, now: chrono::DateTime<Local>) -> bool {
        let start = match NaiveTime::from_hms_opt(self.hour, self.minute, 0) {
            Some(t) => t,
            None => return false,
        };
        let today_start = now.date_naive().and_time(start);
        let elapsed = now.naive_local().signed_duration_since(today_start);
        elapsed >= chrono::Duration::zero()
            && elapsed < chrono::Duration::from_std(self.duration).unwrap_or_default()
    }
}

/// Evaluates a set of maintenance windows against the current time.
#[derive(Debug, Clone)]
pub struct MaintenanceSchedule {
    windows: Vec<MaintenanceWindow>,
}

impl MaintenanceSchedule {
    pub fn new(windows: Vec<MaintenanceWindow>) -> Self {
        Self { windows }
    }

    /// Default windows per the established operational baseline: 02:00 and
    /// 14:00 local, 30 minutes each.
    pub fn default_windows() -> Self {
        Self::new(vec![
            MaintenanceWindow::new(2, 0, Duration::from_secs(30 * 60)),
            MaintenanceWindow::new(14, 0, Duration::from_secs(30 * 60)),
        ])
    }

    pub fn in_window_now(&self) -> bool {
        let now = Local::now();
        self.windows.iter().any(|w| w.contains(now))
    }
}

/// Returns the number of seconds until the next occurrence of the given
/// local hour:minute (today if still ahead, otherwise tomorrow).
pub fn seconds_until_next(hour: u32, minute: u32) -> i64 {
    let now = Local::now();
    let mut target = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .expect("valid hour/minute");
    if target <= now.naive_local() {
        target += chrono::Duration::days(1);
    }
    target.signed_duration_since(now.naive_local()).num_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_flag_starts_true_and_stops() {
        let flag = RunningFlag::new();
        assert!(flag.is_running());
        flag.stop();
        assert!(!flag.is_running());
    }

    #[test]
    fn default_windows_has_two_entries() {
        let schedule = MaintenanceSchedule::default_windows();
        assert_eq!(schedule.windows.len(), 2);
    }

    #[test]
    fn window_contains_only_within_duration() {
        let window = MaintenanceWindow::new(2, 0, Duration::from_secs(1800));
        let inside = Local::now()
            .date_naive()
            .and_hms_opt(2, 10, 0)
            .unwrap()
            .and_local_timezone(Local)
            .unwrap();
        let outside = Local::now()
            .date_naive()
            .and_hms_opt(3, 0, 0)
            .unwrap()
            .and_local_timezone(Local)
            .unwrap();
        assert!(window.contains(inside));
        assert!(!window.contains(outside));
    }

    #[test]
    fn seconds_until_next_is_nonnegative() {
        assert!(seconds_until_next(2, 0) >= 0);
    }
}
