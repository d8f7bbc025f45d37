//! Daily retention sweep over the pipeline directories.

pub mod sweep;

pub use sweep::{RetentionSweep, Sweep, SweepReport};

use crate::config::{CleanupConfig, ManagedDirs};
use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Source of wall-clock time for scheduling.
pub trait Clock: Send + Sync + 'static {
    type Tz: TimeZone;

    fn now(&self) -> DateTime<Self::Tz>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Tz = Local;

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupSchedule {
    pub hour: u32,
    pub minute: u32,
    pub run_on_startup: bool,
    pub error_backoff: Duration,
}

impl From<&CleanupConfig> for CleanupSchedule {
    fn from(config: &CleanupConfig) -> Self {
        Self {
            hour: config.execute_at_hour,
            minute: config.execute_at_minute,
            run_on_startup: config.run_on_startup,
            error_backoff: Duration::from_secs(config.error_backoff_secs),
        }
    }
}

/// The first `hour:minute` strictly after `now`: today if still ahead, otherwise tomorrow.
/// A local time skipped by a DST jump resolves one hour later.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32, minute: u32) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();

    for days_ahead in 0..=2 {
        let Some(date) = today.checked_add_days(chrono::Days::new(days_ahead)) else {
            break;
        };
        let Some(at) = date.and_hms_opt(hour, minute, 0) else {
            break;
        };
        if let Some(candidate) = resolve_local(&tz, at) {
            if candidate > *now {
                return candidate;
            }
        }
    }

    now.clone() + TimeDelta::days(1)
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, at: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&at)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(at + TimeDelta::hours(1))).earliest())
}

pub struct CleanupScheduler<C: Clock = SystemClock> {
    schedule: CleanupSchedule,
    sweep: Arc<dyn Sweep>,
    clock: C,
}

impl CleanupScheduler<SystemClock> {
    pub fn new(config: &CleanupConfig, dirs: &ManagedDirs) -> Self {
        let targets = dirs.all().iter().map(|d| d.to_path_buf()).collect();
        Self::with_parts(
            CleanupSchedule::from(config),
            Arc::new(RetentionSweep::new(targets, config.retention_days)),
            SystemClock,
        )
    }
}

impl<C: Clock> CleanupScheduler<C> {
    pub fn with_parts(schedule: CleanupSchedule, sweep: Arc<dyn Sweep>, clock: C) -> Self {
        Self {
            schedule,
            sweep,
            clock,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Sweeps once a day at the configured time until `cancel` fires.
    /// A failed iteration waits out the backoff and then reschedules.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Cleanup scheduler started (daily at {:02}:{:02})",
            self.schedule.hour, self.schedule.minute
        );

        if self.schedule.run_on_startup && !self.sweep_once(&cancel).await {
            sleep_or_cancel(self.schedule.error_backoff, &cancel).await;
        }

        while !cancel.is_cancelled() {
            let delay = self.next_delay();
            if !sleep_or_cancel(delay, &cancel).await {
                break;
            }
            if !self.sweep_once(&cancel).await
                && !sleep_or_cancel(self.schedule.error_backoff, &cancel).await
            {
                break;
            }
        }

        info!("Cleanup scheduler stopped");
    }

    fn next_delay(&self) -> Duration {
        let now = self.clock.now();
        let next = next_run_after(&now, self.schedule.hour, self.schedule.minute);
        let delay = next
            .clone()
            .signed_duration_since(&now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        debug!(
            "Next cleanup at {} (in {}s)",
            next.naive_local(),
            delay.as_secs()
        );
        delay
    }

    /// Returns false when the sweep failed.
    async fn sweep_once(&self, cancel: &CancellationToken) -> bool {
        match self.sweep.sweep(cancel).await {
            Ok(report) => {
                if report.failures > 0 {
                    warn!("Cleanup left {} entries it could not remove", report.failures);
                }
                true
            }
            Err(e) => {
                error!("Cleanup sweep failed: {:#}", e);
                false
            }
        }
    }
}

/// True when the full duration elapsed, false when cancelled first.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
