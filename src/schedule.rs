//! Periodic trigger for `Orchestrator::run_all`.

use crate::config::ScheduleConfig;
use crate::pipeline::Orchestrator;
use chrono::{Local, Timelike};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    /// `[start, end)` local hours. A window with `start > end` wraps past midnight.
    pub active_hours: Option<(u32, u32)>,
}

impl Schedule {
    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_minutes.max(1) * 60),
            active_hours: config.active_hours,
        }
    }

    pub fn is_active_at(&self, hour: u32) -> bool {
        match self.active_hours {
            None => true,
            Some((start, end)) if start == end => true,
            Some((start, end)) if start < end => (start..end).contains(&hour),
            Some((start, end)) => hour >= start || hour < end,
        }
    }
}

/// Runs every configured facility once per tick until `shutdown` resolves.
///
/// `plan` is consulted before each tick so configuration changes are picked up
/// without a restart; if it fails, the previous plan is kept. Returns the
/// number of ticks that actually crawled.
pub async fn run_periodically<P, E, S>(
    mut plan: P,
    initial: (Schedule, Arc<Orchestrator>),
    shutdown: S,
) -> usize
where
    P: FnMut() -> Result<(Schedule, Arc<Orchestrator>), E>,
    E: Display,
    S: Future<Output = ()>,
{
    let (mut schedule, mut orchestrator) = initial;
    let mut crawled_ticks = 0;
    tokio::pin!(shutdown);

    loop {
        let hour = Local::now().hour();
        if schedule.is_active_at(hour) {
            info!("⏰ Crawling {} facilities", orchestrator.facilities().count());
            for outcome in Arc::clone(&orchestrator).run_all().await {
                match &outcome.reason {
                    None => info!("{}: {}", outcome.facility, outcome.message),
                    Some(reason) => warn!("{}: {}", outcome.facility, reason),
                }
            }
            crawled_ticks += 1;
        } else {
            info!("Outside active hours ({}h), skipping this tick", hour);
        }

        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping scheduler");
                break;
            }
            _ = tokio::time::sleep(schedule.interval) => {}
        }

        match plan() {
            Ok(next) => (schedule, orchestrator) = next,
            Err(e) => warn!("Keeping previous configuration: {}", e),
        }
    }

    crawled_ticks
}
