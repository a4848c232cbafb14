//! Periodic collection at fixed local times of day.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

use crate::collector::Collector;
use crate::config::CollectorConfig;
use crate::error::Result;

/// Fixed wall-clock trigger times in one timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySchedule {
    tz: Tz,
    times: Vec<NaiveTime>,
}

impl DailySchedule {
    pub fn new(tz: Tz, mut times: Vec<NaiveTime>) -> Self {
        times.sort();
        times.dedup();
        Self { tz, times }
    }

    pub fn from_config(config: &CollectorConfig) -> Result<Self> {
        Ok(Self::new(config.tz()?, config.times_of_day()?))
    }

    /// First trigger instant strictly after `now`.
    ///
    /// A local time that falls into a DST gap is skipped for that day; an
    /// ambiguous one fires at its earlier occurrence.
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.with_timezone(&self.tz).date_naive();

        (0..=2)
            .map(|offset| today + Duration::days(offset))
            .flat_map(|date| self.times.iter().map(move |t| date.and_time(*t)))
            .filter_map(|local| self.tz.from_local_datetime(&local).earliest())
            .map(|fire| fire.with_timezone(&Utc))
            .find(|fire| *fire > now)
    }
}

/// Background task that runs a full collection at each scheduled time.
pub struct Scheduler {
    schedule: DailySchedule,
    collector: Arc<Collector>,
}

impl Scheduler {
    pub fn new(schedule: DailySchedule, collector: Arc<Collector>) -> Self {
        Self { schedule, collector }
    }

    pub async fn run(&self) {
        tracing::info!(
            timezone = %self.schedule.tz,
            times = ?self.schedule.times,
            "collection scheduler started"
        );

        loop {
            let now = Utc::now();
            let Some(next) = self.schedule.next_fire_after(now) else {
                tracing::warn!("schedule has no upcoming trigger, scheduler stopping");
                return;
            };

            tracing::debug!(next = %next, "waiting for next scheduled collection");
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            let summary = self.collector.run_all().await;
            if summary.failed() > 0 {
                tracing::warn!(
                    failed = summary.failed(),
                    total = summary.results.len(),
                    "scheduled collection finished with failures"
                );
            }
        }
    }
}
