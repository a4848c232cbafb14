//! Derived views over a dormitory's snapshot history.
//!
//! Everything here is a pure function of its inputs; callers load the history
//! from the store first. Sampling is sparse (a handful of readings per day), so
//! none of these assume a fixed cadence.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::Snapshot;
use crate::registry::DormitoryInfo;

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// kWh represented by a balance drop at the given tariff.
fn kwh(balance_drop: f64, tariff: f64) -> f64 {
    if tariff > 0.0 {
        balance_drop / tariff
    } else {
        0.0
    }
}

fn chronological(history: &[Snapshot]) -> Vec<&Snapshot> {
    let mut sorted: Vec<&Snapshot> = history.iter().collect();
    sorted.sort_by_key(|s| s.timestamp);
    sorted
}

/// First snapshot of each calendar date, in date order.
fn first_per_date(history: &[Snapshot]) -> Vec<&Snapshot> {
    let mut days: BTreeMap<NaiveDate, &Snapshot> = BTreeMap::new();
    for snapshot in chronological(history) {
        days.entry(snapshot.date).or_insert(snapshot);
    }
    days.into_values().collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyConsumption {
    pub date: NaiveDate,
    /// kWh, never negative.
    pub consumption: f64,
    /// Balance drop; negative on a top-up day.
    pub cost: f64,
    pub balance: f64,
}

/// Consumption between the first readings of consecutive dates.
///
/// The first date has no predecessor and is left out. A top-up makes the
/// balance rise, which counts as zero consumption but keeps a negative cost.
pub fn daily_consumption(history: &[Snapshot]) -> Vec<DailyConsumption> {
    first_per_date(history)
        .windows(2)
        .map(|pair| {
            let (prev, cur) = (pair[0], pair[1]);
            let drop = prev.balance() - cur.balance();
            DailyConsumption {
                date: cur.date,
                consumption: round1(kwh(drop.max(0.0), prev.tariff())),
                cost: round2(drop),
                balance: cur.balance(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancePoint {
    pub date: NaiveDate,
    pub balance: f64,
}

pub fn balance_history(history: &[Snapshot]) -> Vec<BalancePoint> {
    first_per_date(history)
        .into_iter()
        .map(|s| BalancePoint {
            date: s.date,
            balance: s.balance(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyBucket {
    pub hour: u32,
    pub count: usize,
    pub avg_balance: f64,
    pub avg_consumption: f64,
}

/// Usage by hour of day, pooled across every date in the history.
///
/// The consumption figure is the balance drop between the first and last
/// reading in a bucket, spread over the bucket's sample count. It is not
/// clamped, so a bucket that straddles a top-up can go negative.
pub fn hourly_profile(history: &[Snapshot]) -> Vec<HourlyBucket> {
    let mut buckets: Vec<Vec<&Snapshot>> = vec![Vec::new(); 24];
    for snapshot in chronological(history) {
        if let Some(bucket) = buckets.get_mut(snapshot.hour as usize) {
            bucket.push(snapshot);
        }
    }

    buckets
        .into_iter()
        .enumerate()
        .map(|(hour, samples)| {
            let count = samples.len();
            let avg_balance = if count > 0 {
                round2(samples.iter().map(|s| s.balance()).sum::<f64>() / count as f64)
            } else {
                0.0
            };
            let avg_consumption = match (samples.first(), samples.last()) {
                (Some(first), Some(last)) if count >= 2 => round2(
                    kwh(first.balance() - last.balance(), first.tariff()) / count as f64,
                ),
                _ => 0.0,
            };

            HourlyBucket {
                hour: hour as u32,
                count,
                avg_balance,
                avg_consumption,
            }
        })
        .collect()
}

/// What the comparison needs to know about one dormitory.
#[derive(Debug, Clone)]
pub struct SeriesView {
    pub info: DormitoryInfo,
    pub latest: Snapshot,
    /// Last seven days of readings.
    pub recent: Vec<Snapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonEntry {
    pub rank: usize,
    pub dormitory_id: String,
    pub name: String,
    pub building: String,
    pub room_number: String,
    pub current_balance: f64,
    pub device_price: f64,
    pub consumption7d: f64,
    pub update_time: String,
    pub is_online: bool,
}

/// kWh used over a history window, priced at `tariff`.
pub fn window_consumption(history: &[Snapshot], tariff: f64) -> f64 {
    let sorted = chronological(history);
    match (sorted.first(), sorted.last()) {
        (Some(first), Some(last)) if sorted.len() >= 2 => {
            round1(kwh((first.balance() - last.balance()).max(0.0), tariff))
        }
        _ => 0.0,
    }
}

/// Dormitories ranked by current balance, highest first.
pub fn comparison(views: Vec<SeriesView>) -> Vec<ComparisonEntry> {
    let mut entries: Vec<ComparisonEntry> = views
        .into_iter()
        .map(|view| {
            let device = &view.latest.device_info;
            ComparisonEntry {
                rank: 0,
                consumption7d: window_consumption(&view.recent, device.device_price),
                dormitory_id: view.info.id,
                name: view.info.name,
                building: view.info.building,
                room_number: view.info.room_number,
                current_balance: device.device_balance,
                device_price: device.device_price,
                update_time: device.update_time.clone(),
                is_online: device.is_online,
            }
        })
        .collect();

    entries.sort_by(|a, b| b.current_balance.total_cmp(&a.current_balance));
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i + 1;
    }
    entries
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    pub dormitory_id: String,
    pub current_balance: f64,
    pub total_consumption: f64,
    pub total_cost: f64,
    pub avg_daily_consumption: f64,
    pub avg_daily_cost: f64,
    /// Days until the balance runs out at the average daily cost.
    pub estimated_days: Option<i64>,
    pub rank: Option<usize>,
    pub total_ranked: usize,
    pub daily: Vec<DailyConsumption>,
    pub balance_history: Vec<BalancePoint>,
}

pub fn monthly_summary(
    latest: &Snapshot,
    history: &[Snapshot],
    ranking: &[ComparisonEntry],
) -> MonthlySummary {
    let daily = daily_consumption(history);
    let total_consumption: f64 = daily.iter().map(|d| d.consumption).sum();
    let total_cost: f64 = daily.iter().map(|d| d.cost).sum();

    let (avg_daily_consumption, avg_daily_cost) = if daily.is_empty() {
        (0.0, 0.0)
    } else {
        let days = daily.len() as f64;
        (total_consumption / days, total_cost / days)
    };

    let estimated_days = if avg_daily_cost > 0.0 {
        Some((latest.balance() / avg_daily_cost).floor() as i64)
    } else {
        None
    };

    MonthlySummary {
        dormitory_id: latest.dormitory_id.clone(),
        current_balance: latest.balance(),
        total_consumption: round1(total_consumption),
        total_cost: round2(total_cost),
        avg_daily_consumption: round2(avg_daily_consumption),
        avg_daily_cost: round2(avg_daily_cost),
        estimated_days,
        rank: ranking
            .iter()
            .find(|e| e.dormitory_id == latest.dormitory_id)
            .map(|e| e.rank),
        total_ranked: ranking.len(),
        balance_history: balance_history(history),
        daily,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetStats {
    pub total_dormitories: usize,
    pub online_count: usize,
    pub total_balance: f64,
    pub avg_balance: f64,
    pub low_balance_count: usize,
    pub last_update: Option<DateTime<Utc>>,
}

/// Fleet-wide figures over each dormitory's latest snapshot.
///
/// The average is taken over all registered dormitories, including those that
/// have never been collected.
pub fn fleet_stats(registered: usize, latest: &[Snapshot], low_balance_threshold: f64) -> FleetStats {
    let total_balance: f64 = latest.iter().map(|s| s.balance()).sum();

    FleetStats {
        total_dormitories: registered,
        online_count: latest.iter().filter(|s| s.device_info.is_online).count(),
        total_balance: round2(total_balance),
        avg_balance: if registered > 0 {
            round2(total_balance / registered as f64)
        } else {
            0.0
        },
        low_balance_count: latest
            .iter()
            .filter(|s| s.balance() < low_balance_threshold)
            .count(),
        last_update: latest.iter().map(|s| s.timestamp).max(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_snapshot;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    // 08:00 Shanghai
    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn series(id: &str, balances: &[f64]) -> Vec<Snapshot> {
        balances
            .iter()
            .enumerate()
            .map(|(i, b)| test_snapshot(id, day(i as i64), *b))
            .collect()
    }

    fn view(id: &str, balance: f64) -> SeriesView {
        SeriesView {
            info: DormitoryInfo::from(&crate::registry::test_dormitory(id)),
            latest: test_snapshot(id, day(0), balance),
            recent: Vec::new(),
        }
    }

    #[test]
    fn test_daily_consumption_basic() {
        let daily = daily_consumption(&series("a", &[100.0, 95.0, 92.5]));

        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(daily[0].consumption, 10.0);
        assert_eq!(daily[0].cost, 5.0);
        assert_eq!(daily[1].consumption, 5.0);
        assert_eq!(daily[1].balance, 92.5);
    }

    #[test]
    fn test_daily_consumption_clamps_top_up() {
        let daily = daily_consumption(&series("a", &[100.0, 130.0]));

        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].consumption, 0.0);
        assert_eq!(daily[0].cost, -30.0);
    }

    #[test]
    fn test_daily_consumption_uses_first_reading_per_date() {
        let mut history = series("a", &[100.0, 90.0]);
        // Later the same day as the second reading; ignored
        history.push(test_snapshot("a", day(1) + Duration::hours(6), 10.0));
        // Out of order input
        history.reverse();

        let daily = daily_consumption(&history);
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].cost, 10.0);
    }

    #[test]
    fn test_zero_tariff_yields_zero_consumption() {
        let mut history = series("a", &[100.0, 90.0]);
        history[0].device_info.device_price = 0.0;

        let daily = daily_consumption(&history);
        assert_eq!(daily[0].consumption, 0.0);
        assert_eq!(daily[0].cost, 10.0);
    }

    #[test]
    fn test_hourly_single_sample_has_zero_consumption() {
        let profile = hourly_profile(&series("a", &[50.0]));

        assert_eq!(profile.len(), 24);
        let bucket = &profile[8];
        assert_eq!(bucket.count, 1);
        assert_eq!(bucket.avg_balance, 50.0);
        assert_eq!(bucket.avg_consumption, 0.0);
        assert!(profile.iter().filter(|b| b.hour != 8).all(|b| b.count == 0));
    }

    #[test]
    fn test_hourly_pools_across_dates() {
        // Three 08:00 readings, 5.0 apart at 0.5 per kWh
        let profile = hourly_profile(&series("a", &[100.0, 95.0, 90.0]));
        let bucket = &profile[8];

        assert_eq!(bucket.count, 3);
        assert_eq!(bucket.avg_balance, 95.0);
        // (100 - 90) / 0.5 / 3
        assert_eq!(bucket.avg_consumption, 6.67);
    }

    #[test]
    fn test_hourly_is_not_clamped() {
        let profile = hourly_profile(&series("a", &[50.0, 100.0]));
        assert_eq!(profile[8].avg_consumption, -50.0);
    }

    #[test]
    fn test_comparison_ranks_by_balance() {
        let ranked = comparison(vec![view("a", 80.0), view("b", 20.0), view("c", 50.0)]);

        let order: Vec<f64> = ranked.iter().map(|e| e.current_balance).collect();
        assert_eq!(order, vec![80.0, 50.0, 20.0]);

        let fifty = ranked.iter().find(|e| e.current_balance == 50.0).unwrap();
        assert_eq!(fifty.rank, 2);
        assert_eq!(fifty.dormitory_id, "c");
    }

    #[test]
    fn test_window_consumption() {
        assert_eq!(window_consumption(&series("a", &[60.0]), 0.5), 0.0);
        assert_eq!(window_consumption(&series("a", &[60.0, 55.0, 50.05]), 0.5), 19.9);
        // Net top-up over the window
        assert_eq!(window_consumption(&series("a", &[10.0, 60.0]), 0.5), 0.0);
    }

    #[test]
    fn test_monthly_summary() {
        let history = series("a", &[100.0, 90.0, 80.0, 70.0]);
        let latest = history.last().unwrap().clone();
        let ranking = comparison(vec![view("b", 99.0), view("a", 70.0)]);

        let summary = monthly_summary(&latest, &history, &ranking);

        assert_eq!(summary.total_consumption, 60.0);
        assert_eq!(summary.total_cost, 30.0);
        assert_eq!(summary.avg_daily_consumption, 20.0);
        assert_eq!(summary.avg_daily_cost, 10.0);
        assert_eq!(summary.estimated_days, Some(7));
        assert_eq!(summary.rank, Some(2));
        assert_eq!(summary.total_ranked, 2);
        assert_eq!(summary.balance_history.len(), 4);
        assert_eq!(summary.daily.len(), 3);
    }

    #[test]
    fn test_monthly_summary_without_spend_has_no_estimate() {
        let history = series("a", &[50.0]);
        let summary = monthly_summary(&history[0], &history, &[]);

        assert_eq!(summary.estimated_days, None);
        assert_eq!(summary.rank, None);
        assert_eq!(summary.avg_daily_cost, 0.0);
    }

    #[test]
    fn test_fleet_stats() {
        let mut offline = test_snapshot("b", day(2), 15.5);
        offline.device_info.is_online = false;
        let latest = vec![test_snapshot("a", day(1), 84.5), offline];

        // Three registered, one never collected
        let stats = fleet_stats(3, &latest, 20.0);

        assert_eq!(stats.total_dormitories, 3);
        assert_eq!(stats.online_count, 1);
        assert_eq!(stats.total_balance, 100.0);
        assert_eq!(stats.avg_balance, 33.33);
        assert_eq!(stats.low_balance_count, 1);
        assert_eq!(stats.last_update, Some(day(2)));
    }

    #[test]
    fn test_fleet_stats_empty() {
        let stats = fleet_stats(0, &[], 20.0);
        assert_eq!(stats.avg_balance, 0.0);
        assert_eq!(stats.last_update, None);
    }
}
