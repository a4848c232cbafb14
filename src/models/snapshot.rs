use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// One point-in-time reading of a dormitory's meter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub dormitory_id: String,
    /// Instant the fetch happened.
    pub timestamp: DateTime<Utc>,
    /// Calendar date of `timestamp` in the collector timezone.
    pub date: NaiveDate,
    /// "HH:MM" of `timestamp` in the collector timezone.
    pub time: String,
    pub hour: u32,
    pub user_info: OwnerInfo,
    pub room_info: RoomInfo,
    pub device_info: DeviceInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerInfo {
    pub real_name: String,
    /// Always masked, e.g. "138****8000".
    pub mobile: String,
    pub gender: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub room_name: String,
    pub room_id: String,
    pub building: String,
    pub floor: String,
    pub room_number: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_name: String,
    pub device_type: String,
    pub device_no: String,
    pub device_balance: f64,
    /// Portal-reported refresh time, informational only.
    pub update_time: String,
    pub is_online: bool,
    /// Tariff in currency per kWh.
    pub device_price: f64,
    pub room_id: String,
    pub room_info: String,
}

/// Date, minute and hour labels of a capture instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureLabels {
    pub date: NaiveDate,
    pub time: String,
    pub hour: u32,
}

impl CaptureLabels {
    pub fn new(instant: DateTime<Utc>, tz: Tz) -> Self {
        let local = instant.with_timezone(&tz);
        Self {
            date: local.date_naive(),
            time: local.format("%H:%M").to_string(),
            hour: local.hour(),
        }
    }
}

impl Snapshot {
    pub fn balance(&self) -> f64 {
        self.device_info.device_balance
    }

    pub fn tariff(&self) -> f64 {
        self.device_info.device_price
    }

    /// Key under which a dormitory's series de-duplicates readings.
    pub fn capture_key(&self) -> (NaiveDate, &str) {
        (self.date, self.time.as_str())
    }
}

#[cfg(test)]
pub(crate) fn test_snapshot(dormitory_id: &str, at: DateTime<Utc>, balance: f64) -> Snapshot {
    let labels = CaptureLabels::new(at, chrono_tz::Asia::Shanghai);
    Snapshot {
        dormitory_id: dormitory_id.to_string(),
        timestamp: at,
        date: labels.date,
        time: labels.time,
        hour: labels.hour,
        user_info: OwnerInfo::default(),
        room_info: RoomInfo::default(),
        device_info: DeviceInfo {
            device_balance: balance,
            device_price: 0.5,
            is_online: true,
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_capture_labels_follow_timezone() {
        // 22:30 UTC is 06:30 the next day in Shanghai
        let at = Utc.with_ymd_and_hms(2026, 2, 3, 22, 30, 59).unwrap();
        let labels = CaptureLabels::new(at, chrono_tz::Asia::Shanghai);

        assert_eq!(labels.date, NaiveDate::from_ymd_opt(2026, 2, 4).unwrap());
        assert_eq!(labels.time, "06:30");
        assert_eq!(labels.hour, 6);
    }

    #[test]
    fn test_serialized_shape() {
        let at = Utc.with_ymd_and_hms(2026, 2, 4, 4, 3, 0).unwrap();
        let snapshot = test_snapshot("13-513", at, 96.28);
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["dormitoryId"], "13-513");
        assert_eq!(json["date"], "2026-02-04");
        assert_eq!(json["time"], "12:03");
        assert_eq!(json["hour"], 12);
        assert_eq!(json["deviceInfo"]["deviceBalance"], 96.28);
        assert_eq!(json["deviceInfo"]["isOnline"], true);
    }
}
