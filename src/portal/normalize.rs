//! Turns the portal's user-info and bound-device payloads into a [`Snapshot`].
//!
//! Precedence rules:
//! - serial number: `DeviceNo`, else the legacy `DevcieNo`, else empty.
//! - online: `IsOnline == 1`, everything else is offline.
//! - capture date/time/hour: the fetch instant in the collector timezone.
//!   `UpdateTime` is carried along verbatim as `device_info.update_time`.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::upstream::{BindDevicesData, Envelope, RawDevice, UserInfoData, ONLINE};
use crate::error::{AppError, Result};
use crate::models::{CaptureLabels, DeviceInfo, OwnerInfo, RoomInfo, Snapshot};
use crate::registry::Dormitory;

pub fn canonical_device_no(device: &RawDevice) -> String {
    device
        .device_no
        .as_ref()
        .or(device.legacy_device_no.as_ref())
        .cloned()
        .unwrap_or_default()
}

/// "13800138000" -> "138****8000". Values that already contain a mask are kept.
pub fn mask_mobile(mobile: &str) -> String {
    let mobile = mobile.trim();
    if mobile.is_empty() || mobile.contains('*') {
        return mobile.to_string();
    }

    let chars: Vec<char> = mobile.chars().collect();
    if chars.len() < 7 {
        return "****".to_string();
    }

    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn normalize(
    dormitory: &Dormitory,
    user: Option<UserInfoData>,
    devices: Envelope<BindDevicesData>,
    captured_at: DateTime<Utc>,
    tz: Tz,
) -> Result<Snapshot> {
    if !devices.is_ok() {
        return Err(AppError::Fetch(format!(
            "device list rejected (tag {:?}): {}",
            devices.tag,
            devices.message.as_deref().unwrap_or("no message")
        )));
    }

    let data = devices
        .data
        .ok_or_else(|| AppError::Fetch("device list response carries no data".to_string()))?;

    let device = data
        .devices
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Fetch("no device bound to this account".to_string()))?;

    let balance = device
        .balance
        .ok_or_else(|| AppError::Fetch("device reports no balance".to_string()))?;
    let price = device
        .price
        .ok_or_else(|| AppError::Fetch("device reports no tariff".to_string()))?;

    let user = user.unwrap_or_default();
    let labels = CaptureLabels::new(captured_at, tz);
    let device_no = canonical_device_no(&device);
    let room_id = device.room_id.unwrap_or_default();

    Ok(Snapshot {
        dormitory_id: dormitory.id.clone(),
        timestamp: captured_at,
        date: labels.date,
        time: labels.time,
        hour: labels.hour,
        user_info: OwnerInfo {
            real_name: user
                .real_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| dormitory.user_name.clone()),
            mobile: mask_mobile(user.mobile.as_deref().unwrap_or_default()),
            gender: user.gender.unwrap_or_default(),
        },
        room_info: RoomInfo {
            room_name: data.room_name.unwrap_or_default(),
            room_id: room_id.clone(),
            building: dormitory.building.clone(),
            floor: dormitory.floor.clone(),
            room_number: dormitory.room_number.clone(),
        },
        device_info: DeviceInfo {
            device_name: device.device_name.unwrap_or_default(),
            device_type: device.device_type.unwrap_or_default(),
            device_no,
            device_balance: round_cents(balance),
            update_time: device.update_time.unwrap_or_default(),
            is_online: device.is_online == Some(ONLINE),
            device_price: price,
            room_id,
            room_info: device.room_info.unwrap_or_default(),
        },
    })
}
