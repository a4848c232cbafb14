//! Wire shapes of the metering portal's JSON responses.
//!
//! The portal is loose about types: ids arrive as strings or numbers, numeric
//! readings occasionally as strings. Every field is optional here and the
//! normalizer decides what is required.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Success tag the portal puts in `Tag` for both login and data calls.
pub const TAG_OK: i64 = 1;

/// `IsOnline` value of a connected meter.
pub const ONLINE: i64 = 1;

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "Tag", default, deserialize_with = "lenient_i64")]
    pub tag: Option<i64>,
    #[serde(rename = "Message", default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
    #[serde(rename = "Data", default)]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn is_ok(&self) -> bool {
        self.tag == Some(TAG_OK)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UserInfoData {
    #[serde(rename = "RealName", default, deserialize_with = "lenient_string")]
    pub real_name: Option<String>,
    #[serde(rename = "Mobile", default, deserialize_with = "lenient_string")]
    pub mobile: Option<String>,
    #[serde(rename = "GenderStr", default, deserialize_with = "lenient_string")]
    pub gender: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BindDevicesData {
    #[serde(rename = "RoomName", default, deserialize_with = "lenient_string")]
    pub room_name: Option<String>,
    #[serde(rename = "DevicesList", default)]
    pub devices: Option<Vec<RawDevice>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawDevice {
    #[serde(rename = "RoomId", default, deserialize_with = "lenient_string")]
    pub room_id: Option<String>,
    #[serde(rename = "DeviceName", default, deserialize_with = "lenient_string")]
    pub device_name: Option<String>,
    #[serde(rename = "DeviceTypeName", default, deserialize_with = "lenient_string")]
    pub device_type: Option<String>,
    #[serde(rename = "DeviceNo", default, deserialize_with = "lenient_string")]
    pub device_no: Option<String>,
    /// Misspelled serial number field still shipped by older portal builds.
    #[serde(rename = "DevcieNo", default, deserialize_with = "lenient_string")]
    pub legacy_device_no: Option<String>,
    #[serde(rename = "DeviceBalance", default, deserialize_with = "lenient_f64")]
    pub balance: Option<f64>,
    #[serde(rename = "UpdateTime", default, deserialize_with = "lenient_string")]
    pub update_time: Option<String>,
    /// Only a JSON number is meaningful here; `true` or `"1"` stay unknown.
    #[serde(rename = "IsOnline", default, deserialize_with = "strict_i64")]
    pub is_online: Option<i64>,
    #[serde(rename = "DevicePrice", default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(rename = "RoomInfo", default, deserialize_with = "lenient_string")]
    pub room_info: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginReply {
    #[serde(rename = "Tag", default, deserialize_with = "lenient_i64")]
    pub tag: Option<i64>,
    #[serde(rename = "Message", default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(Value::Bool(b)) => Some(i64::from(b)),
        _ => None,
    })
}

fn strict_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    })
}
