use serde::Deserialize;

use crate::registry::{Credentials, Dormitory};

/// Body of `POST /api/dormitories`. Every field is optional at the wire
/// level so that missing ones surface as a validation error, not a
/// deserialization failure.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterDormitoryRequest {
    pub id: String,
    pub name: String,
    pub building: String,
    pub room_number: String,
    pub floor: String,
    pub user_name: String,
    pub account: String,
    pub password: String,
}

impl From<RegisterDormitoryRequest> for Dormitory {
    fn from(req: RegisterDormitoryRequest) -> Self {
        Dormitory {
            id: req.id.trim().to_string(),
            name: req.name.trim().to_string(),
            building: req.building,
            room_number: req.room_number,
            floor: req.floor,
            user_name: req.user_name,
            credentials: Credentials {
                account: req.account.trim().to_string(),
                password: req.password,
            },
        }
    }
}

/// Body of `POST /api/scrape`; an empty body means every dormitory.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    #[serde(default)]
    pub dormitory_id: Option<String>,
}

/// `?days=N` on windowed routes.
#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    days: Option<String>,
}

impl WindowQuery {
    /// Requested window, or `default` when absent, non-numeric or zero.
    pub fn days_or(&self, default: u32) -> u32 {
        self.days
            .as_deref()
            .and_then(|d| d.trim().parse::<u32>().ok())
            .filter(|d| *d > 0)
            .unwrap_or(default)
    }
}
