//! Process-wide registry of monitored dormitories.
//!
//! The registry is seeded from configuration and shared by `Arc` between the
//! collector and the API handlers. All mutation goes through [`DormitoryRegistry::add`]
//! and [`DormitoryRegistry::rotate_credentials`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{AppError, Result};

/// Portal login for one dormitory.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub account: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dormitory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub building: String,
    #[serde(default, alias = "room_number")]
    pub room_number: String,
    #[serde(default)]
    pub floor: String,
    /// Owner name shown when the portal does not report one.
    #[serde(default, alias = "user_name")]
    pub user_name: String,
    #[serde(flatten)]
    pub credentials: Credentials,
}

/// Public view of a dormitory, without credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DormitoryInfo {
    pub id: String,
    pub name: String,
    pub building: String,
    pub room_number: String,
    pub floor: String,
    pub user_name: String,
}

impl From<&Dormitory> for DormitoryInfo {
    fn from(d: &Dormitory) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone(),
            building: d.building.clone(),
            room_number: d.room_number.clone(),
            floor: d.floor.clone(),
            user_name: d.user_name.clone(),
        }
    }
}

/// Identifiers key on-disk paths, so they are restricted to a safe alphabet.
pub fn validate_dormitory_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(AppError::Validation("dormitory id cannot be empty".to_string()));
    }
    if id.len() > 64 {
        return Err(AppError::Validation(format!(
            "dormitory id '{}' is longer than 64 characters",
            id
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::Validation(format!(
            "dormitory id '{}' may only contain letters, digits, '-' and '_'",
            id
        )));
    }
    Ok(())
}

fn validate_credentials(credentials: &Credentials) -> Result<()> {
    if credentials.account.trim().is_empty() || credentials.password.is_empty() {
        return Err(AppError::Validation(
            "account and password are required".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_dormitory(dormitory: &Dormitory) -> Result<()> {
    validate_dormitory_id(&dormitory.id)?;
    if dormitory.name.trim().is_empty() {
        return Err(AppError::Validation("dormitory name is required".to_string()));
    }
    validate_credentials(&dormitory.credentials)
}

#[derive(Debug, Default)]
pub struct DormitoryRegistry {
    dormitories: RwLock<Vec<Dormitory>>,
}

impl DormitoryRegistry {
    pub fn new(dormitories: Vec<Dormitory>) -> Self {
        Self {
            dormitories: RwLock::new(dormitories),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Dormitory>> {
        self.dormitories.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Dormitory>> {
        self.dormitories.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of all registered dormitories in registration order.
    pub fn list(&self) -> Vec<Dormitory> {
        self.read().clone()
    }

    pub fn infos(&self) -> Vec<DormitoryInfo> {
        self.read().iter().map(DormitoryInfo::from).collect()
    }

    pub fn get(&self, id: &str) -> Option<Dormitory> {
        self.read().iter().find(|d| d.id == id).cloned()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.read().len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Register a new dormitory. Fails if the input is malformed or the id is taken.
    pub fn add(&self, dormitory: Dormitory) -> Result<()> {
        validate_dormitory(&dormitory)?;

        let mut dormitories = self.write();
        if dormitories.iter().any(|d| d.id == dormitory.id) {
            return Err(AppError::Validation(format!(
                "dormitory '{}' already exists",
                dormitory.id
            )));
        }

        tracing::info!(dormitory_id = %dormitory.id, name = %dormitory.name, "dormitory registered");
        dormitories.push(dormitory);
        Ok(())
    }

    /// Replace the portal credentials of an existing dormitory.
    pub fn rotate_credentials(&self, id: &str, credentials: Credentials) -> Result<()> {
        validate_credentials(&credentials)?;

        let mut dormitories = self.write();
        let dormitory = dormitories
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Dormitory {} not found", id)))?;

        dormitory.credentials = credentials;
        tracing::info!(dormitory_id = %id, "dormitory credentials rotated");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_dormitory(id: &str) -> Dormitory {
    Dormitory {
        id: id.to_string(),
        name: format!("Room {}", id),
        building: "13栋".to_string(),
        room_number: id.to_string(),
        floor: "5楼".to_string(),
        user_name: "测试用户".to_string(),
        credentials: Credentials {
            account: format!("acct-{}", id),
            password: "secret".to_string(),
        },
    }
}
