//! Client for the campus metering portal.

pub mod normalize;
pub mod session;
pub mod upstream;

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;

use crate::config::PortalConfig;
use crate::error::{AppError, Result};
use crate::models::Snapshot;
use crate::registry::{Credentials, Dormitory};

pub use normalize::{canonical_device_no, mask_mobile, normalize};
pub use session::Session;
use upstream::{BindDevicesData, Envelope, UserInfoData};

const USER_INFO: &str = "/Home/GetUserInfo";
const BIND_DEVICES: &str = "/Home/GetUserBindDevices";

/// Produces one fresh snapshot for a dormitory.
///
/// The collector only depends on this seam, so tests can substitute a scripted
/// source for the real portal.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn collect(&self, dormitory: &Dormitory) -> Result<Snapshot>;
}

#[derive(Debug, Clone)]
pub struct PortalClient {
    config: PortalConfig,
    tz: Tz,
}

impl PortalClient {
    pub fn new(config: PortalConfig, tz: Tz) -> Self {
        Self { config, tz }
    }

    pub async fn establish_session(&self, credentials: &Credentials) -> Result<Session> {
        Session::establish(&self.config, credentials).await
    }

    /// Read user info and the bound device list, then normalize.
    pub async fn fetch_snapshot(&self, session: &Session, dormitory: &Dormitory) -> Result<Snapshot> {
        let user_body = session.post(USER_INFO).await?;
        let user = match serde_json::from_str::<Envelope<UserInfoData>>(&user_body) {
            Ok(env) => env.data,
            Err(e) => {
                tracing::warn!(
                    dormitory_id = %dormitory.id,
                    error = %e,
                    "unreadable user info, falling back to registry owner"
                );
                None
            }
        };

        let devices_body = session.post(BIND_DEVICES).await?;
        let devices: Envelope<BindDevicesData> = serde_json::from_str(&devices_body)
            .map_err(|e| AppError::Fetch(format!("malformed device list: {}", e)))?;

        normalize(dormitory, user, devices, Utc::now(), self.tz)
    }
}

#[async_trait]
impl SnapshotSource for PortalClient {
    async fn collect(&self, dormitory: &Dormitory) -> Result<Snapshot> {
        let session = self.establish_session(&dormitory.credentials).await?;
        self.fetch_snapshot(&session, dormitory).await
    }
}
