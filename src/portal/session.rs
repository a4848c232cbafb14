use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};

use super::upstream::{LoginReply, TAG_OK};
use crate::config::PortalConfig;
use crate::error::{AppError, Result};
use crate::registry::Credentials;

const LOGIN_PAGE: &str = "/Login/Login";
const LOGIN_JSON: &str = "/Login/LoginJson";

/// Cookie-bearing handle on an authenticated portal session.
///
/// Every call made through the same `Session` shares one cookie jar. Expiry is
/// not tracked; a rejected call surfaces as [`AppError::Auth`].
#[derive(Clone)]
pub struct Session {
    client: Client,
    base_url: String,
}

fn portal_headers(base_url: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
    );
    headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

    let origin = HeaderValue::from_str(base_url)
        .map_err(|e| AppError::Config(format!("invalid portal base url: {}", e)))?;
    let referer = HeaderValue::from_str(&format!("{}{}", base_url, LOGIN_PAGE))
        .map_err(|e| AppError::Config(format!("invalid portal base url: {}", e)))?;
    headers.insert(header::ORIGIN, origin);
    headers.insert(header::REFERER, referer);

    Ok(headers)
}

impl Session {
    /// Two-step login: fetch the login page for its cookies, then post the
    /// credentials form on the same jar. Success is the body's `Tag == 1`.
    pub async fn establish(config: &PortalConfig, credentials: &Credentials) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .default_headers(portal_headers(&base_url)?)
            .build()?;

        let session = Self { client, base_url };

        session
            .client
            .get(session.url(LOGIN_PAGE))
            .send()
            .await
            .map_err(AppError::from_auth_transport)?;

        let body = session
            .client
            .post(session.url(LOGIN_JSON))
            .form(&[
                ("account", credentials.account.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(AppError::from_auth_transport)?
            .text()
            .await
            .map_err(AppError::from_auth_transport)?;

        let reply: LoginReply = serde_json::from_str(&body)
            .map_err(|_| AppError::Auth("login response is not the expected JSON".to_string()))?;

        if reply.tag != Some(TAG_OK) {
            return Err(AppError::Auth(
                reply
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("portal rejected login (tag {:?})", reply.tag)),
            ));
        }

        tracing::debug!(account = %credentials.account, "portal session established");
        Ok(session)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST an authenticated call and return the raw body.
    ///
    /// Landing back on the login page, or a 401/403, means the portal dropped
    /// the session.
    pub async fn post(&self, path: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url(path))
            .send()
            .await
            .map_err(AppError::from_fetch_transport)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || response.url().path().starts_with(LOGIN_PAGE)
        {
            return Err(AppError::Auth(format!(
                "portal rejected the session on {}",
                path
            )));
        }

        if !status.is_success() {
            return Err(AppError::Fetch(format!(
                "portal answered {} on {}",
                status, path
            )));
        }

        response.text().await.map_err(AppError::from_fetch_transport)
    }
}
