//! User profile lookup

use async_trait::async_trait;
use oboe_common::{ErrorKind, Failure};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// The signed-in user's profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Option<String>,
    pub display_name: Option<String>,
    /// Mail address, falling back to the user principal name
    pub mail: Option<String>,
    pub job_title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    mail: Option<String>,
    #[serde(default)]
    user_principal_name: Option<String>,
    #[serde(default)]
    job_title: Option<String>,
}

impl From<ProfileResponse> for UserProfile {
    fn from(raw: ProfileResponse) -> Self {
        Self {
            id: raw.id,
            display_name: raw.display_name,
            mail: raw.mail.or(raw.user_principal_name),
            job_title: raw.job_title,
        }
    }
}

/// Reads the user profile with a delegated token
#[async_trait]
pub trait ProfileService: Send + Sync {
    async fn fetch(&self, token: &str) -> Result<UserProfile, Failure>;
}

pub struct HttpProfileService {
    client: Client,
    endpoint: Url,
}

impl HttpProfileService {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, Failure> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            Failure::new(ErrorKind::Configuration, format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl ProfileService for HttpProfileService {
    async fn fetch(&self, token: &str) -> Result<UserProfile, Failure> {
        let unavailable = |message: String| Failure::new(ErrorKind::ProviderUnavailable, message);

        let response = self
            .client
            .get(self.endpoint.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(unavailable(format!("profile lookup returned {}", response.status())));
        }

        let raw: ProfileResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("malformed profile: {}", e)))?;
        Ok(raw.into())
    }
}
