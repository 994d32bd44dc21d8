use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    /// User id assigned by the identity provider.
    pub external_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

// Profile fields synced from the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub external_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
}

// Identity provider webhook envelope
#[derive(Debug, Deserialize)]
pub struct IdentityEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct IdentityEmailAddress {
    pub email_address: String,
}

#[derive(Debug, Deserialize)]
pub struct IdentityUserData {
    pub id: Option<String>,
    #[serde(default)]
    pub email_addresses: Vec<IdentityEmailAddress>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
}

impl IdentityUserData {
    /// Returns `None` when the provider omitted the id or every email address.
    pub fn into_profile(self) -> Option<UserProfile> {
        let external_id = self.id.filter(|id| !id.is_empty())?;
        let email = self.email_addresses.into_iter().next()?.email_address;

        Some(UserProfile {
            external_id,
            email,
            first_name: self.first_name.filter(|s| !s.is_empty()),
            last_name: self.last_name.filter(|s| !s.is_empty()),
            image_url: self.image_url.filter(|s| !s.is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct IdentityDeletedData {
    pub id: Option<String>,
}

// Current user response
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            image_url: user.image_url,
            created_at: user.created_at,
        }
    }
}
