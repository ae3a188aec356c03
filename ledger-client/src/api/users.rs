use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Expense;
use crate::cache::CacheKey;
use crate::invalidation::{MutationDescriptor, MutationKind};
use crate::transport::RequestBody;
use crate::{Client, ClientError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
}

/// A user together with the expenses they appear in and their overall balance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    #[serde(flatten)]
    pub user: User,
    #[serde(default)]
    pub expenses_paid: Vec<Expense>,
    #[serde(default)]
    pub expenses_owed: Vec<Expense>,
    pub created_at: DateTime<Utc>,
    pub balance: f64,
}

/// Someone the current user is settled against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counterparty {
    #[serde(flatten)]
    pub user: User,
    pub amount: f64,
    pub owed_to_me: bool,
}

/// What `GET /users/profile` returns: the current user and who they owe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub details: UserDetails,
    #[serde(default)]
    pub users: Vec<Counterparty>,
}

impl Client {
    pub async fn users(&self) -> Result<Vec<UserDetails>, ClientError> {
        self.read_entity(CacheKey::users(), "users".to_string())
            .await
    }

    pub async fn refresh_users(&self) -> Result<Vec<UserDetails>, ClientError> {
        self.refresh_entity(CacheKey::users(), "users".to_string())
            .await
    }

    pub async fn profile(&self) -> Result<UserProfile, ClientError> {
        self.read_entity(CacheKey::user_info(), "users/profile".to_string())
            .await
    }

    /// Pull to refresh.
    pub async fn refresh_profile(&self) -> Result<UserProfile, ClientError> {
        self.refresh_entity(CacheKey::user_info(), "users/profile".to_string())
            .await
    }

    pub async fn update_profile(&self, name: &str) -> Result<(), ClientError> {
        self.mutate(
            MutationDescriptor::new(MutationKind::UpdateProfile),
            Method::PATCH,
            "users/profile",
            RequestBody::Json(json!({ "name": name })),
        )
        .await?;
        Ok(())
    }
}
