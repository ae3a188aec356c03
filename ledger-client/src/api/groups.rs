use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Expense;
use crate::cache::CacheKey;
use crate::gateway::decode_data;
use crate::invalidation::{MutationDescriptor, MutationKind};
use crate::transport::RequestBody;
use crate::{Client, ClientError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    /// Expense ids.
    #[serde(default)]
    pub expenses_paid: Vec<String>,
    #[serde(default)]
    pub expenses_owed: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub balance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
    pub created_at: DateTime<Utc>,
}

/// An entry of the group list, with the current user's totals in it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupWithBalance {
    #[serde(flatten)]
    pub group: Group,
    pub total_owed: f64,
    pub total_returned: f64,
}

impl GroupWithBalance {
    /// Positive when the group owes the current user.
    pub fn balance(&self) -> f64 {
        self.total_returned - self.total_owed
    }
}

impl Client {
    pub async fn groups(&self) -> Result<Vec<GroupWithBalance>, ClientError> {
        self.read_entity(CacheKey::groups(), "groups".to_string())
            .await
    }

    pub async fn refresh_groups(&self) -> Result<Vec<GroupWithBalance>, ClientError> {
        self.refresh_entity(CacheKey::groups(), "groups".to_string())
            .await
    }

    pub async fn group(&self, id: &str) -> Result<Group, ClientError> {
        self.read_entity(CacheKey::group(id), format!("groups/{id}"))
            .await
    }

    pub async fn refresh_group(&self, id: &str) -> Result<Group, ClientError> {
        self.refresh_entity(CacheKey::group(id), format!("groups/{id}"))
            .await
    }

    pub async fn create_group(&self, name: &str) -> Result<Group, ClientError> {
        let response = self
            .mutate(
                MutationDescriptor::new(MutationKind::CreateGroup),
                Method::POST,
                "groups",
                RequestBody::Json(json!({ "name": name })),
            )
            .await?;
        Ok(decode_data(&response)?)
    }

    pub async fn delete_group(&self, id: &str) -> Result<(), ClientError> {
        self.mutate(
            MutationDescriptor::new(MutationKind::DeleteGroup).group(id),
            Method::DELETE,
            &format!("groups/{id}"),
            RequestBody::Empty,
        )
        .await?;
        Ok(())
    }

    pub async fn add_member(&self, group_id: &str, user_id: &str) -> Result<(), ClientError> {
        self.mutate(
            MutationDescriptor::new(MutationKind::AddMember).group(group_id),
            Method::POST,
            "groups/add-user",
            RequestBody::Json(json!({ "groupId": group_id, "userId": user_id })),
        )
        .await?;
        Ok(())
    }
}
