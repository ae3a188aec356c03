use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::User;
use crate::cache::CacheKey;
use crate::invalidation::{MutationDescriptor, MutationKind};
use crate::transport::RequestBody;
use crate::{Client, ClientError};

/// A line of an expense as listed on the expense screen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub price: f64,
    /// User id.
    pub purchased_by: String,
    #[serde(default)]
    pub shared_by: Vec<User>,
    #[serde(default)]
    pub exempted_by: Vec<User>,
    /// Id of the owning expense.
    pub expense: String,
    pub created_at: DateTime<Utc>,
}

/// `GET /items/:id`, with the purchaser filled in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetails {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub price: f64,
    pub purchased_by: User,
    #[serde(default)]
    pub shared_by: Vec<User>,
    #[serde(default)]
    pub exempted_by: Vec<User>,
    pub expense: String,
    pub created_at: DateTime<Utc>,
}

/// Body of the add and edit item screens. Ids are user ids.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub expense_id: String,
    pub purchased_by: String,
    pub shared_by: Vec<String>,
    pub exempted_by: Vec<String>,
}

impl Client {
    pub async fn item(&self, id: &str) -> Result<ItemDetails, ClientError> {
        self.read_entity(CacheKey::item(id), format!("items/{id}"))
            .await
    }

    pub async fn refresh_item(&self, id: &str) -> Result<ItemDetails, ClientError> {
        self.refresh_entity(CacheKey::item(id), format!("items/{id}"))
            .await
    }

    pub async fn update_item(&self, id: &str, item: &NewItem) -> Result<(), ClientError> {
        let mut body = serde_json::to_value(item)?;
        if let Some(fields) = body.as_object_mut() {
            fields.insert("_id".to_string(), id.into());
        }

        self.mutate(
            MutationDescriptor::new(MutationKind::UpdateItem)
                .expense(&item.expense_id)
                .item(id),
            Method::PATCH,
            &format!("items/{id}"),
            RequestBody::Json(body),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_item(&self, id: &str, expense_id: &str) -> Result<(), ClientError> {
        self.mutate(
            MutationDescriptor::new(MutationKind::DeleteItem)
                .expense(expense_id)
                .item(id),
            Method::DELETE,
            &format!("items/{id}"),
            RequestBody::Empty,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_item_omits_missing_price() {
        let item = NewItem {
            name: "Bread".to_string(),
            price: None,
            expense_id: "e1".to_string(),
            purchased_by: "u1".to_string(),
            shared_by: vec!["u1".to_string(), "u2".to_string()],
            exempted_by: vec![],
        };
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({
                "name": "Bread",
                "expenseId": "e1",
                "purchasedBy": "u1",
                "sharedBy": ["u1", "u2"],
                "exemptedBy": []
            })
        );
    }
}
