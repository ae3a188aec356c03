use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Item, NewItem, User};
use crate::cache::CacheKey;
use crate::invalidation::{MutationDescriptor, MutationKind};
use crate::transport::{FormPart, RequestBody};
use crate::{Client, ClientError};

/// One participant's part of an expense, as computed by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedWith {
    #[serde(rename = "_id")]
    pub id: String,
    pub user: User,
    pub share_amount: f64,
    #[serde(default)]
    pub exempted_items: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    #[serde(rename = "_id")]
    pub id: String,
    pub description: String,
    pub total_amount: f64,
    pub paid_by: User,
    #[serde(default)]
    pub shared_with: Vec<SharedWith>,
    #[serde(default)]
    pub total_owed: f64,
    #[serde(default)]
    pub total_returned: f64,
    /// Id of the owning group.
    pub group: String,
    #[serde(default)]
    pub image: Option<String>,
    pub date: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpenseWithItems {
    #[serde(flatten)]
    pub expense: Expense,
    #[serde(default)]
    pub items: Vec<Item>,
}

/// A receipt photo attached to an expense.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Fields of the create and edit expense screens. Sent as multipart.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpenseForm {
    pub description: String,
    pub total_amount: f64,
    pub group_id: String,
    /// User id of the payer.
    pub paid_by: String,
    pub image: Option<Receipt>,
}

impl ExpenseForm {
    fn to_parts(&self) -> Vec<FormPart> {
        let mut parts = vec![
            FormPart::text("description", self.description.as_str()),
            FormPart::text("totalAmount", self.total_amount.to_string()),
            FormPart::text("groupId", self.group_id.as_str()),
            FormPart::text("paidBy", self.paid_by.as_str()),
        ];
        if let Some(receipt) = &self.image {
            parts.push(FormPart::file(
                "image",
                receipt.file_name.as_str(),
                receipt.mime.as_str(),
                receipt.bytes.clone(),
            ));
        }
        parts
    }
}

impl Client {
    pub async fn expenses(&self) -> Result<Vec<Expense>, ClientError> {
        self.read_entity(CacheKey::expenses(), "expenses".to_string())
            .await
    }

    pub async fn refresh_expenses(&self) -> Result<Vec<Expense>, ClientError> {
        self.refresh_entity(CacheKey::expenses(), "expenses".to_string())
            .await
    }

    pub async fn expense(&self, id: &str) -> Result<ExpenseWithItems, ClientError> {
        self.read_entity(CacheKey::expense(id), format!("expenses/{id}"))
            .await
    }

    pub async fn refresh_expense(&self, id: &str) -> Result<ExpenseWithItems, ClientError> {
        self.refresh_entity(CacheKey::expense(id), format!("expenses/{id}"))
            .await
    }

    pub async fn create_expense(&self, form: &ExpenseForm) -> Result<(), ClientError> {
        self.mutate(
            MutationDescriptor::new(MutationKind::CreateExpense).group(&form.group_id),
            Method::POST,
            "expenses",
            RequestBody::Multipart(form.to_parts()),
        )
        .await?;
        Ok(())
    }

    pub async fn update_expense(&self, id: &str, form: &ExpenseForm) -> Result<(), ClientError> {
        self.mutate(
            MutationDescriptor::new(MutationKind::UpdateExpense)
                .group(&form.group_id)
                .expense(id),
            Method::PATCH,
            &format!("expenses/{id}"),
            RequestBody::Multipart(form.to_parts()),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_expense(&self, id: &str, group_id: &str) -> Result<(), ClientError> {
        self.mutate(
            MutationDescriptor::new(MutationKind::DeleteExpense)
                .group(group_id)
                .expense(id),
            Method::DELETE,
            &format!("expenses/{id}"),
            RequestBody::Empty,
        )
        .await?;
        Ok(())
    }

    /// Asks the server to settle the expense. Balances change everywhere.
    pub async fn finalize_expense(&self, id: &str, group_id: &str) -> Result<(), ClientError> {
        self.mutate(
            MutationDescriptor::new(MutationKind::FinalizeExpense)
                .group(group_id)
                .expense(id),
            Method::POST,
            "expenses/finalize",
            RequestBody::Json(json!({ "expenseId": id })),
        )
        .await?;
        Ok(())
    }

    pub async fn add_item(&self, item: &NewItem) -> Result<(), ClientError> {
        self.mutate(
            MutationDescriptor::new(MutationKind::AddItem).expense(&item.expense_id),
            Method::POST,
            &format!("expenses/{}/items", item.expense_id),
            RequestBody::Json(serde_json::to_value(item)?),
        )
        .await?;
        Ok(())
    }
}
