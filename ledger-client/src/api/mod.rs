//! Typed endpoints of the ledger service.
//!
//! Reads go through the entity cache. Writes go through the mutation
//! coordinator, so by the time one of them returns, every view it could have
//! changed is marked for refetch.
mod auth;
mod expenses;
mod groups;
mod items;
mod users;

pub use auth::{AuthResponse, Credentials, Registration};
pub use expenses::{Expense, ExpenseForm, ExpenseWithItems, Receipt, SharedWith};
pub use groups::{Group, GroupWithBalance, Member};
pub use items::{Item, ItemDetails, NewItem};
pub use users::{Counterparty, User, UserDetails, UserProfile};

use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::cache::CacheKey;
use crate::invalidation::MutationDescriptor;
use crate::transport::{HttpResponse, RequestBody};
use crate::{Client, ClientError};

impl Client {
    /// Cached read of the enveloped entity at `path`.
    async fn read_entity<T: DeserializeOwned>(
        &self,
        key: CacheKey,
        path: String,
    ) -> Result<T, ClientError> {
        let gateway = Arc::clone(&self.gateway);
        self.cache
            .read(key, move || async move { gateway.get(&path).await })
            .await
    }

    /// Like `read_entity`, but always goes to the server.
    async fn refresh_entity<T: DeserializeOwned>(
        &self,
        key: CacheKey,
        path: String,
    ) -> Result<T, ClientError> {
        let gateway = Arc::clone(&self.gateway);
        self.cache
            .write_through(key, move || async move { gateway.get(&path).await })
            .await
    }

    /// Sends a write and applies the invalidation for `descriptor` if it succeeds.
    async fn mutate(
        &self,
        descriptor: MutationDescriptor,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<HttpResponse, ClientError> {
        let response = self
            .mutations
            .perform(
                &descriptor,
                self.gateway.request(method, path, body, Vec::new()),
            )
            .await?;
        Ok(response)
    }
}
