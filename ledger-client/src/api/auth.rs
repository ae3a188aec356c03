use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::User;
use crate::gateway::decode;
use crate::transport::RequestBody;
use crate::{Client, ClientError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AuthResponse {
    pub status: String,
    pub data: User,
    pub token: String,
}

impl Client {
    pub async fn login(&self, credentials: &Credentials) -> Result<User, ClientError> {
        self.authenticate("users/login", serde_json::to_value(credentials)?)
            .await
    }

    pub async fn register(&self, registration: &Registration) -> Result<User, ClientError> {
        self.authenticate("users/register", serde_json::to_value(registration)?)
            .await
    }

    /// Returns `false` if there was no session to end.
    pub async fn logout(&self) -> Result<bool, ClientError> {
        Ok(self.session.logout().await?)
    }

    async fn authenticate(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<User, ClientError> {
        let response = self
            .gateway
            .request(Method::POST, path, RequestBody::Json(body), Vec::new())
            .await?;
        let AuthResponse { data, token, .. } = decode(&response)?;

        self.session.login(token).await?;
        log::info!("Signed in as {}", data.id);
        Ok(data)
    }
}
