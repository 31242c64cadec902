// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! [User Account] Credentials type.
//!
//! These credentials exchange an OAuth 2.0 refresh token for access tokens.
//! They are what `gcloud auth application-default login` writes to the
//! well-known ADC file, and are found by
//! [GoogleIdentityProvider](crate::identity::GoogleIdentityProvider) when it
//! looks for ambient credentials.
//!
//! [User Account]: https://cloud.google.com/docs/authentication#user-accounts

use crate::build_errors::Error as BuilderError;
use crate::constants::{OAUTH2_TOKEN_URL, REFRESH_TOKEN_GRANT_TYPE};
use crate::credentials::{Credentials, dynamic::CredentialsProvider};
use crate::errors::{self, CredentialsError};
use crate::token::Token;
use crate::{BuildResult, Result};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

const MSG: &str = "failed to refresh user access token";

/// A builder for user account [Credentials] instances.
pub struct Builder {
    authorized_user: Value,
    scopes: Option<Vec<String>>,
    quota_project_id: Option<String>,
    token_uri: Option<String>,
    client: Option<reqwest::Client>,
}

impl Builder {
    /// Creates a new builder using `authorized_user` JSON value.
    pub fn new(authorized_user: Value) -> Self {
        Self {
            authorized_user,
            scopes: None,
            quota_project_id: None,
            token_uri: None,
            client: None,
        }
    }

    /// Overrides the token endpoint.
    ///
    /// Any value provided here overrides a `token_uri` value from the input
    /// JSON. Defaults to `https://oauth2.googleapis.com/token`.
    pub fn with_token_uri<S: Into<String>>(mut self, token_uri: S) -> Self {
        self.token_uri = Some(token_uri.into());
        self
    }

    /// Sets the [scopes] for these credentials.
    ///
    /// [scopes]: https://developers.google.com/identity/protocols/oauth2/scopes
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(|s| s.into()).collect());
        self
    }

    /// Sets the [quota project] for these credentials.
    ///
    /// Any value set here overrides a `quota_project_id` value from the input
    /// JSON.
    ///
    /// [quota project]: https://cloud.google.com/docs/quotas/quota-project
    pub fn with_quota_project_id<S: Into<String>>(mut self, quota_project_id: S) -> Self {
        self.quota_project_id = Some(quota_project_id.into());
        self
    }

    pub(crate) fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Returns a [Credentials] instance with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns a parsing error if the JSON is malformed or missing required
    /// fields.
    pub fn build(self) -> BuildResult<Credentials> {
        let authorized_user = serde_json::from_value::<AuthorizedUser>(self.authorized_user)
            .map_err(BuilderError::parsing)?;
        let endpoint = self
            .token_uri
            .or(authorized_user.token_uri)
            .unwrap_or_else(|| OAUTH2_TOKEN_URL.to_string());
        let quota_project_id = self.quota_project_id.or(authorized_user.quota_project_id);

        Ok(Credentials::from(UserCredentials {
            client: self.client.unwrap_or_default(),
            client_id: authorized_user.client_id,
            client_secret: authorized_user.client_secret,
            refresh_token: authorized_user.refresh_token,
            endpoint,
            scopes: self.scopes.map(|scopes| scopes.join(" ")),
            quota_project_id,
        }))
    }
}

struct UserCredentials {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    endpoint: String,
    scopes: Option<String>,
    quota_project_id: Option<String>,
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[censored]")
            .field("refresh_token", &"[censored]")
            .field("endpoint", &self.endpoint)
            .field("scopes", &self.scopes)
            .field("quota_project_id", &self.quota_project_id)
            .finish()
    }
}

#[async_trait::async_trait]
impl CredentialsProvider for UserCredentials {
    async fn token(&self) -> Result<Token> {
        let req = Oauth2RefreshRequest {
            grant_type: REFRESH_TOKEN_GRANT_TYPE,
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            refresh_token: &self.refresh_token,
            scopes: self.scopes.as_deref(),
        };
        let resp = self
            .client
            .post(self.endpoint.as_str())
            .json(&req)
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, MSG))?;
        if !resp.status().is_success() {
            return Err(errors::from_http_response(resp, MSG).await);
        }
        let response = resp.json::<Oauth2RefreshResponse>().await.map_err(|e| {
            let retryable = !e.is_decode();
            CredentialsError::new(retryable, e)
        })?;
        Ok(Token {
            token: response.access_token,
            token_type: response.token_type,
            expires_at: response
                .expires_in
                .map(|d| Instant::now() + Duration::from_secs(d)),
            metadata: None,
        })
    }

    fn quota_project_id(&self) -> Option<String> {
        self.quota_project_id.clone()
    }
}

#[derive(Debug, PartialEq, serde::Deserialize)]
struct AuthorizedUser {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(default)]
    token_uri: Option<String>,
    #[serde(default)]
    quota_project_id: Option<String>,
}

#[derive(serde::Serialize)]
struct Oauth2RefreshRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scopes: Option<&'a str>,
}

#[derive(serde::Deserialize)]
struct Oauth2RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    token_type: String,
}
