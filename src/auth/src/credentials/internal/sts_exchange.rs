// Copyright 2025 Google LLC
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

use crate::Result;
use crate::constants::{ACCESS_TOKEN_TYPE, TOKEN_EXCHANGE_GRANT_TYPE};
use crate::errors::{self, CredentialsError};
use base64::Engine;
use serde::Deserialize;
use std::collections::HashMap;

const MSG: &str = "failed to exchange the subject token";

/// Handles OAuth2 Secure Token Service (STS) exchange.
/// Reference: https://datatracker.ietf.org/doc/html/rfc8693
#[derive(Clone, Debug)]
pub(crate) struct STSHandler {
    client: reqwest::Client,
}

impl STSHandler {
    pub(crate) fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Performs an oauth2 token exchange with the provided [ExchangeTokenRequest] information.
    pub(crate) async fn exchange_token(&self, req: ExchangeTokenRequest) -> Result<TokenResponse> {
        let mut params: HashMap<&str, String> = HashMap::new();
        params.insert("grant_type", TOKEN_EXCHANGE_GRANT_TYPE.to_string());
        params.insert("requested_token_type", ACCESS_TOKEN_TYPE.to_string());
        params.insert("subject_token", req.subject_token);
        params.insert("subject_token_type", req.subject_token_type);
        if !req.scope.is_empty() {
            params.insert("scope", req.scope.join(" "));
        }
        if let Some(audience) = req.audience {
            params.insert("audience", audience);
        }

        let mut headers = http::HeaderMap::new();
        req.authentication.inject_auth(&mut headers, &mut params);

        let response = self
            .client
            .post(req.url)
            .form(&params)
            .headers(headers)
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, MSG))?;
        if !response.status().is_success() {
            return Err(errors::from_http_response(response, MSG).await);
        }
        response.json::<TokenResponse>().await.map_err(|e| {
            let retryable = !e.is_decode();
            CredentialsError::new(retryable, e)
        })
    }
}

/// TokenResponse is used to decode the remote server response during
/// an oauth2 token exchange.
#[derive(Deserialize, Default, PartialEq, Debug)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub issued_token_type: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// ClientAuthentication represents an OAuth client ID and secret.
///
/// The credentials are sent with HTTP Basic authentication, as stated in
/// https://datatracker.ietf.org/doc/html/rfc6749#section-2.3.1.
#[derive(Clone, Debug, Default)]
pub(crate) struct ClientAuthentication {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl ClientAuthentication {
    fn inject_auth(&self, headers: &mut http::HeaderMap, params: &mut HashMap<&str, String>) {
        match (&self.client_id, &self.client_secret) {
            (Some(client_id), Some(client_secret)) => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{client_id}:{client_secret}"));
                if let Ok(mut value) = http::HeaderValue::from_str(&format!("Basic {encoded}")) {
                    value.set_sensitive(true);
                    headers.insert(http::header::AUTHORIZATION, value);
                }
            }
            // Public clients only identify themselves.
            (Some(client_id), None) => {
                params.insert("client_id", client_id.clone());
            }
            _ => {}
        }
    }
}

/// Information required to perform an oauth2 token exchange with the provided endpoint.
#[derive(Debug, Default)]
pub(crate) struct ExchangeTokenRequest {
    pub url: String,
    pub authentication: ClientAuthentication,
    pub subject_token: String,
    pub subject_token_type: String,
    pub audience: Option<String>,
    pub scope: Vec<String>,
}
