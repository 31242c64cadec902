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

//! The cached, refreshable state for one credential.

use crate::Result;
use crate::constants::REFRESH_THRESHOLD;
use crate::credentials::Credentials;
use crate::token::Token;

/// A credential together with its most recent token.
///
/// Handles are created by the resolver and kept in the
/// [AccessTokenService](crate::service::AccessTokenService) cache. Only the
/// crate mutates them.
#[derive(Clone, Debug)]
pub struct CredentialHandle {
    credentials: Credentials,
    token: Option<Token>,
    project_id: Option<String>,
}

impl CredentialHandle {
    pub(crate) fn new(credentials: Credentials, project_id: Option<String>) -> Self {
        Self {
            credentials,
            token: None,
            project_id,
        }
    }

    /// The current bearer token, or `""` before the first fetch.
    pub fn token(&self) -> &str {
        self.token.as_ref().map(|t| t.token.as_str()).unwrap_or("")
    }

    /// Returns `true` if there is no token, or the token is about to expire.
    pub fn expired(&self) -> bool {
        self.token
            .as_ref()
            .is_none_or(|t| t.expires_within(REFRESH_THRESHOLD))
    }

    /// The project the credential is bound to, if known.
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// The quota project of the credential, if any.
    pub fn quota_project_id(&self) -> Option<String> {
        self.credentials.quota_project_id()
    }

    /// Fetches a new token. The current token is only replaced on success.
    pub(crate) async fn refresh(&mut self) -> Result<()> {
        let token = self.credentials.token().await?;
        self.token = Some(token);
        Ok(())
    }
}
