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

use super::parse_subject_token;
use crate::Result;
use crate::credentials::external_account::CredentialSourceFormat;
use crate::credentials::subject_token::SubjectTokenProvider;
use crate::errors::{self, CredentialsError};
use std::collections::HashMap;

const MSG: &str = "failed to request subject token";

/// Reads the subject token from a URL, e.g. the Azure instance metadata
/// service or an OIDC token endpoint.
#[derive(Debug, Clone)]
pub(crate) struct UrlSourcedCredentials {
    pub client: reqwest::Client,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub format: String,
    pub subject_token_field_name: String,
}

impl UrlSourcedCredentials {
    pub(crate) fn new(
        client: reqwest::Client,
        url: String,
        headers: Option<HashMap<String, String>>,
        format: Option<CredentialSourceFormat>,
    ) -> Self {
        let (format, subject_token_field_name) = CredentialSourceFormat::split(format);
        Self {
            client,
            url,
            headers: headers.unwrap_or_default(),
            format,
            subject_token_field_name,
        }
    }
}

#[async_trait::async_trait]
impl SubjectTokenProvider for UrlSourcedCredentials {
    async fn subject_token(&self) -> Result<String> {
        let request = self
            .headers
            .iter()
            .fold(self.client.get(self.url.as_str()), |r, (k, v)| {
                r.header(k.as_str(), v.as_str())
            });
        let response = request
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, MSG))?;
        if !response.status().is_success() {
            return Err(errors::from_http_response(response, MSG).await);
        }
        let content = response.text().await.map_err(|e| {
            let retryable = !e.is_body();
            CredentialsError::new(retryable, e)
        })?;
        parse_subject_token(content, &self.format, &self.subject_token_field_name)
    }
}
