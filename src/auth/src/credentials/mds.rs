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

//! [Metadata Service] Credentials type.
//!
//! Google Cloud environments such as Google Compute Engine, Cloud Run, or
//! Google Kubernetes Engine expose a metadata server. The server returns
//! access tokens for the service account attached to the workload, and the id
//! of the project the workload runs in.
//!
//! The `GCE_METADATA_HOST` environment variable overrides the server host.
//!
//! [Metadata Service]: https://cloud.google.com/compute/docs/metadata/overview

use crate::Result;
use crate::constants::GCE_METADATA_HOST_VAR;
use crate::credentials::{Credentials, dynamic::CredentialsProvider};
use crate::errors::{self, CredentialsError};
use crate::token::Token;
use std::time::Duration;
use tokio::time::Instant;

const METADATA_FLAVOR_VALUE: &str = "Google";
const METADATA_FLAVOR: &str = "metadata-flavor";
const METADATA_ROOT: &str = "http://metadata.google.internal";
const MDS_TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const MDS_PROJECT_ID_PATH: &str = "/computeMetadata/v1/project/project-id";

const TOKEN_MSG: &str = "failed to fetch token from the metadata server";
const PROJECT_MSG: &str = "failed to fetch the project id from the metadata server";

/// The metadata server root, honoring `GCE_METADATA_HOST`.
pub(crate) fn default_endpoint() -> String {
    match std::env::var(GCE_METADATA_HOST_VAR) {
        Ok(host) if !host.is_empty() => format!("http://{host}"),
        _ => METADATA_ROOT.to_string(),
    }
}

/// A builder for metadata server [Credentials] instances.
#[derive(Debug, Default)]
pub struct Builder {
    endpoint: Option<String>,
    scopes: Option<Vec<String>>,
    quota_project_id: Option<String>,
    client: Option<reqwest::Client>,
}

impl Builder {
    /// Overrides the metadata server root, e.g. `http://169.254.169.254`.
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the [scopes] requested from the metadata server.
    ///
    /// If unset, the metadata server uses the scopes configured for the
    /// workload.
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
    pub fn build(self) -> Credentials {
        Credentials::from(MdsCredentials {
            client: self.client.unwrap_or_default(),
            endpoint: self.endpoint.unwrap_or_else(default_endpoint),
            scopes: self.scopes.filter(|s| !s.is_empty()),
            quota_project_id: self.quota_project_id,
        })
    }
}

#[derive(Debug)]
struct MdsCredentials {
    client: reqwest::Client,
    endpoint: String,
    scopes: Option<Vec<String>>,
    quota_project_id: Option<String>,
}

#[derive(serde::Deserialize)]
struct MdsTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    token_type: String,
}

#[async_trait::async_trait]
impl CredentialsProvider for MdsCredentials {
    async fn token(&self) -> Result<Token> {
        let request = self
            .client
            .get(format!("{}{MDS_TOKEN_PATH}", self.endpoint))
            .header(METADATA_FLAVOR, METADATA_FLAVOR_VALUE);
        let request = match &self.scopes {
            Some(scopes) => request.query(&[("scopes", scopes.join(","))]),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, TOKEN_MSG))?;
        if !response.status().is_success() {
            return Err(errors::from_http_response(response, TOKEN_MSG).await);
        }
        let response = response.json::<MdsTokenResponse>().await.map_err(|e| {
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

/// Queries the metadata server for the id of the project the workload runs in.
pub(crate) async fn project_id(client: &reqwest::Client, endpoint: &str) -> Result<String> {
    let response = client
        .get(format!("{endpoint}{MDS_PROJECT_ID_PATH}"))
        .header(METADATA_FLAVOR, METADATA_FLAVOR_VALUE)
        .send()
        .await
        .map_err(|e| errors::from_http_error(e, PROJECT_MSG))?;
    if !response.status().is_success() {
        return Err(errors::from_http_response(response, PROJECT_MSG).await);
    }
    let body = response
        .text()
        .await
        .map_err(|e| CredentialsError::new(!e.is_decode(), e))?;
    let project_id = body.trim();
    if project_id.is_empty() {
        return Err(CredentialsError::non_retryable_from_str(format!(
            "{PROJECT_MSG}, the response is empty"
        )));
    }
    Ok(project_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use scoped_env::ScopedEnv;
    use serde_json::json;

    type TestResult = anyhow::Result<()>;

    fn endpoint(server: &Server) -> String {
        server.url_str("").trim_end_matches('/').to_string()
    }

    #[tokio::test]
    async fn token_success() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", MDS_TOKEN_PATH),
                request::headers(contains(("metadata-flavor", "Google"))),
                request::query(url_decoded(contains(("scopes", "scope1,scope2")))),
            ])
            .respond_with(json_encoded(json!({
                "access_token": "test-access-token",
                "expires_in": 3600,
                "token_type": "Bearer",
            }))),
        );

        let creds = Builder::default()
            .with_endpoint(endpoint(&server))
            .with_scopes(["scope1", "scope2"])
            .with_quota_project_id("test-quota-project")
            .build();
        let token = creds.token().await?;
        assert_eq!(token.token, "test-access-token");
        assert!(token.expires_at.is_some(), "{token:?}");
        assert_eq!(
            creds.quota_project_id().as_deref(),
            Some("test-quota-project")
        );
        assert_eq!(creds.project_id(), None);
        Ok(())
    }

    #[tokio::test]
    async fn token_without_scopes() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", MDS_TOKEN_PATH),
                request::query(url_decoded(not(contains(key("scopes"))))),
            ])
            .respond_with(json_encoded(json!({
                "access_token": "test-access-token",
                "token_type": "Bearer",
            }))),
        );
        let creds = Builder::default().with_endpoint(endpoint(&server)).build();
        let token = creds.token().await?;
        assert_eq!(token.expires_at, None);
        Ok(())
    }

    #[tokio::test]
    async fn token_retryable_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", MDS_TOKEN_PATH))
                .respond_with(status_code(StatusCode::SERVICE_UNAVAILABLE.as_u16())),
        );
        let creds = Builder::default().with_endpoint(endpoint(&server)).build();
        let err = creds.token().await.unwrap_err();
        assert!(err.is_retryable(), "{err:?}");
    }

    #[tokio::test]
    async fn token_malformed_response() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", MDS_TOKEN_PATH))
                .respond_with(status_code(200).body("not json")),
        );
        let creds = Builder::default().with_endpoint(endpoint(&server)).build();
        let err = creds.token().await.unwrap_err();
        assert!(!err.is_retryable(), "{err:?}");
    }

    #[tokio::test]
    async fn project_id_success() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", MDS_PROJECT_ID_PATH),
                request::headers(contains(("metadata-flavor", "Google"))),
            ])
            .respond_with(status_code(200).body("test-project\n")),
        );
        let got = project_id(&reqwest::Client::new(), &endpoint(&server)).await?;
        assert_eq!(got, "test-project");
        Ok(())
    }

    #[tokio::test]
    async fn project_id_errors() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", MDS_PROJECT_ID_PATH))
                .times(2)
                .respond_with(cycle![
                    status_code(200).body(""),
                    status_code(StatusCode::NOT_FOUND.as_u16()),
                ]),
        );
        let client = reqwest::Client::new();
        let err = project_id(&client, &endpoint(&server)).await.unwrap_err();
        assert!(err.to_string().contains("empty"), "{err}");
        let err = project_id(&client, &endpoint(&server)).await.unwrap_err();
        assert!(!err.is_retryable(), "{err:?}");
    }

    #[test]
    #[serial_test::serial]
    fn endpoint_from_env() {
        let _e = ScopedEnv::set(GCE_METADATA_HOST_VAR, "localhost:8080");
        assert_eq!(default_endpoint(), "http://localhost:8080");
    }

    #[test]
    #[serial_test::serial]
    fn endpoint_default() {
        let _e = ScopedEnv::remove(GCE_METADATA_HOST_VAR);
        assert_eq!(default_endpoint(), METADATA_ROOT);
    }
}
