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

//! [Workload Identity Federation] (external account) Credentials type.
//!
//! External account credentials obtain a third-party *subject token* and
//! exchange it for a Google access token at the [Security Token Service].
//! Two families of `credential_source` are supported:
//!
//! * identity pools (Azure, OIDC providers, Kubernetes), where the subject
//!   token is read from a URL or a file;
//! * AWS, where the subject token is a signed `GetCallerIdentity` request.
//!
//! The AWS family is recognized by a `credential_source.environment_id`
//! starting with `aws`.
//!
//! [Security Token Service]: https://cloud.google.com/iam/docs/reference/sts/rest
//! [Workload Identity Federation]: https://cloud.google.com/iam/docs/workload-identity-federation

use super::external_account_sources::aws_sourced::{AwsCredentialSource, AwsSourcedCredentials};
use super::external_account_sources::file_sourced::FileSourcedCredentials;
use super::external_account_sources::url_sourced::UrlSourcedCredentials;
use super::internal::sts_exchange::{ClientAuthentication, ExchangeTokenRequest, STSHandler};
use super::subject_token::SubjectTokenProvider;
use super::{Credentials, dynamic::CredentialsProvider};
use crate::build_errors::Error as BuilderError;
use crate::constants::{DEFAULT_SCOPE, STS_TOKEN_URL};
use crate::errors::{self, CredentialsError};
use crate::token::Token;
use crate::{BuildResult, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::Instant;

const IMPERSONATION_MSG: &str = "failed to impersonate the service account";
const IMPERSONATED_TOKEN_LIFETIME: &str = "3600s";

/// Returns `true` if `config` describes AWS workload identity federation.
///
/// That is, its `credential_source.environment_id` is a string starting with
/// `aws`. A missing `credential_source` is not AWS.
pub(crate) fn is_aws_environment(config: &Value) -> bool {
    config
        .get("credential_source")
        .and_then(|source| source.get("environment_id"))
        .and_then(Value::as_str)
        .is_some_and(|id| id.starts_with("aws"))
}

/// How the subject token is extracted from a URL response or a file.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct CredentialSourceFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    #[serde(default)]
    pub subject_token_field_name: Option<String>,
}

impl CredentialSourceFormat {
    /// Returns the format type and field name, defaulting to plain text.
    pub(crate) fn split(format: Option<Self>) -> (String, String) {
        format
            .map(|f| (f.format_type, f.subject_token_field_name.unwrap_or_default()))
            .unwrap_or_else(|| ("text".to_string(), String::new()))
    }
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum IdentityPoolSource {
    Url {
        url: String,
        #[serde(default)]
        headers: Option<HashMap<String, String>>,
        #[serde(default)]
        format: Option<CredentialSourceFormat>,
    },
    File {
        file: String,
        #[serde(default)]
        format: Option<CredentialSourceFormat>,
    },
}

/// A representation of an [external account config file].
///
/// [external account config file]: https://google.aip.dev/auth/4117#configuration-file-generation-and-usage
#[derive(Deserialize)]
struct ExternalAccountFile {
    audience: String,
    subject_token_type: String,
    #[serde(default)]
    token_url: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    scopes: Option<Vec<String>>,
    #[serde(default)]
    service_account_impersonation_url: Option<String>,
    #[serde(default)]
    quota_project_id: Option<String>,
    credential_source: Value,
}

#[derive(Clone)]
struct ExternalAccountConfig {
    audience: String,
    subject_token_type: String,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    scopes: Vec<String>,
    service_account_impersonation_url: Option<String>,
}

impl std::fmt::Debug for ExternalAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalAccountConfig")
            .field("audience", &self.audience)
            .field("subject_token_type", &self.subject_token_type)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[censored]"))
            .field("scopes", &self.scopes)
            .field(
                "service_account_impersonation_url",
                &self.service_account_impersonation_url,
            )
            .finish()
    }
}

/// A builder for external account [Credentials] instances.
///
/// # Example
/// ```
/// # use google_cloud_vertex_auth::credentials::external_account::Builder;
/// let config = serde_json::json!({
///     "type": "external_account",
///     "audience": "//iam.googleapis.com/projects/123/locations/global/workloadIdentityPools/my-pool/providers/my-provider",
///     "subject_token_type": "urn:ietf:params:oauth:token-type:jwt",
///     "token_url": "https://sts.googleapis.com/v1/token",
///     "credential_source": {
///         "file": "/var/run/secrets/tokens/gcp-ksa/token",
///     }
/// });
/// let credentials = Builder::new(config)
///     .with_quota_project_id("my-quota-project")
///     .build_identity_pool();
/// assert!(credentials.is_ok());
/// ```
pub struct Builder {
    external_account_config: Value,
    quota_project_id: Option<String>,
    scopes: Option<Vec<String>>,
    client: Option<reqwest::Client>,
}

impl Builder {
    /// Creates a new builder using an [external account config] JSON value.
    ///
    /// [external account config]: https://google.aip.dev/auth/4117#configuration-file-generation-and-usage
    pub fn new(external_account_config: Value) -> Self {
        Self {
            external_account_config,
            quota_project_id: None,
            scopes: None,
            client: None,
        }
    }

    /// Sets the [quota project] for these credentials.
    ///
    /// [quota project]: https://cloud.google.com/docs/quotas/quota-project
    pub fn with_quota_project_id<S: Into<String>>(mut self, quota_project_id: S) -> Self {
        self.quota_project_id = Some(quota_project_id.into());
        self
    }

    /// Overrides the [scopes] for these credentials.
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

    pub(crate) fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Returns a [Credentials] instance, detecting the `credential_source`
    /// family from the configuration.
    pub fn build(self) -> BuildResult<Credentials> {
        if is_aws_environment(&self.external_account_config) {
            self.build_aws()
        } else {
            self.build_identity_pool()
        }
    }

    /// Returns identity pool [Credentials], with the subject token read from a
    /// URL or a file.
    ///
    /// # Errors
    ///
    /// Returns a parsing error if the configuration is malformed, or if its
    /// `credential_source` has neither a `url` nor a `file`.
    pub fn build_identity_pool(self) -> BuildResult<Credentials> {
        let (file, client, quota_project_id) = self.parse()?;
        let source = serde_json::from_value::<IdentityPoolSource>(file.credential_source.clone())
            .map_err(|e| {
                BuilderError::parsing(format!(
                    "identity pool credential_source requires a `url` or a `file`: {e}"
                ))
            })?;
        let config = ExternalAccountConfig::from(file);
        Ok(match source {
            IdentityPoolSource::Url {
                url,
                headers,
                format,
            } => make_credentials(
                UrlSourcedCredentials::new(client.clone(), url, headers, format),
                config,
                client,
                quota_project_id,
            ),
            IdentityPoolSource::File { file, format } => make_credentials(
                FileSourcedCredentials::new(file, format),
                config,
                client,
                quota_project_id,
            ),
        })
    }

    /// Returns AWS [Credentials], with the subject token computed from AWS
    /// security credentials.
    ///
    /// # Errors
    ///
    /// Returns a parsing error if the configuration is malformed, or if its
    /// `credential_source` is not a supported AWS source.
    pub fn build_aws(self) -> BuildResult<Credentials> {
        let (file, client, quota_project_id) = self.parse()?;
        let source = serde_json::from_value::<AwsCredentialSource>(file.credential_source.clone())
            .map_err(BuilderError::parsing)?;
        let source = AwsSourcedCredentials::new(client.clone(), source, file.audience.clone())?;
        Ok(make_credentials(
            source,
            ExternalAccountConfig::from(file),
            client,
            quota_project_id,
        ))
    }

    fn parse(self) -> BuildResult<(ExternalAccountFile, reqwest::Client, Option<String>)> {
        let mut file = serde_json::from_value::<ExternalAccountFile>(self.external_account_config)
            .map_err(BuilderError::parsing)?;
        if let Some(scopes) = self.scopes {
            file.scopes = Some(scopes);
        }
        let quota_project_id = self.quota_project_id.or_else(|| file.quota_project_id.clone());
        Ok((file, self.client.unwrap_or_default(), quota_project_id))
    }
}

impl From<ExternalAccountFile> for ExternalAccountConfig {
    fn from(file: ExternalAccountFile) -> Self {
        let scopes = file
            .scopes
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]);
        Self {
            audience: file.audience,
            subject_token_type: file.subject_token_type,
            token_url: file.token_url.unwrap_or_else(|| STS_TOKEN_URL.to_string()),
            client_id: file.client_id,
            client_secret: file.client_secret,
            scopes,
            service_account_impersonation_url: file.service_account_impersonation_url,
        }
    }
}

fn make_credentials<T>(
    subject_token_provider: T,
    config: ExternalAccountConfig,
    client: reqwest::Client,
    quota_project_id: Option<String>,
) -> Credentials
where
    T: SubjectTokenProvider + 'static,
{
    Credentials::from(ExternalAccountCredentials {
        subject_token_provider,
        sts: STSHandler::new(client.clone()),
        client,
        config,
        quota_project_id,
    })
}

#[derive(Debug)]
struct ExternalAccountCredentials<T>
where
    T: SubjectTokenProvider,
{
    subject_token_provider: T,
    sts: STSHandler,
    client: reqwest::Client,
    config: ExternalAccountConfig,
    quota_project_id: Option<String>,
}

#[derive(serde::Serialize)]
struct ImpersonationRequest<'a> {
    scope: &'a [String],
    lifetime: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImpersonationResponse {
    access_token: String,
    #[serde(with = "time::serde::rfc3339")]
    expire_time: OffsetDateTime,
}

impl<T> ExternalAccountCredentials<T>
where
    T: SubjectTokenProvider,
{
    async fn exchange(&self, scope: Vec<String>) -> Result<Token> {
        let subject_token = self.subject_token_provider.subject_token().await?;
        let req = ExchangeTokenRequest {
            url: self.config.token_url.clone(),
            authentication: ClientAuthentication {
                client_id: self.config.client_id.clone(),
                client_secret: self.config.client_secret.clone(),
            },
            subject_token,
            subject_token_type: self.config.subject_token_type.clone(),
            audience: Some(self.config.audience.clone()),
            scope,
        };
        let response = self.sts.exchange_token(req).await?;
        Ok(Token {
            token: response.access_token,
            token_type: response.token_type,
            expires_at: response
                .expires_in
                .map(|d| Instant::now() + Duration::from_secs(d)),
            metadata: None,
        })
    }

    async fn impersonate(&self, url: &str, source: Token) -> Result<Token> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&source.token)
            .json(&ImpersonationRequest {
                scope: &self.config.scopes,
                lifetime: IMPERSONATED_TOKEN_LIFETIME,
            })
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, IMPERSONATION_MSG))?;
        if !response.status().is_success() {
            return Err(errors::from_http_response(response, IMPERSONATION_MSG).await);
        }
        let response = response
            .json::<ImpersonationResponse>()
            .await
            .map_err(|e| CredentialsError::new(!e.is_decode(), e))?;
        let remaining = response.expire_time - OffsetDateTime::now_utc();
        let remaining = Duration::try_from(remaining).unwrap_or(Duration::ZERO);
        Ok(Token {
            token: response.access_token,
            token_type: "Bearer".to_string(),
            expires_at: Some(Instant::now() + remaining),
            metadata: None,
        })
    }
}

#[async_trait::async_trait]
impl<T> CredentialsProvider for ExternalAccountCredentials<T>
where
    T: SubjectTokenProvider,
{
    async fn token(&self) -> Result<Token> {
        match &self.config.service_account_impersonation_url {
            None => self.exchange(self.config.scopes.clone()).await,
            Some(url) => {
                // The federated token only needs to call the IAM credentials API.
                let source = self.exchange(vec![DEFAULT_SCOPE.to_string()]).await?;
                self.impersonate(url, source).await
            }
        }
    }

    fn quota_project_id(&self) -> Option<String> {
        self.quota_project_id.clone()
    }
}
