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

//! Construct [Credentials] from credential descriptors.
//!
//! The [AccessTokenService](crate::service::AccessTokenService) never builds
//! credentials itself. It asks an [IdentityProvider], which makes it possible
//! to replace the identity provider in tests, or to plug in credentials from a
//! different SDK.
//!
//! [GoogleIdentityProvider] is the default implementation. It discovers
//! [Application Default Credentials] for the ambient case, and uses the types
//! in [crate::credentials] for explicit descriptors.
//!
//! [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials

use crate::BuildResult;
use crate::build_errors::Error as BuilderError;
use crate::constants::{
    GCLOUD_PROJECT_VAR, GOOGLE_APPLICATION_CREDENTIALS_VAR, GOOGLE_CLOUD_PROJECT_VAR,
    GOOGLE_CLOUD_QUOTA_PROJECT_VAR,
};
use crate::credentials::{Credentials, external_account, mds, service_account, user_account};
use serde_json::Value;
use std::path::PathBuf;

const WINDOWS_APPDATA_VAR: &str = "APPDATA";
const UNIX_HOME_VAR: &str = "HOME";
const ADC_FILE_NAME: &str = "application_default_credentials.json";

/// Creates [Credentials] for each kind of credential descriptor.
///
/// Constructors only parse their input. Network round-trips happen when the
/// service calls [Credentials::token].
#[async_trait::async_trait]
pub trait IdentityProvider: std::fmt::Debug + Send + Sync {
    /// Discovers the credentials of the execution environment, and the
    /// project they run in, if known.
    async fn ambient_default(&self) -> BuildResult<(Credentials, Option<String>)>;

    /// Creates credentials from a service account key, or any other
    /// credential JSON that is not an external account, such as
    /// `authorized_user` credentials.
    fn service_account_from_info(&self, info: &Value) -> BuildResult<Credentials>;

    /// Creates workload identity federation credentials for OIDC, Azure, and
    /// other identity pools.
    fn identity_pool_from_info(&self, info: &Value) -> BuildResult<Credentials>;

    /// Creates workload identity federation credentials for AWS.
    fn aws_from_info(&self, info: &Value) -> BuildResult<Credentials>;
}

/// The default [IdentityProvider], backed by Google Cloud authentication.
///
/// # Example
/// ```
/// # use google_cloud_vertex_auth::identity::GoogleIdentityProvider;
/// let provider = GoogleIdentityProvider::builder()
///     .with_scopes(["https://www.googleapis.com/auth/cloud-platform"])
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct GoogleIdentityProvider {
    scopes: Option<Vec<String>>,
    client: reqwest::Client,
    metadata_endpoint: Option<String>,
}

impl Default for GoogleIdentityProvider {
    fn default() -> Self {
        Builder::default().build()
    }
}

impl GoogleIdentityProvider {
    /// Returns a builder to configure a [GoogleIdentityProvider].
    pub fn builder() -> Builder {
        Builder::default()
    }

    fn metadata_endpoint(&self) -> String {
        self.metadata_endpoint
            .clone()
            .unwrap_or_else(mds::default_endpoint)
    }

    fn from_adc_json(&self, json: Value, quota_project_id: Option<String>) -> BuildResult<Credentials> {
        let cred_type = json
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| BuilderError::missing_field("type"))?
            .to_string();
        match cred_type.as_str() {
            "service_account" => {
                let builder = service_account::Builder::new(json);
                let builder = match &self.scopes {
                    Some(scopes) => builder.with_scopes(scopes.clone()),
                    None => builder,
                };
                match quota_project_id {
                    Some(q) => builder.with_quota_project_id(q),
                    None => builder,
                }
                .build()
            }
            "authorized_user" => {
                let builder = user_account::Builder::new(json).with_client(self.client.clone());
                let builder = match &self.scopes {
                    Some(scopes) => builder.with_scopes(scopes.clone()),
                    None => builder,
                };
                match quota_project_id {
                    Some(q) => builder.with_quota_project_id(q),
                    None => builder,
                }
                .build()
            }
            "external_account" => {
                let builder = self.external_account(json);
                match quota_project_id {
                    Some(q) => builder.with_quota_project_id(q),
                    None => builder,
                }
                .build()
            }
            _ => Err(BuilderError::unknown_type(format!(
                "`{cred_type}` credentials are not supported"
            ))),
        }
    }

    fn mds_credentials(&self, quota_project_id: Option<String>) -> Credentials {
        let builder = mds::Builder::default()
            .with_endpoint(self.metadata_endpoint())
            .with_client(self.client.clone());
        let builder = match &self.scopes {
            Some(scopes) => builder.with_scopes(scopes.clone()),
            None => builder,
        };
        match quota_project_id {
            Some(q) => builder.with_quota_project_id(q),
            None => builder,
        }
        .build()
    }

    fn external_account(&self, info: Value) -> external_account::Builder {
        let builder = external_account::Builder::new(info).with_client(self.client.clone());
        match &self.scopes {
            Some(scopes) => builder.with_scopes(scopes.clone()),
            None => builder,
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    async fn ambient_default(&self) -> BuildResult<(Credentials, Option<String>)> {
        let quota_project_id = non_empty_var(GOOGLE_CLOUD_QUOTA_PROJECT_VAR);
        let (credentials, on_metadata_server) = match adc_path() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading application default credentials");
                let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
                    BuilderError::loading(format!("failed to read {}: {e}", path.display()))
                })?;
                let json = serde_json::from_str::<Value>(&contents).map_err(BuilderError::parsing)?;
                (self.from_adc_json(json, quota_project_id)?, false)
            }
            None => {
                tracing::debug!("using the metadata server for application default credentials");
                (self.mds_credentials(quota_project_id), true)
            }
        };

        let project_id = match project_from_env().or_else(|| credentials.project_id()) {
            Some(p) => Some(p),
            None if on_metadata_server => {
                mds::project_id(&self.client, &self.metadata_endpoint())
                    .await
                    .inspect_err(|e| tracing::debug!("no project id from the metadata server: {e}"))
                    .ok()
            }
            None => None,
        };
        Ok((credentials, project_id))
    }

    fn service_account_from_info(&self, info: &Value) -> BuildResult<Credentials> {
        self.from_adc_json(info.clone(), None)
    }

    fn identity_pool_from_info(&self, info: &Value) -> BuildResult<Credentials> {
        self.external_account(info.clone()).build_identity_pool()
    }

    fn aws_from_info(&self, info: &Value) -> BuildResult<Credentials> {
        self.external_account(info.clone()).build_aws()
    }
}

/// A builder for [GoogleIdentityProvider].
#[derive(Debug, Default)]
pub struct Builder {
    scopes: Option<Vec<String>>,
    client: Option<reqwest::Client>,
    metadata_endpoint: Option<String>,
}

impl Builder {
    /// Sets the [scopes] requested for all credentials.
    ///
    /// If unset, each credential type uses its default, typically
    /// `https://www.googleapis.com/auth/cloud-platform`.
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

    /// Sets the HTTP client shared by all credentials.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Overrides the metadata server root.
    ///
    /// If unset, uses `GCE_METADATA_HOST` or `http://metadata.google.internal`.
    pub fn with_metadata_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.metadata_endpoint = Some(endpoint.into());
        self
    }

    /// Returns a [GoogleIdentityProvider] with the configured settings.
    pub fn build(self) -> GoogleIdentityProvider {
        GoogleIdentityProvider {
            scopes: self.scopes.filter(|s| !s.is_empty()),
            client: self.client.unwrap_or_default(),
            metadata_endpoint: self.metadata_endpoint,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn project_from_env() -> Option<String> {
    non_empty_var(GOOGLE_CLOUD_PROJECT_VAR).or_else(|| non_empty_var(GCLOUD_PROJECT_VAR))
}

/// The credentials file to use, or `None` to use the metadata server.
fn adc_path() -> Option<PathBuf> {
    if let Some(path) = non_empty_var(GOOGLE_APPLICATION_CREDENTIALS_VAR) {
        return Some(PathBuf::from(path));
    }
    well_known_path().filter(|p| p.is_file())
}

/// The path where `gcloud auth application-default login` saves credentials.
fn well_known_path() -> Option<PathBuf> {
    if cfg!(windows) {
        non_empty_var(WINDOWS_APPDATA_VAR)
            .map(|appdata| PathBuf::from(appdata).join("gcloud").join(ADC_FILE_NAME))
    } else {
        non_empty_var(UNIX_HOME_VAR).map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("gcloud")
                .join(ADC_FILE_NAME)
        })
    }
}
