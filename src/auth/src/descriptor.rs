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

//! Describe which credentials to use.
//!
//! Callers of [AccessTokenService](crate::service::AccessTokenService) pass an
//! optional [CredentialDescriptor]. `None` means the ambient credentials of
//! the execution environment. Descriptors are classified once, at the
//! boundary, into a closed set of credential kinds.

use crate::BuildResult;
use crate::build_errors::Error as BuilderError;
use crate::credentials::external_account::is_aws_environment;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// The caller's description of the credentials to use.
///
/// The `Debug` output never includes the JSON contents, as they may hold
/// private keys.
#[derive(Clone, PartialEq)]
pub enum CredentialDescriptor {
    /// A credentials JSON object, e.g. a service account key.
    Json(Value),
    /// A file containing a credentials JSON object.
    Path(PathBuf),
}

impl CredentialDescriptor {
    /// Creates a descriptor from a string holding either a JSON object or a
    /// path to a credentials file.
    ///
    /// # Example
    /// ```
    /// # use google_cloud_vertex_auth::descriptor::CredentialDescriptor;
    /// let d = CredentialDescriptor::from_string(r#"{"type": "service_account"}"#);
    /// assert!(matches!(d, CredentialDescriptor::Json(_)));
    /// let d = CredentialDescriptor::from_string("/var/secrets/key.json");
    /// assert!(matches!(d, CredentialDescriptor::Path(_)));
    /// ```
    pub fn from_string<S: AsRef<str>>(value: S) -> Self {
        let value = value.as_ref();
        match serde_json::from_str::<Value>(value) {
            Ok(json @ Value::Object(_)) => Self::Json(json),
            _ => Self::Path(PathBuf::from(value)),
        }
    }
}

impl From<Value> for CredentialDescriptor {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<PathBuf> for CredentialDescriptor {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl std::fmt::Debug for CredentialDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(_) => f.debug_tuple("Json").field(&"[censored]").finish(),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

/// The identity of a descriptor in the credential cache.
///
/// JSON descriptors are keyed by content: equal values share a key no matter
/// where they came from. File descriptors are keyed by path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum CacheKey {
    Ambient,
    Json(String),
    Path(PathBuf),
}

impl CacheKey {
    pub(crate) fn new(descriptor: Option<&CredentialDescriptor>) -> Self {
        match descriptor {
            None => Self::Ambient,
            Some(CredentialDescriptor::Json(value)) => {
                let mut hasher = Sha256::new();
                hash_canonical(value, &mut hasher);
                Self::Json(hex::encode(hasher.finalize()))
            }
            Some(CredentialDescriptor::Path(path)) => Self::Path(path.clone()),
        }
    }
}

// Feeds the compact serialization of `value` to `hasher`, with the keys of
// every object in sorted order.
fn hash_canonical(value: &Value, hasher: &mut Sha256) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
            hasher.update(b"{");
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i != 0 {
                    hasher.update(b",");
                }
                hasher.update(Value::String(key.clone()).to_string().as_bytes());
                hasher.update(b":");
                hash_canonical(value, hasher);
            }
            hasher.update(b"}");
        }
        Value::Array(items) => {
            hasher.update(b"[");
            for (i, item) in items.iter().enumerate() {
                if i != 0 {
                    hasher.update(b",");
                }
                hash_canonical(item, hasher);
            }
            hasher.update(b"]");
        }
        scalar => hasher.update(scalar.to_string().as_bytes()),
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ambient => write!(f, "ambient-default"),
            Self::Json(digest) => write!(f, "json:{}", &digest[..12.min(digest.len())]),
            Self::Path(path) => write!(f, "path:{}", path.display()),
        }
    }
}

/// The closed set of credential sources.
#[derive(Clone, PartialEq)]
pub(crate) enum CredentialKind {
    Ambient,
    ServiceAccount(Value),
    IdentityPool(Value),
    Aws(Value),
}

impl CredentialKind {
    /// Loads (for file descriptors) and classifies a descriptor.
    pub(crate) async fn load(descriptor: Option<&CredentialDescriptor>) -> BuildResult<Self> {
        match descriptor {
            None => Ok(Self::Ambient),
            Some(CredentialDescriptor::Json(value)) => Self::classify(value.clone()),
            Some(CredentialDescriptor::Path(path)) => {
                let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
                    BuilderError::loading(format!("failed to read {}: {e}", path.display()))
                })?;
                let value =
                    serde_json::from_str::<Value>(&contents).map_err(BuilderError::parsing)?;
                Self::classify(value)
            }
        }
    }

    /// Classifies a credentials JSON object by its `type` field.
    pub(crate) fn classify(value: Value) -> BuildResult<Self> {
        let Value::Object(map) = &value else {
            return Err(BuilderError::parsing(
                "credentials must be a JSON object",
            ));
        };
        let Some(cred_type) = map.get("type").and_then(Value::as_str) else {
            return Err(BuilderError::missing_field("type"));
        };
        match cred_type {
            "external_account" if is_aws_environment(&value) => Ok(Self::Aws(value)),
            "external_account" => Ok(Self::IdentityPool(value)),
            _ => Ok(Self::ServiceAccount(value)),
        }
    }

    /// The `project_id` embedded in the descriptor, if any.
    pub(crate) fn embedded_project_id(&self) -> Option<String> {
        match self {
            Self::Ambient => None,
            Self::ServiceAccount(v) | Self::IdentityPool(v) | Self::Aws(v) => v
                .get("project_id")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Ambient => "ambient",
            Self::ServiceAccount(_) => "service_account",
            Self::IdentityPool(_) => "identity_pool",
            Self::Aws(_) => "aws",
        }
    }
}

impl std::fmt::Debug for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
