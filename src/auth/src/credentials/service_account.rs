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

//! [Service Account] Credentials type.
//!
//! A service account is an account for an application or compute workload
//! instead of an individual end user. This module creates credentials from a
//! [service account key] and uses self-signed JWTs as bearer tokens, so no
//! round-trip to an authorization server is needed.
//!
//! [Service Account]: https://cloud.google.com/iam/docs/service-account-overview
//! [service account key]: https://cloud.google.com/iam/docs/keys-create-delete#creating

mod jws;

use crate::build_errors::Error as BuilderError;
use crate::constants::DEFAULT_SCOPE;
use crate::credentials::{Credentials, dynamic::CredentialsProvider};
use crate::errors::CredentialsError;
use crate::token::Token;
use crate::{BuildResult, Result};
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use jws::{CLOCK_SKEW_FUDGE, DEFAULT_TOKEN_TIMEOUT, JwsClaims, JwsHeader};
use rustls::crypto::{CryptoProvider, KeyProvider};
use rustls::sign::Signer;
use rustls_pki_types::{PrivateKeyDer, pem::PemObject};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::time::Instant;

/// A builder for service account [Credentials] instances.
///
/// # Example
/// ```
/// # use google_cloud_vertex_auth::credentials::service_account::Builder;
/// let key = serde_json::json!({
///     "client_email": "test-client-email",
///     "private_key_id": "test-private-key-id",
///     "private_key": "<YOUR_PKCS8_PEM_KEY_HERE>",
///     "project_id": "test-project-id",
/// });
/// let credentials = Builder::new(key)
///     .with_quota_project_id("my-quota-project")
///     .build();
/// assert!(credentials.is_ok());
/// ```
pub struct Builder {
    service_account_key: Value,
    scopes: Option<Vec<String>>,
    quota_project_id: Option<String>,
}

impl Builder {
    /// Creates a new builder using a [service account key] in JSON format.
    ///
    /// [service account key]: https://cloud.google.com/iam/docs/keys-create-delete#creating
    pub fn new(service_account_key: Value) -> Self {
        Self {
            service_account_key,
            scopes: None,
            quota_project_id: None,
        }
    }

    /// Overrides the [scopes] for these credentials.
    ///
    /// By default `https://www.googleapis.com/auth/cloud-platform` is used.
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

    /// Returns a [Credentials] instance with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns a parsing error if the key is missing required fields. The
    /// private key itself is only loaded when the first token is requested.
    pub fn build(self) -> BuildResult<Credentials> {
        let key = serde_json::from_value::<ServiceAccountKey>(self.service_account_key)
            .map_err(BuilderError::parsing)?;
        let scopes = self
            .scopes
            .filter(|s| !s.is_empty())
            .map(|s| s.join(" "))
            .unwrap_or_else(|| DEFAULT_SCOPE.to_string());
        let quota_project_id = self
            .quota_project_id
            .or_else(|| key.quota_project_id.clone());
        Ok(Credentials::from(ServiceAccountCredentials {
            key,
            scopes,
            quota_project_id,
        }))
    }
}

/// A representation of a [service account key] in the format described by [aip/4112].
///
/// [aip/4112]: https://google.aip.dev/auth/4112
/// [service account key]: https://cloud.google.com/iam/docs/keys-create-delete#creating
#[derive(serde::Deserialize, Clone)]
pub struct ServiceAccountKey {
    /// The client email address of the service account.
    pub client_email: String,
    /// ID of the service account's private key.
    #[serde(default)]
    pub private_key_id: Option<String>,
    /// The PEM-encoded private key associated with the service account.
    pub private_key: String,
    /// The project id the service account belongs to.
    #[serde(default)]
    pub project_id: Option<String>,
    /// The quota project, if the key file names one.
    #[serde(default)]
    pub quota_project_id: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"[censored]")
            .field("project_id", &self.project_id)
            .field("quota_project_id", &self.quota_project_id)
            .finish()
    }
}

#[derive(Debug)]
struct ServiceAccountCredentials {
    key: ServiceAccountKey,
    scopes: String,
    quota_project_id: Option<String>,
}

#[async_trait::async_trait]
impl CredentialsProvider for ServiceAccountCredentials {
    async fn token(&self) -> Result<Token> {
        let signer = signer(&self.key.private_key)?;

        let expires_at = Instant::now() - CLOCK_SKEW_FUDGE + DEFAULT_TOKEN_TIMEOUT;
        // The claims encode a unix timestamp. `Instant` has no epoch, so the
        // claims use `time::OffsetDateTime`, which reads system time.
        let now = OffsetDateTime::now_utc() - CLOCK_SKEW_FUDGE;
        let claims = JwsClaims {
            iss: &self.key.client_email,
            scope: Some(&self.scopes),
            aud: None,
            exp: now + DEFAULT_TOKEN_TIMEOUT,
            iat: now,
            sub: Some(&self.key.client_email),
        };
        let header = JwsHeader {
            alg: "RS256",
            typ: "JWT",
            kid: self.key.private_key_id.as_deref(),
        };
        let encoded = format!("{}.{}", header.encode()?, claims.encode()?);
        let sig = signer
            .sign(encoded.as_bytes())
            .map_err(CredentialsError::non_retryable)?;

        Ok(Token {
            token: format!("{encoded}.{}", BASE64_URL_SAFE_NO_PAD.encode(sig)),
            token_type: "Bearer".to_string(),
            expires_at: Some(expires_at),
            metadata: None,
        })
    }

    fn project_id(&self) -> Option<String> {
        self.key.project_id.clone()
    }

    fn quota_project_id(&self) -> Option<String> {
        self.quota_project_id.clone()
    }
}

// Creates a signer using the private key stored in the service account key.
fn signer(private_key: &str) -> Result<Box<dyn Signer>> {
    let key_provider = match CryptoProvider::get_default() {
        Some(p) => p.key_provider,
        None => fallback_key_provider()?,
    };
    let private_key = PrivateKeyDer::from_pem_slice(private_key.as_bytes()).map_err(|e| {
        CredentialsError::non_retryable_from_str(format!(
            "failed to parse private key in service account key: {e}"
        ))
    })?;
    let sk = key_provider
        .load_private_key(private_key)
        .map_err(CredentialsError::non_retryable)?;
    sk.choose_scheme(&[rustls::SignatureScheme::RSA_PKCS1_SHA256])
        .ok_or_else(|| {
            CredentialsError::non_retryable_from_str(
                "unable to choose RSA_PKCS1_SHA256 signing scheme as it is not supported by the current signer",
            )
        })
}

#[cfg(feature = "default-rustls-provider")]
fn fallback_key_provider() -> Result<&'static dyn KeyProvider> {
    Ok(rustls::crypto::aws_lc_rs::default_provider().key_provider)
}

#[cfg(not(feature = "default-rustls-provider"))]
fn fallback_key_provider() -> Result<&'static dyn KeyProvider> {
    Err(CredentialsError::non_retryable_from_str(
        "no rustls crypto provider is installed, call `rustls::crypto::CryptoProvider::install_default()`",
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rsa::RsaPrivateKey;
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::sha2::Sha256;
    use rsa::signature::Verifier;
    use serde_json::json;
    use std::sync::LazyLock;

    type TestResult = anyhow::Result<()>;

    // Generating RSA keys is slow, share one across the tests.
    static TEST_KEY: LazyLock<RsaPrivateKey> = LazyLock::new(|| {
        RsaPrivateKey::new(&mut rsa::rand_core::OsRng, 2048).expect("failed to generate a key")
    });

    pub(crate) fn pkcs8_pem() -> String {
        TEST_KEY
            .to_pkcs8_pem(LineEnding::LF)
            .expect("failed to encode key to PKCS#8 PEM")
            .to_string()
    }

    pub(crate) fn service_account_info() -> Value {
        json!({
            "type": "service_account",
            "client_email": "test-sa@test-project.iam.gserviceaccount.com",
            "private_key_id": "test-private-key-id",
            "private_key": pkcs8_pem(),
            "project_id": "test-project",
        })
    }

    fn b64_decode_to_json(s: &str) -> Value {
        let bytes = BASE64_URL_SAFE_NO_PAD.decode(s).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn debug_key() {
        let key = ServiceAccountKey {
            client_email: "test-client-email".to_string(),
            private_key_id: Some("test-private-key-id".to_string()),
            private_key: "super-duper-secret-private-key".to_string(),
            project_id: Some("test-project-id".to_string()),
            quota_project_id: None,
        };
        let fmt = format!("{key:?}");
        assert!(fmt.contains("test-client-email"), "{fmt}");
        assert!(fmt.contains("test-private-key-id"), "{fmt}");
        assert!(!fmt.contains("super-duper-secret-private-key"), "{fmt}");
        assert!(fmt.contains("test-project-id"), "{fmt}");
    }

    #[tokio::test]
    async fn token_is_signed_jwt() -> TestResult {
        let creds = Builder::new(service_account_info()).build()?;
        assert_eq!(creds.project_id().as_deref(), Some("test-project"));

        let token = creds.token().await?;
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expires_at.is_some(), "{token:?}");

        let parts: Vec<&str> = token.token.split('.').collect();
        assert_eq!(parts.len(), 3, "{}", token.token);
        let header = b64_decode_to_json(parts[0]);
        assert_eq!(header["alg"], "RS256");
        assert_eq!(header["typ"], "JWT");
        assert_eq!(header["kid"], "test-private-key-id");

        let claims = b64_decode_to_json(parts[1]);
        assert_eq!(claims["iss"], "test-sa@test-project.iam.gserviceaccount.com");
        assert_eq!(claims["sub"], "test-sa@test-project.iam.gserviceaccount.com");
        assert_eq!(claims["scope"], DEFAULT_SCOPE);
        assert!(claims["iat"].is_number(), "{claims:?}");
        assert!(claims["exp"].is_number(), "{claims:?}");

        let sig = BASE64_URL_SAFE_NO_PAD.decode(parts[2])?;
        let verifying_key = VerifyingKey::<Sha256>::new(TEST_KEY.to_public_key());
        let sig = Signature::try_from(sig.as_slice())?;
        verifying_key.verify(format!("{}.{}", parts[0], parts[1]).as_bytes(), &sig)?;
        Ok(())
    }

    #[tokio::test]
    async fn custom_scopes_and_quota_project() -> TestResult {
        let creds = Builder::new(service_account_info())
            .with_scopes(["scope1", "scope2"])
            .with_quota_project_id("test-quota-project")
            .build()?;
        assert_eq!(
            creds.quota_project_id().as_deref(),
            Some("test-quota-project")
        );
        let token = creds.token().await?;
        let claims = b64_decode_to_json(token.token.split('.').nth(1).unwrap());
        assert_eq!(claims["scope"], "scope1 scope2");
        Ok(())
    }

    #[test]
    fn missing_fields() {
        let err = Builder::new(json!({"type": "service_account"}))
            .build()
            .unwrap_err();
        assert!(err.is_parsing(), "{err:?}");
    }

    #[tokio::test]
    async fn invalid_private_key() -> TestResult {
        let mut info = service_account_info();
        info["private_key"] = json!("not-a-pem-key");
        let creds = Builder::new(info).build()?;
        let err = creds.token().await.unwrap_err();
        assert!(!err.is_retryable(), "{err:?}");
        assert!(
            err.to_string().contains("failed to parse private key"),
            "{err}"
        );
        Ok(())
    }
}
