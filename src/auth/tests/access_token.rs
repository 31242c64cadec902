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

use google_cloud_vertex_auth::descriptor::CredentialDescriptor;
use google_cloud_vertex_auth::identity::GoogleIdentityProvider;
use google_cloud_vertex_auth::{AccessToken, AccessTokenService};
use serde_json::{Value, json};

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use scoped_env::ScopedEnv;
    use std::io::Write;
    use std::sync::LazyLock;

    type TestResult = anyhow::Result<()>;

    static PRIVATE_KEY: LazyLock<String> = LazyLock::new(|| {
        let key = RsaPrivateKey::new(&mut rsa::rand_core::OsRng, 2048)
            .expect("failed to generate a key");
        key.to_pkcs8_pem(LineEnding::LF)
            .expect("failed to encode key to PKCS#8 PEM")
            .to_string()
    });

    fn service_account_key() -> Value {
        json!({
            "type": "service_account",
            "client_email": "test-sa@test-project.iam.gserviceaccount.com",
            "private_key_id": "test-private-key-id",
            "private_key": PRIVATE_KEY.as_str(),
            "project_id": "test-project",
        })
    }

    fn sts_response(token: &str) -> Value {
        json!({
            "access_token": token,
            "issued_token_type": "urn:ietf:params:oauth:token-type:access_token",
            "token_type": "Bearer",
            "expires_in": 3600,
        })
    }

    #[tokio::test]
    async fn gemini_is_passthrough() -> TestResult {
        let service = AccessTokenService::new();
        let got = service
            .ensure_access_token_async(None, None, "gemini")
            .await?;
        assert_eq!(got, AccessToken::default());

        let descriptor = CredentialDescriptor::from(json!({"no": "type"}));
        let got = service
            .ensure_access_token_async(Some(&descriptor), Some("any-project"), "gemini")
            .await?;
        assert_eq!(got, AccessToken::default());
        Ok(())
    }

    #[tokio::test]
    async fn authorized_user() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/token"))
                .times(1)
                .respond_with(json_encoded(json!({
                    "access_token": "user-token",
                    "expires_in": 3600,
                    "token_type": "Bearer",
                }))),
        );
        let service = AccessTokenService::new();
        let descriptor = CredentialDescriptor::from(json!({
            "type": "authorized_user",
            "client_id": "test-client-id",
            "client_secret": "test-client-secret",
            "refresh_token": "test-refresh-token",
            "token_uri": server.url_str("/token"),
            "quota_project_id": "user-quota-project",
        }));

        let got = service
            .ensure_access_token_async(Some(&descriptor), None, "vertex_ai")
            .await?;
        assert_eq!(got.token, "user-token");
        assert_eq!(got.project_id, "user-quota-project");
        Ok(())
    }

    #[tokio::test]
    async fn service_account() -> TestResult {
        let service = AccessTokenService::new();
        let descriptor = CredentialDescriptor::from(service_account_key());

        let got = service
            .ensure_access_token_async(Some(&descriptor), Some("test-project"), "vertex_ai")
            .await?;
        assert_eq!(got.project_id, "test-project");
        assert_eq!(got.token.split('.').count(), 3, "{got:?}");

        // The token is cached.
        let again = service
            .ensure_access_token_async(Some(&descriptor), None, "vertex_ai")
            .await?;
        assert_eq!(got, again);

        let err = service
            .ensure_access_token_async(Some(&descriptor), Some("other-project"), "vertex_ai")
            .await
            .unwrap_err();
        assert!(err.is_project_mismatch(), "{err:?}");
        assert!(
            err.to_string().starts_with("Could not resolve project_id"),
            "{err}"
        );
        Ok(())
    }

    #[test]
    fn service_account_blocking() -> TestResult {
        let service = AccessTokenService::new();
        let descriptor = CredentialDescriptor::from(service_account_key());

        let got = service.ensure_access_token(Some(&descriptor), None, "vertex_ai")?;
        assert_eq!(got.project_id, "test-project");
        let again = service.ensure_access_token(Some(&descriptor), None, "vertex_ai")?;
        assert_eq!(got, again);
        Ok(())
    }

    #[tokio::test]
    async fn service_account_file() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(service_account_key().to_string().as_bytes())?;
        let path = file.path().to_str().expect("temporary paths are UTF-8");

        let service = AccessTokenService::new();
        let descriptor = CredentialDescriptor::from_string(path);
        assert!(matches!(descriptor, CredentialDescriptor::Path(_)), "{descriptor:?}");
        let got = service
            .ensure_access_token_async(Some(&descriptor), None, "vertex_ai")
            .await?;
        assert_eq!(got.project_id, "test-project");

        let missing = CredentialDescriptor::from_string("/this/file/does/not/exist.json");
        let err = service
            .ensure_access_token_async(Some(&missing), None, "vertex_ai")
            .await
            .unwrap_err();
        assert!(err.is_construction(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn identity_pool_file_source() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/v1/token"),
                request::body(url_decoded(contains(("subject_token", "test-subject-token")))),
                request::body(url_decoded(contains((
                    "subject_token_type",
                    "urn:ietf:params:oauth:token-type:jwt"
                )))),
                request::body(url_decoded(contains(("audience", "test-audience")))),
            ])
            .times(1)
            .respond_with(json_encoded(sts_response("sts-token"))),
        );

        let mut subject = tempfile::NamedTempFile::new()?;
        subject.write_all(b"test-subject-token")?;
        let config = json!({
            "type": "external_account",
            "audience": "test-audience",
            "subject_token_type": "urn:ietf:params:oauth:token-type:jwt",
            "token_url": server.url_str("/v1/token"),
            "credential_source": {"file": subject.path()},
        });

        let service = AccessTokenService::new();
        let descriptor = CredentialDescriptor::from(config);
        for _ in 0..3 {
            let got = service
                .ensure_access_token_async(Some(&descriptor), Some("wif-project"), "vertex_ai")
                .await?;
            assert_eq!(got.token, "sts-token");
            assert_eq!(got.project_id, "wif-project");
        }
        Ok(())
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn aws_env_source() -> TestResult {
        let _region = ScopedEnv::set("AWS_REGION", "us-east-2");
        let _key = ScopedEnv::set("AWS_ACCESS_KEY_ID", "test-access-key-id");
        let _secret = ScopedEnv::set("AWS_SECRET_ACCESS_KEY", "test-secret-access-key");
        let _session = ScopedEnv::remove("AWS_SESSION_TOKEN");

        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/v1/token"),
                request::body(url_decoded(contains((
                    "subject_token_type",
                    "urn:ietf:params:aws:token-type:aws4_request"
                )))),
                request::body(url_decoded(contains(("subject_token", matches("GetCallerIdentity"))))),
            ])
            .times(1)
            .respond_with(json_encoded(sts_response("aws-sts-token"))),
        );

        let config = json!({
            "type": "external_account",
            "audience": "//iam.googleapis.com/projects/123/locations/global/workloadIdentityPools/pool/providers/aws",
            "subject_token_type": "urn:ietf:params:aws:token-type:aws4_request",
            "token_url": server.url_str("/v1/token"),
            "credential_source": {
                "environment_id": "aws1",
                "regional_cred_verification_url": "https://sts.{region}.amazonaws.com?Action=GetCallerIdentity&Version=2011-06-15",
            },
        });

        let service = AccessTokenService::new();
        let descriptor = CredentialDescriptor::from(config);
        let got = service
            .ensure_access_token_async(Some(&descriptor), Some("aws-project"), "vertex_ai")
            .await?;
        assert_eq!(got.token, "aws-sts-token");
        assert_eq!(got.project_id, "aws-project");
        Ok(())
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn ambient_credentials_file() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(service_account_key().to_string().as_bytes())?;
        let _adc = ScopedEnv::set(
            "GOOGLE_APPLICATION_CREDENTIALS",
            file.path().to_str().expect("temporary paths are UTF-8"),
        );
        let _project = ScopedEnv::remove("GOOGLE_CLOUD_PROJECT");
        let _gcloud = ScopedEnv::remove("GCLOUD_PROJECT");

        let service = AccessTokenService::builder()
            .with_identity_provider(GoogleIdentityProvider::default())
            .build();
        let got = service
            .ensure_access_token_async(None, None, "vertex_ai")
            .await?;
        assert_eq!(got.project_id, "test-project");

        let err = service
            .ensure_access_token_async(None, Some("other-project"), "vertex_ai")
            .await
            .unwrap_err();
        assert!(err.is_project_mismatch(), "{err:?}");
        Ok(())
    }
}
