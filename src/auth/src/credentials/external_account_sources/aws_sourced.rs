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

//! Subject tokens for AWS workloads.
//!
//! The subject token is a serialized, [SigV4] signed `GetCallerIdentity`
//! request. The Security Token Service replays the request against AWS to
//! verify the identity of the caller.
//!
//! [SigV4]: https://docs.aws.amazon.com/IAM/latest/UserGuide/reference_sigv-create-signed-request.html

use crate::build_errors::Error as BuilderError;
use crate::credentials::subject_token::SubjectTokenProvider;
use crate::errors::{self, CredentialsError};
use crate::{BuildResult, Result};
use aws_config::environment::{
    EnvironmentVariableCredentialsProvider, EnvironmentVariableRegionProvider,
};
use aws_config::meta::region::ProvideRegion;
use aws_credential_types::Credentials;
use aws_credential_types::provider::ProvideCredentials;
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
use aws_sigv4::sign::v4;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::json;
use std::time::SystemTime;

const IMDSV2_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
const IMDSV2_TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
const IMDSV2_TTL_SECONDS: &str = "300";

const SIGNING_SERVICE: &str = "sts";
const TARGET_RESOURCE_HEADER: &str = "x-goog-cloud-target-resource";
const METADATA_PROVIDER_NAME: &str = "ExternalAccountMetadata";

const MSG: &str = "failed to fetch AWS metadata";

// Characters left alone when the signed request is serialized as a subject token.
const SUBJECT_TOKEN_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// The `credential_source` of an AWS external account configuration.
#[derive(Debug, Clone)]
pub(crate) struct AwsSourcedCredentials {
    pub client: reqwest::Client,
    pub region_url: Option<String>,
    pub url: Option<String>,
    pub regional_cred_verification_url: String,
    pub imdsv2_session_token_url: Option<String>,
    pub target_resource: String,
}

impl AwsSourcedCredentials {
    pub(crate) fn new(
        client: reqwest::Client,
        source: AwsCredentialSource,
        target_resource: String,
    ) -> BuildResult<Self> {
        match source.environment_id.strip_prefix("aws") {
            Some("1") => {}
            _ => {
                return Err(BuilderError::parsing(format!(
                    "unsupported AWS environment_id `{}`, only `aws1` is supported",
                    source.environment_id
                )));
            }
        }
        Ok(Self {
            client,
            region_url: source.region_url,
            url: source.url,
            regional_cred_verification_url: source.regional_cred_verification_url,
            imdsv2_session_token_url: source.imdsv2_session_token_url,
            target_resource,
        })
    }

    async fn imdsv2_session_token(&self) -> Result<Option<String>> {
        let Some(url) = &self.imdsv2_session_token_url else {
            return Ok(None);
        };
        let response = self
            .client
            .put(url.as_str())
            .header(IMDSV2_TTL_HEADER, IMDSV2_TTL_SECONDS)
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, MSG))?;
        if !response.status().is_success() {
            return Err(errors::from_http_response(response, MSG).await);
        }
        let token = response
            .text()
            .await
            .map_err(|e| CredentialsError::new(!e.is_decode(), e))?;
        Ok(Some(token))
    }

    async fn metadata_get(&self, url: &str, session: Option<&str>) -> Result<String> {
        let request = self.client.get(url);
        let request = match session {
            Some(token) => request.header(IMDSV2_TOKEN_HEADER, token),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, MSG))?;
        if !response.status().is_success() {
            return Err(errors::from_http_response(response, MSG).await);
        }
        response
            .text()
            .await
            .map_err(|e| CredentialsError::new(!e.is_decode(), e))
    }

    async fn metadata_region(&self, session: Option<&str>) -> Result<String> {
        let Some(url) = &self.region_url else {
            return Err(CredentialsError::non_retryable_from_str(
                "unable to determine the AWS region, set AWS_REGION or configure `region_url`",
            ));
        };
        // The metadata server returns the availability zone, e.g. `us-east-2b`.
        let zone = self.metadata_get(url, session).await?;
        let zone = zone.trim();
        let mut chars = zone.chars();
        chars.next_back();
        let region = chars.as_str();
        if region.is_empty() {
            return Err(CredentialsError::non_retryable_from_str(format!(
                "invalid AWS availability zone `{zone}`"
            )));
        }
        Ok(region.to_string())
    }

    async fn metadata_credentials(&self, session: Option<&str>) -> Result<Credentials> {
        let Some(url) = &self.url else {
            return Err(CredentialsError::non_retryable_from_str(
                "unable to determine the AWS security credentials, set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY or configure `url`",
            ));
        };
        let role = self.metadata_get(url, session).await?;
        let url = format!("{}/{}", url.trim_end_matches('/'), role.trim());
        let body = self.metadata_get(&url, session).await?;
        let response = serde_json::from_str::<MetadataCredentials>(&body)
            .map_err(CredentialsError::non_retryable)?;
        Ok(Credentials::new(
            response.access_key_id,
            response.secret_access_key,
            response.token,
            None,
            METADATA_PROVIDER_NAME,
        ))
    }
}

#[async_trait::async_trait]
impl SubjectTokenProvider for AwsSourcedCredentials {
    async fn subject_token(&self) -> Result<String> {
        let env_region = EnvironmentVariableRegionProvider::new()
            .region()
            .await
            .map(|region| region.to_string());
        let env_credentials = EnvironmentVariableCredentialsProvider::new()
            .provide_credentials()
            .await
            .inspect_err(|e| tracing::debug!("no AWS credentials in the environment: {e}"))
            .ok();

        let session = if env_region.is_none() || env_credentials.is_none() {
            self.imdsv2_session_token().await?
        } else {
            None
        };
        let region = match env_region {
            Some(region) => region,
            None => self.metadata_region(session.as_deref()).await?,
        };
        let credentials = match env_credentials {
            Some(credentials) => credentials,
            None => self.metadata_credentials(session.as_deref()).await?,
        };

        let url = self
            .regional_cred_verification_url
            .replace("{region}", &region);
        let headers = sign_caller_identity_request(
            &url,
            &region,
            credentials,
            &self.target_resource,
            SystemTime::now(),
        )?;
        Ok(serialize_subject_token(&url, headers))
    }
}

/// The AWS fields of an external account `credential_source`.
#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct AwsCredentialSource {
    pub environment_id: String,
    #[serde(default)]
    pub region_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub regional_cred_verification_url: String,
    #[serde(default)]
    pub imdsv2_session_token_url: Option<String>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetadataCredentials {
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    token: Option<String>,
}

/// Signs a `POST` request with an empty body to `url`, returning the request
/// headers sorted by name, including `authorization`.
pub(crate) fn sign_caller_identity_request(
    url: &str,
    region: &str,
    credentials: Credentials,
    target_resource: &str,
    time: SystemTime,
) -> Result<Vec<(String, String)>> {
    let parsed = reqwest::Url::parse(url).map_err(CredentialsError::non_retryable)?;
    let host = parsed.host_str().ok_or_else(|| {
        CredentialsError::non_retryable_from_str(format!("missing host in AWS URL `{url}`"))
    })?;
    let host = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let mut headers = vec![
        ("host".to_string(), host),
        (TARGET_RESOURCE_HEADER.to_string(), target_resource.to_string()),
    ];

    let identity = credentials.into();
    let params = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name(SIGNING_SERVICE)
        .time(time)
        .settings(SigningSettings::default())
        .build()
        .map_err(CredentialsError::non_retryable)?
        .into();
    let request = SignableRequest::new(
        "POST",
        url,
        headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        SignableBody::Bytes(&[]),
    )
    .map_err(CredentialsError::non_retryable)?;
    let (instructions, _signature) = sign(request, &params)
        .map_err(CredentialsError::non_retryable)?
        .into_parts();

    headers.extend(
        instructions
            .headers()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    );
    headers.sort();
    Ok(headers)
}

fn serialize_subject_token(url: &str, headers: Vec<(String, String)>) -> String {
    let headers: Vec<_> = headers
        .into_iter()
        .map(|(key, value)| json!({"key": key, "value": value}))
        .collect();
    let request = json!({
        "url": url,
        "method": "POST",
        "headers": headers,
    });
    utf8_percent_encode(&request.to_string(), SUBJECT_TOKEN_ENCODE).to_string()
}
