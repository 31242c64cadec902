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

use std::time::Duration;

pub(crate) const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Tokens are refreshed when they expire within this window.
pub(crate) const REFRESH_THRESHOLD: Duration = Duration::from_secs(3 * 60 + 45);

/// The provider served without any Google Cloud IAM token.
pub(crate) const GEMINI_PROVIDER: &str = "gemini";

pub(crate) const GOOGLE_APPLICATION_CREDENTIALS_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub(crate) const GOOGLE_CLOUD_PROJECT_VAR: &str = "GOOGLE_CLOUD_PROJECT";
pub(crate) const GCLOUD_PROJECT_VAR: &str = "GCLOUD_PROJECT";
pub(crate) const GOOGLE_CLOUD_QUOTA_PROJECT_VAR: &str = "GOOGLE_CLOUD_QUOTA_PROJECT";
pub(crate) const GCE_METADATA_HOST_VAR: &str = "GCE_METADATA_HOST";

pub(crate) const OAUTH2_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub(crate) const STS_TOKEN_URL: &str = "https://sts.googleapis.com/v1/token";

/// Token Exchange OAuth Grant Type
pub(crate) const TOKEN_EXCHANGE_GRANT_TYPE: &str =
    "urn:ietf:params:oauth:grant-type:token-exchange";
/// Refresh Token OAuth Grant Type
pub(crate) const REFRESH_TOKEN_GRANT_TYPE: &str = "refresh_token";
/// Access Token Oauth Token Type
pub(crate) const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
/// JWT OAuth Token Type
#[cfg(test)]
pub(crate) const JWT_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:jwt";
/// AWS4 request OAuth Token Type
#[cfg(test)]
pub(crate) const AWS4_REQUEST_TOKEN_TYPE: &str = "urn:ietf:params:aws:token-type:aws4_request";
