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

//! Types and functions to work with Google Cloud authentication [Credentials].
//!
//! A [Credentials] value is an *unauthenticated* credential handle: it knows
//! how to obtain a token, and which project it is bound to, but it does not
//! cache anything. Caching and refreshing is the job of
//! [AccessTokenService](crate::service::AccessTokenService).
//!
//! [Credentials]: https://cloud.google.com/docs/authentication#credentials

pub mod external_account;
pub(crate) mod external_account_sources;
pub(crate) mod internal;
pub mod mds;
pub mod service_account;
pub(crate) mod subject_token;
pub mod user_account;

use crate::Result;
use crate::token::Token;
use std::sync::Arc;

/// An implementation of [crate::credentials::dynamic::CredentialsProvider].
///
/// Represents a [Credentials] used to obtain auth [Token][crate::token::Token]s
/// and the project identity bound to them.
///
/// # Notes
///
/// Application developers who directly use the auth SDK can use this trait,
/// along with [crate::credentials::Credentials::from()] to mock the credentials.
/// Application developers who use the access token service should implement
/// [IdentityProvider](crate::identity::IdentityProvider) instead.
///
/// [Credentials]: https://cloud.google.com/docs/authentication#credentials
#[derive(Clone, Debug)]
pub struct Credentials {
    inner: Arc<dyn dynamic::CredentialsProvider>,
}

impl<T> std::convert::From<T> for Credentials
where
    T: dynamic::CredentialsProvider + Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }
}

impl Credentials {
    /// Fetches a new token. Every call is a round-trip to the identity provider.
    pub async fn token(&self) -> Result<Token> {
        self.inner.token().await
    }

    /// The project these credentials are bound to, if known.
    pub fn project_id(&self) -> Option<String> {
        self.inner.project_id()
    }

    /// The [quota project] for these credentials, if any.
    ///
    /// [quota project]: https://cloud.google.com/docs/quotas/quota-project
    pub fn quota_project_id(&self) -> Option<String> {
        self.inner.quota_project_id()
    }
}

pub mod dynamic {
    use super::Result;
    use super::Token;

    /// A trait for credential types that can fetch access tokens.
    ///
    /// See [Credentials][super::Credentials] for more details.
    #[async_trait::async_trait]
    pub trait CredentialsProvider: Send + Sync + std::fmt::Debug {
        /// Fetches a new token from the identity provider.
        async fn token(&self) -> Result<Token>;

        /// The project the credentials are bound to.
        fn project_id(&self) -> Option<String> {
            None
        }

        /// The quota project associated with the credentials.
        fn quota_project_id(&self) -> Option<String> {
            None
        }
    }
}
