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

//! Serve project-scoped access tokens.
//!
//! [AccessTokenService] resolves credential descriptors into credentials,
//! caches them, and keeps their tokens fresh. Both the blocking and the async
//! entry points share the same cache.
//!
//! # Example
//! ```no_run
//! # use google_cloud_vertex_auth::AccessTokenService;
//! # async fn sample() -> Result<(), google_cloud_vertex_auth::errors::AccessTokenError> {
//! let service = AccessTokenService::new();
//! let token = service
//!     .ensure_access_token_async(None, Some("my-project"), "vertex_ai")
//!     .await?;
//! println!("Authorization: Bearer ... for {}", token.project_id);
//! # Ok(()) }
//! ```

use crate::constants::GEMINI_PROVIDER;
use crate::credential_cache::{CacheEntry, CredentialCache};
use crate::descriptor::{CacheKey, CredentialDescriptor};
use crate::errors::AccessTokenError;
use crate::identity::{GoogleIdentityProvider, IdentityProvider};
use crate::refresher::TokenRefresher;
use crate::resolver::CredentialResolver;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

type Result<T> = std::result::Result<T, AccessTokenError>;

const BLOCKING_THREAD_NAME: &str = "vertex-auth-blocking";

/// A bearer token and the project it is valid for.
///
/// The default value, with empty strings, is returned for providers that do
/// not use Google Cloud IAM tokens.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AccessToken {
    /// The bearer token.
    pub token: String,
    /// The project the token serves.
    pub project_id: String,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[censored]")
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Resolves, caches, and refreshes credentials on behalf of API clients.
///
/// Clones share the cache. Credentials are cached per descriptor: two calls
/// with equal JSON descriptors, or the same file path, use the same
/// credentials and token.
///
/// Concurrent calls for the same descriptor are serialized. Only the first
/// one resolves or refreshes the credentials, the others reuse its result.
#[derive(Clone, Debug)]
pub struct AccessTokenService {
    inner: Arc<ServiceInner>,
}

#[derive(Debug)]
struct ServiceInner {
    resolver: CredentialResolver,
    refresher: TokenRefresher,
    cache: CredentialCache,
    passthrough_providers: HashSet<String>,
    runtime: BlockingRuntime,
}

impl Default for AccessTokenService {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessTokenService {
    /// Creates a service using [GoogleIdentityProvider].
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder to configure an [AccessTokenService].
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Returns a fresh access token and its project.
    ///
    /// `credentials` selects the credentials, `None` uses the ambient
    /// credentials of the environment. `project_id`, if set, must match the
    /// project the credentials are bound to.
    ///
    /// Calls for a passthrough `provider` (by default `"gemini"`) return
    /// [AccessToken::default()] without any I/O.
    ///
    /// # Errors
    ///
    /// See [AccessTokenError] for the possible failures. Failed resolutions
    /// are not cached, the next call tries again.
    pub async fn ensure_access_token_async(
        &self,
        credentials: Option<&CredentialDescriptor>,
        project_id: Option<&str>,
        provider: &str,
    ) -> Result<AccessToken> {
        if self.inner.passthrough_providers.contains(provider) {
            return Ok(AccessToken::default());
        }

        let key = CacheKey::new(credentials);
        let mut slot = self.inner.cache.lock(key.clone()).await;
        let entry = match &mut *slot {
            Some(entry) => {
                tracing::debug!(%key, "using cached credentials");
                entry
            }
            empty => {
                // The entry is shared by all callers, it only keeps the
                // project derived from the credentials.
                let (handle, resolved) = self.inner.resolver.resolve(credentials, None).await?;
                tracing::debug!(%key, project_id = ?resolved, "caching resolved credentials");
                empty.insert(CacheEntry {
                    handle,
                    project_id: resolved,
                })
            }
        };

        if let (Some(requested), Some(bound)) = (project_id, entry.handle.project_id()) {
            if requested != bound {
                return Err(AccessTokenError::project_mismatch(requested, bound));
            }
        }

        self.inner
            .refresher
            .ensure_fresh(&mut entry.handle)
            .await?;

        let project_id = project_id
            .map(str::to_string)
            .or_else(|| entry.project_id.clone())
            .ok_or_else(AccessTokenError::unresolved_project)?;
        Ok(AccessToken {
            token: entry.handle.token().to_string(),
            project_id,
        })
    }

    /// The blocking version of [ensure_access_token_async][Self::ensure_access_token_async].
    ///
    /// # Errors
    ///
    /// In addition to the errors of the async version, this function returns
    /// an error if called from within an async runtime.
    pub fn ensure_access_token(
        &self,
        credentials: Option<&CredentialDescriptor>,
        project_id: Option<&str>,
        provider: &str,
    ) -> Result<AccessToken> {
        if self.inner.passthrough_providers.contains(provider) {
            return Ok(AccessToken::default());
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(AccessTokenError::nested_runtime());
        }
        let runtime = self.inner.runtime.get()?;
        runtime.block_on(self.ensure_access_token_async(credentials, project_id, provider))
    }
}

/// A builder for [AccessTokenService].
#[derive(Debug)]
pub struct Builder {
    provider: Option<Arc<dyn IdentityProvider>>,
    passthrough_providers: HashSet<String>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            provider: None,
            passthrough_providers: HashSet::from([GEMINI_PROVIDER.to_string()]),
        }
    }
}

impl Builder {
    /// Sets the [IdentityProvider] used to create credentials.
    ///
    /// Defaults to [GoogleIdentityProvider::default()].
    pub fn with_identity_provider<T>(mut self, provider: T) -> Self
    where
        T: IdentityProvider + 'static,
    {
        self.provider = Some(Arc::new(provider));
        self
    }

    /// Replaces the providers served without an access token.
    ///
    /// Defaults to `["gemini"]`.
    pub fn with_passthrough_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passthrough_providers = providers.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Returns an [AccessTokenService] with the configured settings.
    pub fn build(self) -> AccessTokenService {
        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(GoogleIdentityProvider::default()));
        AccessTokenService {
            inner: Arc::new(ServiceInner {
                resolver: CredentialResolver::new(provider),
                refresher: TokenRefresher,
                cache: CredentialCache::default(),
                passthrough_providers: self.passthrough_providers,
                runtime: BlockingRuntime::default(),
            }),
        }
    }
}

/// The runtime behind the blocking entry point, started on first use.
#[derive(Debug, Default)]
struct BlockingRuntime(OnceLock<tokio::runtime::Runtime>);

impl BlockingRuntime {
    fn get(&self) -> Result<&tokio::runtime::Runtime> {
        if let Some(runtime) = self.0.get() {
            return Ok(runtime);
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(BLOCKING_THREAD_NAME)
            .enable_all()
            .build()
            .map_err(AccessTokenError::runtime_start)?;
        Ok(self.0.get_or_init(|| runtime))
    }
}

impl Drop for BlockingRuntime {
    // The service may be dropped inside an async context, where a runtime
    // cannot block on its shutdown.
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}
