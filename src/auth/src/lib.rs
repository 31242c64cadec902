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

//! Vertex AI Client Libraries for Rust - Access Token Components
//!
//! **WARNING:** this crate is under active development. We expect multiple
//! breaking changes in the upcoming releases. We welcome feedback about the
//! APIs, documentation, missing features, bugs, etc.
//!
//! This crate resolves the credentials used by Vertex AI clients, and keeps
//! a fresh, project-scoped bearer token for each of them. The entry point is
//! [AccessTokenService]:
//!
//! - credentials are described by a [descriptor::CredentialDescriptor]: a
//!   service account key, a workload identity federation config (identity
//!   pools or AWS), a file containing either, or nothing at all to use the
//!   ambient credentials of the environment;
//! - the service caches the resolved credentials per descriptor, and refreshes
//!   their token shortly before it expires;
//! - a token is never returned for a project other than the one the
//!   credentials are bound to.
//!
//! The credentials themselves are created by an [identity::IdentityProvider].
//! The default, [identity::GoogleIdentityProvider], uses the credential types
//! in [credentials].
//!
//! [Authentication methods at Google] is a good introduction on the topic of
//! authentication for Google Cloud services. The guide also describes the
//! common terminology used with authentication, such as [Principals],
//! [Tokens], and [Credentials].
//!
//! [Authentication methods at Google]: https://cloud.google.com/docs/authentication
//! [Principals]: https://cloud.google.com/docs/authentication#principal
//! [Tokens]: https://cloud.google.com/docs/authentication#token
//! [Credentials]: https://cloud.google.com/docs/authentication#credentials

pub mod build_errors;
pub mod credentials;
pub mod descriptor;
pub mod errors;
pub mod handle;
pub mod identity;
pub mod service;
pub mod token;

pub(crate) mod constants;
mod credential_cache;
mod refresher;
mod resolver;

pub use service::{AccessToken, AccessTokenService};

/// A `Result` alias where the `Err` case is
/// `google_cloud_vertex_auth::errors::CredentialsError`.
pub(crate) type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;

/// A `Result` alias where the `Err` case is
/// `google_cloud_vertex_auth::build_errors::Error`.
pub(crate) type BuildResult<T> = std::result::Result<T, crate::build_errors::Error>;
