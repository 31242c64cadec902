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

//! Errors returned while fetching tokens and while serving access tokens.

use crate::build_errors::Error as BuildError;
use http::StatusCode;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Represents an error fetching a token through a
/// [Credentials](crate::credentials::Credentials).
///
/// These errors are produced by the identity provider round-trips: exchanging
/// subject tokens, calling the metadata server, signing assertions, etc.
#[derive(Clone, Debug)]
pub struct CredentialsError {
    /// A boolean value indicating whether the error is retryable.
    ///
    /// If `true`, the operation that resulted in this error might succeed upon
    /// retry.
    is_retryable: bool,

    /// The underlying source of the error.
    source: CredentialsErrorImpl,
}

#[derive(Clone, Debug)]
enum CredentialsErrorImpl {
    SimpleMessage(String),
    Source(Arc<dyn Error + Send + Sync>),
}

impl CredentialsError {
    /// Creates a new `CredentialsError` wrapping `source`.
    pub fn new<T: Error + Send + Sync + 'static>(is_retryable: bool, source: T) -> Self {
        CredentialsError {
            is_retryable,
            source: CredentialsErrorImpl::Source(Arc::new(source)),
        }
    }

    /// Creates a new `CredentialsError` from a message.
    pub fn from_str<T: Into<String>>(is_retryable: bool, message: T) -> Self {
        CredentialsError {
            is_retryable,
            source: CredentialsErrorImpl::SimpleMessage(message.into()),
        }
    }

    /// Returns `true` if the error is retryable; otherwise returns `false`.
    pub fn is_retryable(&self) -> bool {
        self.is_retryable
    }

    pub(crate) fn retryable<T: Error + Send + Sync + 'static>(source: T) -> Self {
        CredentialsError::new(true, source)
    }

    pub(crate) fn retryable_from_str<T: Into<String>>(message: T) -> Self {
        CredentialsError::from_str(true, message)
    }

    pub(crate) fn non_retryable<T: Error + Send + Sync + 'static>(source: T) -> Self {
        CredentialsError::new(false, source)
    }

    pub(crate) fn non_retryable_from_str<T: Into<String>>(message: T) -> Self {
        CredentialsError::from_str(false, message)
    }
}

impl Error for CredentialsErrorImpl {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            CredentialsErrorImpl::SimpleMessage(_) => None,
            CredentialsErrorImpl::Source(source) => Some(source.as_ref()),
        }
    }
}

impl Display for CredentialsErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self {
            CredentialsErrorImpl::SimpleMessage(message) => write!(f, "{message}"),
            CredentialsErrorImpl::Source(source) => write!(f, "{source}"),
        }
    }
}

impl Error for CredentialsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.source()
    }
}

const RETRYABLE_MSG: &str = "but future attempts may succeed";
const NON_RETRYABLE_MSG: &str = "and future attempts will not succeed";

impl Display for CredentialsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let msg = if self.is_retryable {
            RETRYABLE_MSG
        } else {
            NON_RETRYABLE_MSG
        };
        write!(
            f,
            "cannot fetch access token, {}, source:{}",
            msg, self.source
        )
    }
}

pub(crate) fn is_retryable(c: StatusCode) -> bool {
    match c {
        // Internal server errors do not indicate that there is anything wrong
        // with our request, so we retry them.
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => true,
        _ => false,
    }
}

/// Maps a failed `send()` into a [CredentialsError].
pub(crate) fn from_http_error(err: reqwest::Error, msg: &str) -> CredentialsError {
    let retryable = err.is_timeout() || err.is_connect() || err.is_request();
    CredentialsError::from_str(retryable, format!("{msg}: {err}"))
}

/// Maps a non-success HTTP response into a [CredentialsError].
pub(crate) async fn from_http_response(response: reqwest::Response, msg: &str) -> CredentialsError {
    let status = response.status();
    let retryable = is_retryable(status);
    match response.text().await {
        Ok(body) => CredentialsError::from_str(
            retryable,
            format!("{msg}, status {status}, body=<{body}>"),
        ),
        Err(e) => CredentialsError::from_str(retryable, format!("{msg}, status {status}: {e}")),
    }
}

/// The error type returned by
/// [AccessTokenService](crate::service::AccessTokenService).
///
/// Use the predicates to tell the failure modes apart. All of them are
/// recoverable: the caller may retry with corrected input, or, for refresh
/// errors, simply retry.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct AccessTokenError(ErrorKind);

impl AccessTokenError {
    /// The credential descriptor is malformed or could not be loaded.
    pub fn is_construction(&self) -> bool {
        matches!(self.0, ErrorKind::Construction(_))
    }

    /// The identity provider failed to produce a token.
    pub fn is_refresh(&self) -> bool {
        matches!(self.0, ErrorKind::Refresh(_))
    }

    /// The requested project differs from the project the credential is bound to.
    pub fn is_project_mismatch(&self) -> bool {
        matches!(self.0, ErrorKind::ProjectMismatch { .. })
    }

    /// Neither the caller nor the credential provided a project id.
    pub fn is_unresolved_project(&self) -> bool {
        matches!(self.0, ErrorKind::UnresolvedProject)
    }

    /// The blocking entry point could not run.
    pub fn is_blocking_runtime(&self) -> bool {
        matches!(
            self.0,
            ErrorKind::NestedRuntime | ErrorKind::RuntimeStart(_)
        )
    }

    /// Returns `true` if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match &self.0 {
            ErrorKind::Refresh(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub(crate) fn project_mismatch<R, B>(requested: R, bound: B) -> Self
    where
        R: Into<String>,
        B: Into<String>,
    {
        Self(ErrorKind::ProjectMismatch {
            requested: requested.into(),
            bound: bound.into(),
        })
    }

    pub(crate) fn unresolved_project() -> Self {
        Self(ErrorKind::UnresolvedProject)
    }

    pub(crate) fn nested_runtime() -> Self {
        Self(ErrorKind::NestedRuntime)
    }

    pub(crate) fn runtime_start(source: std::io::Error) -> Self {
        Self(ErrorKind::RuntimeStart(source))
    }
}

impl From<BuildError> for AccessTokenError {
    fn from(value: BuildError) -> Self {
        Self(ErrorKind::Construction(value))
    }
}

impl From<CredentialsError> for AccessTokenError {
    fn from(value: CredentialsError) -> Self {
        Self(ErrorKind::Refresh(value))
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("cannot construct credentials: {0}")]
    Construction(#[source] BuildError),
    #[error(transparent)]
    Refresh(CredentialsError),
    #[error(
        "Could not resolve project_id. Credential project_id: {bound} does not match requested project_id: {requested}"
    )]
    ProjectMismatch { requested: String, bound: String },
    #[error(
        "Could not resolve project_id. Pass a project_id or use credentials bound to a project"
    )]
    UnresolvedProject,
    #[error(
        "the blocking entry point cannot run inside an async runtime, use ensure_access_token_async()"
    )]
    NestedRuntime,
    #[error("cannot start the runtime for blocking calls: {0}")]
    RuntimeStart(#[source] std::io::Error),
}
