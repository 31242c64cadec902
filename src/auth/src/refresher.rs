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

use crate::Result;
use crate::handle::CredentialHandle;

/// Keeps a [CredentialHandle] fresh.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct TokenRefresher;

impl TokenRefresher {
    /// Refreshes `handle` if its token is missing or about to expire.
    ///
    /// Fresh handles are left alone, without any I/O. On failure the handle
    /// keeps its previous state, so the next call retries.
    pub(crate) async fn ensure_fresh(&self, handle: &mut CredentialHandle) -> Result<()> {
        if !handle.expired() {
            return Ok(());
        }
        tracing::debug!(project_id = ?handle.project_id(), "refreshing access token");
        handle.refresh().await.inspect_err(|e| {
            tracing::warn!(project_id = ?handle.project_id(), "access token refresh failed: {e}");
        })
    }
}
