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

use crate::descriptor::{CredentialDescriptor, CredentialKind};
use crate::errors::AccessTokenError;
use crate::handle::CredentialHandle;
use crate::identity::IdentityProvider;
use std::sync::Arc;

/// Turns credential descriptors into ready-to-use [CredentialHandle]s.
#[derive(Clone, Debug)]
pub(crate) struct CredentialResolver {
    provider: Arc<dyn IdentityProvider>,
}

impl CredentialResolver {
    pub(crate) fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Creates the credentials for `descriptor` and fetches their first token.
    ///
    /// Returns the handle and the project it should serve: `hinted_project_id`
    /// if set, then the `project_id` in the descriptor, then the project of the
    /// credentials, then their quota project.
    pub(crate) async fn resolve(
        &self,
        descriptor: Option<&CredentialDescriptor>,
        hinted_project_id: Option<&str>,
    ) -> Result<(CredentialHandle, Option<String>), AccessTokenError> {
        let kind = CredentialKind::load(descriptor).await?;
        tracing::debug!(kind = kind.name(), "resolving credentials");

        let (credentials, ambient_project_id) = match &kind {
            CredentialKind::Ambient => self.provider.ambient_default().await?,
            CredentialKind::ServiceAccount(info) => {
                (self.provider.service_account_from_info(info)?, None)
            }
            CredentialKind::IdentityPool(info) => {
                (self.provider.identity_pool_from_info(info)?, None)
            }
            CredentialKind::Aws(info) => (self.provider.aws_from_info(info)?, None),
        };
        let bound_project_id = ambient_project_id.or_else(|| credentials.project_id());
        let mut handle = CredentialHandle::new(credentials, bound_project_id);
        handle.refresh().await?;

        let project_id = hinted_project_id
            .map(str::to_string)
            .or_else(|| kind.embedded_project_id())
            .or_else(|| handle.project_id().map(str::to_string))
            .or_else(|| handle.quota_project_id());
        Ok((handle, project_id))
    }
}
