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

use crate::descriptor::CacheKey;
use crate::handle::CredentialHandle;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A resolved credential and the project it serves.
#[derive(Debug)]
pub(crate) struct CacheEntry {
    pub(crate) handle: CredentialHandle,
    pub(crate) project_id: Option<String>,
}

type Slot = Arc<AsyncMutex<Option<CacheEntry>>>;

/// Caches one [CacheEntry] per credential descriptor.
///
/// Each key owns a slot guarded by an async mutex. Holding the slot is what
/// makes resolution and refresh single-flight: late callers wait on the lock
/// and then find the entry installed by the first caller. Different keys
/// never wait on each other.
#[derive(Debug, Default)]
pub(crate) struct CredentialCache {
    // Only held to find or create a slot, never across an await point.
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl CredentialCache {
    /// Waits for exclusive access to the slot for `key`.
    ///
    /// The slot is empty until an entry is stored in it. Dropping the guard,
    /// including when the caller is cancelled, releases the slot.
    pub(crate) async fn lock(&self, key: CacheKey) -> OwnedMutexGuard<Option<CacheEntry>> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.entry(key).or_default().clone()
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;
    use crate::credentials::tests::MockCredentials;
    use std::path::PathBuf;
    use std::time::Duration;

    fn entry(project_id: &str) -> CacheEntry {
        let mut mock = MockCredentials::new();
        mock.expect_token().never();
        CacheEntry {
            handle: CredentialHandle::new(Credentials::from(mock), Some(project_id.to_string())),
            project_id: Some(project_id.to_string()),
        }
    }

    #[tokio::test]
    async fn empty_until_stored() {
        let cache = CredentialCache::default();
        let mut guard = cache.lock(CacheKey::Ambient).await;
        assert!(guard.is_none());
        *guard = Some(entry("test-project"));
        drop(guard);

        let guard = cache.lock(CacheKey::Ambient).await;
        let got = guard.as_ref().and_then(|e| e.project_id.as_deref());
        assert_eq!(got, Some("test-project"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let cache = CredentialCache::default();
        let mut ambient = cache.lock(CacheKey::Ambient).await;
        *ambient = Some(entry("ambient-project"));

        // Holding one slot does not block another.
        let path = CacheKey::Path(PathBuf::from("/path/to/key.json"));
        let other = tokio::time::timeout(Duration::from_secs(5), cache.lock(path)).await;
        let other = other.expect("a different key is not blocked");
        assert!(other.is_none());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn same_key_waits() {
        let cache = Arc::new(CredentialCache::default());
        let guard = cache.lock(CacheKey::Ambient).await;

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                let guard = cache.lock(CacheKey::Ambient).await;
                guard.as_ref().and_then(|e| e.project_id.clone())
            })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!waiter.is_finished());

        let mut guard = guard;
        *guard = Some(entry("test-project"));
        drop(guard);
        let got = waiter.await.expect("waiter does not panic");
        assert_eq!(got.as_deref(), Some("test-project"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_waiter_releases_nothing() {
        let cache = CredentialCache::default();
        let guard = cache.lock(CacheKey::Ambient).await;
        let got = tokio::time::timeout(Duration::from_secs(1), cache.lock(CacheKey::Ambient)).await;
        assert!(got.is_err());
        drop(guard);

        let got = tokio::time::timeout(Duration::from_secs(1), cache.lock(CacheKey::Ambient)).await;
        assert!(got.is_ok());
    }
}
