// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use sdm_types::StorageArea;

use crate::StorageError;

/// One contributor to storage-area discovery
///
/// First pass modules discover areas knowable from platform information or
/// fixed paths. Second pass modules derive areas relative to the first pass
/// results and usually need privileged probing; without root they return an
/// empty set instead of failing.
#[async_trait]
pub trait DataAreaModule: Send + Sync {
    fn name(&self) -> &'static str;

    async fn first_pass(&self) -> Result<Vec<StorageArea>, StorageError> {
        Ok(Vec::new())
    }

    async fn second_pass(
        &self,
        _first_pass: &[StorageArea],
    ) -> Result<Vec<StorageArea>, StorageError> {
        Ok(Vec::new())
    }
}
