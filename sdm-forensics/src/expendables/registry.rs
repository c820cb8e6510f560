// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeSet;
use std::sync::Arc;

use sdm_contracts::{ExpendableMatch, ExpendablesFilter, ProcessResult, StorageError};
use sdm_types::{AreaType, LocalPath, PkgId};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::Result;

/// Ordered filter list, gated by the enabled identifiers from settings
pub struct FilterRegistry {
    filters: Vec<Arc<dyn ExpendablesFilter>>,
    enabled: watch::Receiver<BTreeSet<String>>,
}

impl FilterRegistry {
    pub fn new(
        filters: Vec<Arc<dyn ExpendablesFilter>>,
        enabled: watch::Receiver<BTreeSet<String>>,
    ) -> Self {
        Self { filters, enabled }
    }

    pub fn identifiers(&self) -> Vec<&'static str> {
        self.filters.iter().map(|filter| filter.identifier()).collect()
    }

    /// Enabled filters in registration order, as of the latest settings
    pub fn enabled_filters(&self) -> Vec<Arc<dyn ExpendablesFilter>> {
        let enabled = self.enabled.borrow();
        self.filters
            .iter()
            .filter(|filter| enabled.contains(filter.identifier()))
            .cloned()
            .collect()
    }

    pub async fn initialize_enabled(&self) -> Result<()> {
        let filters = self.enabled_filters();
        for filter in &filters {
            filter.initialize().await?;
        }
        info!("Initialized {} expendables filters", filters.len());
        Ok(())
    }

    /// Identifiers of the enabled filters that consider `target` expendable
    pub async fn classify(
        &self,
        pkg_id: &PkgId,
        target: &LocalPath,
        area_type: AreaType,
        segments: &[String],
    ) -> Result<Vec<&'static str>> {
        let mut matched = Vec::new();
        for filter in self.enabled_filters() {
            if filter
                .is_expendable(pkg_id, target, area_type, segments)
                .await?
            {
                debug!("{} matched {} for {}", filter.identifier(), target, pkg_id);
                matched.push(filter.identifier());
            }
        }
        Ok(matched)
    }

    /// Hands the targets of one filter back to it for deletion
    pub async fn process(
        &self,
        identifier: &str,
        targets: &[ExpendableMatch],
        all_matches: &[ExpendableMatch],
    ) -> Result<ProcessResult> {
        let filter = self
            .filters
            .iter()
            .find(|filter| filter.identifier() == identifier)
            .ok_or_else(|| StorageError::not_found(format!("No filter named {identifier}")))?;
        Ok(filter.process(targets, all_matches).await?)
    }
}

#[cfg(test)]
mod tests {
    use sdm_types::segments::to_segs;

    use super::*;
    use crate::expendables::default_filters;
    use crate::testing::FakeGateway;

    fn registry(enabled: &[&str]) -> (FilterRegistry, watch::Sender<BTreeSet<String>>) {
        let (tx, rx) = watch::channel(enabled.iter().map(|id| id.to_string()).collect());
        let filters = default_filters(Arc::new(FakeGateway::default()));
        (FilterRegistry::new(filters, rx), tx)
    }

    #[test]
    fn filters_keep_their_order() {
        let (registry, _tx) = registry(&[]);
        assert_eq!(
            registry.identifiers(),
            vec!["hidden_caches", "advertisements", "whatsapp_sent"]
        );
        assert!(registry.enabled_filters().is_empty());
    }

    #[tokio::test]
    async fn classification_follows_settings() {
        let (registry, tx) = registry(&["hidden_caches"]);
        registry.initialize_enabled().await.expect("initialize");

        let pkg = PkgId::new("com.whatsapp");
        let raw = "WhatsApp/Media/WhatsApp Images/Sent/IMG-1.jpg";
        let target = LocalPath::new(format!("/storage/emulated/0/{raw}"));
        let segments = to_segs(raw);

        let matched = registry
            .classify(&pkg, &target, AreaType::Sdcard, &segments)
            .await
            .expect("classify");
        assert!(matched.is_empty());

        tx.send_replace(["hidden_caches", "whatsapp_sent"].map(String::from).into());
        let matched = registry
            .classify(&pkg, &target, AreaType::Sdcard, &segments)
            .await
            .expect("classify");
        assert_eq!(matched, vec!["whatsapp_sent"]);
    }

    #[tokio::test]
    async fn unknown_filters_are_rejected() {
        let (registry, _tx) = registry(&[]);
        assert!(registry.process("nope", &[], &[]).await.is_err());
        let result = registry
            .process("whatsapp_sent", &[], &[])
            .await
            .expect("process");
        assert!(result.success.is_empty());
    }
}
