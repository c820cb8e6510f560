// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{ExpendableMatch, ExpendablesFilter, LocalGateway, ProcessResult, StorageError};
use sdm_types::{AreaType, LocalPath, PkgId};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::expendables::criteria::{
    Criterium, NameCriterium, NameMode, SegmentCriterium, SegmentMode,
};
use crate::expendables::delete::delete_all;
use crate::expendables::sieve::{DynamicAppSieve, MatchConfig};

const APPS: [(&str, &str); 2] = [
    ("com.whatsapp", "WhatsApp"),
    ("com.whatsapp.w4b", "WhatsApp Business"),
];

const MEDIA_KINDS: [&str; 5] = ["Video", "Animated Gifs", "Images", "Audio", "Documents"];

fn match_configs() -> Vec<MatchConfig> {
    let mut configs = Vec::new();
    for (pkg, name) in APPS {
        let layouts = [
            (AreaType::Sdcard, name.to_string()),
            (AreaType::PublicMedia, format!("{pkg}/{name}")),
        ];
        for (area_type, base) in layouts {
            let criteria: Vec<Criterium> = MEDIA_KINDS
                .iter()
                .map(|kind| {
                    SegmentCriterium::new(
                        &format!("{base}/Media/{name} {kind}/Sent"),
                        SegmentMode::ancestor(),
                    )
                    .into()
                })
                .collect();
            configs.push(MatchConfig {
                pkg_names: Some([PkgId::new(pkg)].into()),
                area_types: Some([area_type].into()),
                pfp_criteria: Some(criteria),
                pfp_exclusions: Some(vec![NameCriterium::new(".nomedia", NameMode::Equal).into()]),
                pfp_regexes: None,
            });
        }
    }
    configs
}

/// Copies of media the user sent through WhatsApp
pub struct WhatsAppSentFilter {
    gateway: Arc<dyn LocalGateway>,
    sieve: OnceCell<DynamicAppSieve>,
}

impl WhatsAppSentFilter {
    pub fn new(gateway: Arc<dyn LocalGateway>) -> Self {
        Self {
            gateway,
            sieve: OnceCell::new(),
        }
    }

    async fn sieve(&self) -> Result<&DynamicAppSieve, StorageError> {
        Ok(self
            .sieve
            .get_or_try_init(|| async { DynamicAppSieve::new(match_configs()) })
            .await?)
    }
}

#[async_trait]
impl ExpendablesFilter for WhatsAppSentFilter {
    fn identifier(&self) -> &'static str {
        "whatsapp_sent"
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        debug!("Initializing {}", self.identifier());
        self.sieve().await.map(|_| ())
    }

    async fn is_expendable(
        &self,
        pkg_id: &PkgId,
        _target: &LocalPath,
        area_type: AreaType,
        segments: &[String],
    ) -> Result<bool, StorageError> {
        Ok(!segments.is_empty() && self.sieve().await?.matches(pkg_id, area_type, segments))
    }

    async fn process(
        &self,
        targets: &[ExpendableMatch],
        all_matches: &[ExpendableMatch],
    ) -> Result<ProcessResult, StorageError> {
        Ok(delete_all(targets, self.gateway.as_ref(), all_matches).await)
    }
}
