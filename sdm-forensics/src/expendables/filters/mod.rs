// SPDX-License-Identifier: GPL-3.0-only

//! Built-in expendables filters

mod advertisement;
mod hidden;
mod whatsapp_sent;

use std::sync::Arc;

use sdm_contracts::{ExpendablesFilter, LocalGateway};

pub use advertisement::AdvertisementFilter;
pub use hidden::HiddenFilter;
pub use whatsapp_sent::WhatsAppSentFilter;

/// Names of an app's own cache directories, left to the system cache cleaner
const OWN_CACHE_DIRS: [&str; 1] = ["cache"];

const IGNORED_FILES: [&str; 1] = [".nomedia"];

fn is_ignored_file(lc_segments: &[String]) -> bool {
    lc_segments
        .last()
        .is_some_and(|name| IGNORED_FILES.contains(&name.as_str()))
}

/// `<pkg>/cache/..`, matched case-sensitively: differently cased variants are
/// not the system's and stay eligible
fn is_own_cache_dir(pkg_name: &str, segments: &[String]) -> bool {
    segments.len() >= 2 && segments[0] == pkg_name && OWN_CACHE_DIRS.contains(&segments[1].as_str())
}

/// Filters in the order they are consulted
pub fn default_filters(gateway: Arc<dyn LocalGateway>) -> Vec<Arc<dyn ExpendablesFilter>> {
    vec![
        Arc::new(HiddenFilter::new(gateway.clone())),
        Arc::new(AdvertisementFilter::new(gateway.clone())),
        Arc::new(WhatsAppSentFilter::new(gateway)),
    ]
}
