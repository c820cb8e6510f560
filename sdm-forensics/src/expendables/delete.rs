// SPDX-License-Identifier: GPL-3.0-only

use sdm_contracts::{ExpendableMatch, LocalGateway, ProcessResult};
use sdm_types::GatewayMode;
use tracing::{debug, info, warn};

/// Targets without an ancestor among the other targets
fn distinct_roots(targets: &[ExpendableMatch]) -> Vec<&ExpendableMatch> {
    let mut roots: Vec<&ExpendableMatch> = Vec::new();
    for target in targets {
        let covered = targets
            .iter()
            .any(|other| other.path.is_ancestor_of(&target.path));
        let duplicate = roots.iter().any(|root| root.path == target.path);
        if !covered && !duplicate {
            roots.push(target);
        }
    }
    roots
}

/// Deletes `targets` and reports which of `all_matches` went with them
///
/// Only distinct roots are deleted. When a deletion fails the target is looked
/// up again: if it is gone it still counts as deleted. Matches below a deleted
/// root are reported as deleted; below a failed root only those that no
/// longer exist are.
pub async fn delete_all(
    targets: &[ExpendableMatch],
    gateway: &dyn LocalGateway,
    all_matches: &[ExpendableMatch],
) -> ProcessResult {
    let roots = distinct_roots(targets);
    if roots.len() != targets.len() {
        info!(
            "{} targets collapsed to {} distinct roots",
            targets.len(),
            roots.len()
        );
    }

    let mut result = ProcessResult::default();
    for root in roots {
        let deleted = match gateway.delete(&root.path, GatewayMode::Auto, true).await {
            Ok(()) => {
                debug!("Deleted {}", root.path);
                result.success.push(root.clone());
                true
            }
            Err(error) => match gateway.exists(&root.path, GatewayMode::Auto).await {
                Ok(false) => {
                    debug!("{} is gone despite: {}", root.path, error);
                    result.success.push(root.clone());
                    true
                }
                Ok(true) => {
                    warn!("Failed to delete {}: {}", root.path, error);
                    result.failed.push((root.clone(), error));
                    false
                }
                Err(lookup_error) => {
                    warn!(
                        "Failed to delete {}: {} (recheck failed: {})",
                        root.path, error, lookup_error
                    );
                    result.failed.push((root.clone(), error));
                    false
                }
            },
        };

        for affected in all_matches
            .iter()
            .filter(|other| root.path.is_ancestor_of(&other.path))
        {
            let gone = deleted
                || matches!(
                    gateway.exists(&affected.path, GatewayMode::Auto).await,
                    Ok(false)
                );
            if gone {
                result.success.push(affected.clone());
            }
        }
    }
    result
}
