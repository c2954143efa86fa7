use std::path::Path;

use crate::common::utils::fs::write_atomically;
use crate::provision::api::ResourceId;
use crate::provision::result::ProvisioningResult;

/// Stores results of a provisioning run, so that a later cleanup can find the acquired resources.
pub fn save_report(path: &Path, results: &[ProvisioningResult]) -> crate::Result<()> {
    let content = serde_json::to_vec_pretty(results)?;
    write_atomically(path, &content)?;
    log::debug!("Report with {} result(s) written to {}", results.len(), path.display());
    Ok(())
}

/// Loads a report written by [`save_report`]. Returns `None` when the file does not exist.
pub fn load_report(path: &Path) -> crate::Result<Option<Vec<ProvisioningResult>>> {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    Ok(Some(serde_json::from_slice(&content)?))
}

/// Ids of resources that were successfully acquired. Failed entries are skipped.
pub fn cleanup_candidates(results: &[ProvisioningResult]) -> Vec<ResourceId> {
    results
        .iter()
        .filter_map(|result| result.resource_id())
        .map(|id| id.to_string())
        .collect()
}
