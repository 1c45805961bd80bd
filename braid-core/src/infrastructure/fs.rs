use crate::infrastructure::error::InfrastructureError;
use std::io::Write;
use std::path::Path;

/// Replace a persisted runner record atomically.
///
/// plan.json, gate results, deliverables manifests and the `latest`
/// indirection are always replaced whole, never patched in place:
/// 1. A temporary file is created in the target's own directory, so the
///    final rename cannot cross a filesystem boundary.
/// 2. The record bytes are written and synced to disk. Without the sync,
///    a crash after the rename could leave a truncated record behind the
///    new name.
/// 3. The temporary file is persisted (renamed) over the target.
///
/// Concurrent readers therefore observe either the previous record or the
/// complete new one. The deliverables `latest` pointer relies on this to
/// stay a valid run-directory reference at every instant.
pub fn atomic_write<P: AsRef<Path>, C: AsRef<[u8]>>(
    path: P,
    content: C,
) -> Result<(), InfrastructureError> {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(content.as_ref())?;

    // The rename is only an atomic replacement if the bytes reached disk first
    temp_file.as_file().sync_all()?;

    temp_file
        .persist(path)
        .map_err(|e| InfrastructureError::Io(e.error))?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_plan_record_lands_whole_with_no_temp_residue() -> Result<()> {
        let dir = tempdir()?;
        let plan_path = dir.path().join("plan.json");
        let canonical = "{\n  \"schemaVersion\": \"1.0.0\",\n  \"target\": \"main\"\n}\n";

        atomic_write(&plan_path, canonical)?;

        assert_eq!(fs::read_to_string(&plan_path)?, canonical);
        // The temp file was renamed, not left beside the record
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn test_latest_indirection_is_replaced_not_patched() -> Result<()> {
        let dir = tempdir()?;
        let latest = dir.path().join("latest");

        atomic_write(&latest, "weave-20260801T100000Z\n")?;
        atomic_write(&latest, "weave-20260801T110000Z\n")?;

        // A reader never sees a mix of the two run names
        assert_eq!(fs::read_to_string(&latest)?, "weave-20260801T110000Z\n");
        Ok(())
    }
}
