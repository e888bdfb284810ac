use std::path::PathBuf;

/// Returns the workspace root (the parent of the calling crate's manifest dir).
fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .map(PathBuf::from)
        .unwrap_or(manifest_dir)
}

/// Returns a fresh directory under `test_output/` for one test.
///
/// Any leftovers from a previous run of the same test are removed first.
pub fn test_output_dir(name: &str) -> PathBuf {
    let dir = workspace_root().join("test_output").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir)
        .unwrap_or_else(|e| panic!("Failed to create test output dir {}: {e}", dir.display()));
    dir
}

/// Returns the path to a test output file, creating `test_output/` if needed.
pub fn test_output_path(name: &str) -> PathBuf {
    let dir = workspace_root().join("test_output");
    std::fs::create_dir_all(&dir)
        .unwrap_or_else(|e| panic!("Failed to create test_output directory: {e}"));
    dir.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_dir_is_empty_and_reusable() {
        let dir = test_output_dir("common_output_dir_reuse");
        std::fs::write(dir.join("marker.txt"), b"x").unwrap();

        let again = test_output_dir("common_output_dir_reuse");
        assert_eq!(dir, again);
        assert!(std::fs::read_dir(&again).unwrap().next().is_none());
    }
}
