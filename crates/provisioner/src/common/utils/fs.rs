use std::path::{Path, PathBuf};

pub fn absolute_path(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        match std::env::current_dir() {
            Ok(dir) => dir.join(path),
            Err(_) => path,
        }
    }
}

/// Writes `content` into `path` through a temporary sibling file, so that a crash in the middle
/// of the write never leaves a truncated file behind.
pub fn write_atomically(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::{absolute_path, write_atomically};
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn absolute_path_keeps_absolute() {
        let path = PathBuf::from("/tmp/report.json");
        assert_eq!(absolute_path(path.clone()), path);
    }

    #[test]
    fn absolute_path_resolves_relative() {
        assert!(absolute_path(PathBuf::from("report.json")).is_absolute());
    }

    #[test]
    fn write_atomically_replaces_content() {
        let dir = TempDir::with_prefix("provisioner").unwrap();
        let path = dir.path().join("report.json");
        write_atomically(&path, b"first").unwrap();
        write_atomically(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!dir.path().join("report.json.tmp").exists());
    }
}
