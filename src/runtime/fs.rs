//! File system reads.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn read_to_string_impl(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::{RealRuntime, Runtime};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_real_runtime_read_to_string() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.txt");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"Human: hi\nAssistant: hello")
            .unwrap();

        assert_eq!(
            runtime.read_to_string(&path).unwrap(),
            "Human: hi\nAssistant: hello"
        );
    }

    #[test]
    fn test_real_runtime_read_missing_file() {
        let runtime = RealRuntime;
        let result = runtime.read_to_string(std::path::Path::new("/nonexistent/path/file.txt"));

        let err = result.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/path/file.txt"));
    }
}
