//! Sidecar JSON: task-table data loaded once at startup.

use crate::error::AppError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SidecarTask {
    pub pid: u64,
    pub tid: u64,
    pub comm: String,
    pub registers: HashMap<String, u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SidecarData {
    /// Process mode only: kernel-virtual address of the process's root page table.
    #[serde(default)]
    pub rootpgt: Option<u64>,
    /// Process mode only.
    #[serde(default)]
    pub loadaddr: Option<u64>,
    #[serde(default)]
    pub threads: Vec<SidecarTask>,
}

pub fn load(path: &Path) -> Result<SidecarData, AppError> {
    let text = std::fs::read_to_string(path).map_err(|source| AppError::SidecarIo {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| AppError::SidecarJson {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_process_mode_sidecar() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"rootpgt": 4096, "loadaddr": 65536, "threads": [
                {{"pid": 100, "tid": 100, "comm": "init", "registers": {{"pc": 1}}}}
            ]}}"#
        )
        .unwrap();
        let data = load(f.path()).unwrap();
        assert_eq!(data.rootpgt, Some(4096));
        assert_eq!(data.loadaddr, Some(65536));
        assert_eq!(data.threads.len(), 1);
        assert_eq!(data.threads[0].comm, "init");
    }

    #[test]
    fn malformed_json_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{{not json").unwrap();
        assert!(load(f.path()).is_err());
    }

    #[test]
    fn kernel_mode_sidecar_has_no_rootpgt() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"threads": [{{"pid": 1, "tid": 42, "comm": "swapper", "registers": {{}}}}]}}"#
        )
        .unwrap();
        let data = load(f.path()).unwrap();
        assert_eq!(data.rootpgt, None);
        assert_eq!(data.threads[0].tid, 42);
    }
}
