//! Startup-fatal error types.
//!
//! Per-packet failures (a faulting memory read, an unknown thread) never
//! reach this enum — they are mapped to RSP error replies inside the
//! dispatcher and the process keeps running.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("failed to open dump file {path}: {source}")]
    DumpOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse dump file {path} as ELF core: {source}")]
    DumpParse {
        path: PathBuf,
        #[source]
        source: goblin::error::Error,
    },

    #[error("unsupported architecture: {0}")]
    UnsupportedArch(String),

    #[error("dump contains no CPU prstatus notes")]
    NoCpus,

    #[error("failed to read sidecar JSON {path}: {source}")]
    SidecarIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed sidecar JSON {path}: {source}")]
    SidecarJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
