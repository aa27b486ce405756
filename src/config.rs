//! # Trim Configuration (A3)
//!
//! A single explicit value threaded into the driver, instead of the
//! reference tool's process-wide mutable state (§9 Design Notes). Built
//! once from parsed CLI arguments in `main`, the same way the teacher
//! passes a concrete `&impl SystemOps` into `run_healing` rather than
//! reaching for ambient state.

use std::path::PathBuf;

/// Everything the driver needs for one trim run (§6 Configuration
/// surface).
#[derive(Debug, Clone)]
pub struct TrimConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub includes_path: PathBuf,
    pub excludes_path: PathBuf,
    pub use_includes: bool,
    pub use_excludes: bool,
    /// When set, the input ruleset is fetched from this URL instead of
    /// read from `input_path` (§6 `DownloadFileToTrim`).
    pub download_url: Option<String>,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("./winapp2.ini"),
            output_path: PathBuf::from("./winapp2.ini"),
            includes_path: PathBuf::from("./includes.ini"),
            excludes_path: PathBuf::from("./excludes.ini"),
            use_includes: false,
            use_excludes: false,
            download_url: None,
        }
    }
}
