//! Default values for [`Config`](crate::Config) fields.
//!
//! Paths default to a `trellis` directory under the platform data directory
//! so installs survive across editor sessions.

use camino::Utf8PathBuf;
use std::env;

/// Registry queried when no registry URL is configured.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.trellis-editor.org/v1";

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Milliseconds a language server gets to answer `initialize`.
pub const DEFAULT_INITIALIZATION_TIMEOUT_MS: u64 = 10_000;

/// Milliseconds a single language server request may stay unanswered.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 2_000;

/// Milliseconds an archive download may take.
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;

/// Name of the lock file inside the data directory.
pub const LOCK_FILE_NAME: &str = "trellis-lock.json";

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Owned registry URL used by serde defaults.
pub fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_owned()
}

/// Directory holding installed extensions.
pub fn default_install_dir() -> Utf8PathBuf {
    data_directory().join("extensions")
}

/// Location of the lock file.
pub fn default_lock_file() -> Utf8PathBuf {
    data_directory().join(LOCK_FILE_NAME)
}

/// Workspace root reported to language servers.
pub fn default_workspace_root() -> Utf8PathBuf {
    env::current_dir()
        .ok()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("."))
}

fn data_directory() -> Utf8PathBuf {
    let base = dirs::data_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(fallback_base_directory);
    base.join("trellis")
}

fn fallback_base_directory() -> Utf8PathBuf {
    dirs::home_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .map_or_else(|| Utf8PathBuf::from(".local/share"), |home| home.join(".local/share"))
}
