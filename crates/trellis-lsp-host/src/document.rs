//! Open documents tracked by the orchestrator.

use camino::{Utf8Path, Utf8PathBuf};
use lsp_types::Uri;

/// A document the orchestrator has opened with a language server.
///
/// Versions start at 1 and increase by one with every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    path: Utf8PathBuf,
    uri: Uri,
    language: String,
    version: i32,
}

impl DocumentHandle {
    pub(crate) fn open(path: Utf8PathBuf, uri: Uri, language: &str) -> Self {
        Self {
            path,
            uri,
            language: language.to_owned(),
            version: 1,
        }
    }

    pub(crate) const fn bump(&mut self) -> i32 {
        self.version = self.version.saturating_add(1);
        self.version
    }

    /// Canonical path of the document.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// URI the server knows the document by.
    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Language whose server owns the document.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Current version.
    #[must_use]
    pub const fn version(&self) -> i32 {
        self.version
    }
}
