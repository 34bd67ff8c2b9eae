//! Conversion between document paths and `file://` URIs.


use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use lsp_types::Uri;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use url::Url;

use crate::error::OrchestratorError;

const FILE_SCHEME: &str = "file:";

/// Bytes left unescaped in URI paths: RFC 3986 unreserved characters plus
/// the path separator.
const PATH_UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Converts an absolute path to a `file://` URI, percent-encoding every
/// byte outside the unreserved set.
///
/// # Errors
///
/// Returns [`OrchestratorError::InvalidDocument`] if the path is relative
/// or the resulting URI does not parse.
pub fn path_to_uri(path: &Utf8Path) -> Result<Uri, OrchestratorError> {
    if !path.is_absolute() {
        return Err(OrchestratorError::invalid_document(
            path.as_str(),
            "path is not absolute",
        ));
    }
    let uri = format!("file://{}", utf8_percent_encode(path.as_str(), PATH_UNRESERVED));
    uri.parse()
        .map_err(|_| OrchestratorError::invalid_document(&uri, "not a valid URI"))
}

/// Converts a `file://` URI back to a path, decoding escapes.
///
/// Returns `None` for other schemes and for paths that are not UTF-8.
#[must_use]
pub fn uri_to_path(uri: &str) -> Option<Utf8PathBuf> {
    let url = Url::parse(uri).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    let path = url.to_file_path().ok()?;
    Utf8PathBuf::try_from(path).ok()
}

/// Resolves a bare path or `file://` URI to the canonical path used as a
/// document key.
///
/// Relative paths are taken relative to `workspace_root`. Existing files are
/// canonicalised through the filesystem; paths that do not exist yet are
/// normalised lexically.
///
/// # Errors
///
/// Returns [`OrchestratorError::InvalidDocument`] for URIs that are not
/// `file://` URIs or do not decode to a UTF-8 path.
pub fn resolve_document(
    location: &str,
    workspace_root: &Utf8Path,
) -> Result<Utf8PathBuf, OrchestratorError> {
    let path = if location.starts_with(FILE_SCHEME) {
        uri_to_path(location).ok_or_else(|| {
            OrchestratorError::invalid_document(location, "not a decodable file URI")
        })?
    } else if location.is_empty() {
        return Err(OrchestratorError::invalid_document(location, "empty path"));
    } else {
        Utf8PathBuf::from(location)
    };

    let absolute = if path.is_absolute() {
        path
    } else {
        workspace_root.join(path)
    };

    Ok(absolute
        .canonicalize_utf8()
        .unwrap_or_else(|_| normalise(&absolute)))
}

fn normalise(path: &Utf8Path) -> Utf8PathBuf {
    let mut normalised = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                normalised.pop();
            }
            other => normalised.push(other.as_str()),
        }
    }
    normalised
}
