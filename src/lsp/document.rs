use std::path::PathBuf;

use tower_lsp::lsp_types::Url;

use crate::config::ValidationConfig;
use crate::validator::document_dir;

/// State for each open document
#[derive(Debug, Clone)]
pub struct DocumentState {
    pub content: String,
    pub version: i32,
}

impl DocumentState {
    pub fn new(content: String, version: i32) -> Self {
        Self { content, version }
    }
}

/// Whether the document's extension is one the server never validates (`.xsd` by default)
pub fn is_skipped(uri: &Url, config: &ValidationConfig) -> bool {
    let path = uri.path();
    let Some((_, extension)) = path.rsplit_once('.') else {
        return false;
    };
    if extension.contains('/') {
        return false;
    }
    config
        .skip_extensions
        .iter()
        .any(|skip| skip.eq_ignore_ascii_case(extension))
}

/// Directory schema locations of `uri` resolve against.
///
/// A configured base directory wins; otherwise the document's own
/// directory, falling back to the working directory for non-file URIs.
pub fn base_dir_for(uri: &Url, config: &ValidationConfig) -> PathBuf {
    if let Some(base_dir) = &config.base_dir {
        return base_dir.clone();
    }
    match uri.to_file_path() {
        Ok(path) => document_dir(&path),
        Err(()) => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
