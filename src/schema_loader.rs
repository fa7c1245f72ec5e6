use std::path::{Path, PathBuf};

use tower_lsp::lsp_types::Url;

use crate::error::{SchemaError, SchemaResult};
use crate::schema::SchemaSource;

/// One `(namespace, location)` pair taken from an `xsi:schemaLocation` value,
/// or the location of `xsi:noNamespaceSchemaLocation` with an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReference {
    pub namespace: String,
    pub location: String,
}

/// Where a schema location points.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaSourceType {
    Local(PathBuf),
    Remote(String),
}

/// Split an `xsi:schemaLocation` value into namespace/location pairs.
///
/// Returns the pairs and, when the token count is odd, the namespace left
/// without a location.
pub fn parse_schema_location(value: &str) -> (Vec<SchemaReference>, Option<String>) {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    let mut pairs = tokens.chunks_exact(2);
    let references = pairs
        .by_ref()
        .map(|pair| SchemaReference {
            namespace: pair[0].to_string(),
            location: pair[1].to_string(),
        })
        .collect();
    let dangling = pairs.remainder().first().map(|ns| ns.to_string());
    (references, dangling)
}

/// Classify a location: `http(s)://` is remote, everything else is a file.
///
/// `file://` URIs are converted to paths; relative paths resolve against
/// `base_dir`.
pub fn determine_source_type(location: &str, base_dir: &Path) -> SchemaSourceType {
    let location = location.trim();
    if location.starts_with("http://") || location.starts_with("https://") {
        return SchemaSourceType::Remote(location.to_string());
    }
    if location.starts_with("file:")
        && let Ok(url) = Url::parse(location)
        && let Ok(path) = url.to_file_path()
    {
        return SchemaSourceType::Local(path);
    }
    let path = Path::new(location);
    if path.is_absolute() {
        SchemaSourceType::Local(path.to_path_buf())
    } else {
        SchemaSourceType::Local(base_dir.join(path))
    }
}

/// Resolve a location to a local path; remote locations are not supported.
pub fn resolve_location(location: &str, base_dir: &Path) -> SchemaResult<PathBuf> {
    match determine_source_type(location, base_dir) {
        SchemaSourceType::Local(path) => Ok(path),
        SchemaSourceType::Remote(location) => Err(SchemaError::UnsupportedLocation { location }),
    }
}

/// Reads schema documents from the local file system.
///
/// Each read opens, reads and closes the file before returning.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSchemaSource;

impl SchemaSource for FsSchemaSource {
    fn load(&self, path: &Path) -> SchemaResult<String> {
        let text = std::fs::read_to_string(path).map_err(|e| SchemaError::from_io(path.to_path_buf(), e))?;
        Ok(match text.strip_prefix('\u{feff}') {
            Some(stripped) => stripped.to_string(),
            None => text,
        })
    }
}
