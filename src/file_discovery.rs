use crate::error::{Result, XsdError};
use ignore::WalkBuilder;
use ignore::overrides::{Override, OverrideBuilder};
use std::path::{Path, PathBuf};

/// Directory walker that collects documents by extension.
///
/// Honours `.gitignore` and hidden-file rules the way `ignore::Walk` does.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// File extensions to include (e.g., ["xml", "cmdi"]), lowercase
    extensions: Vec<String>,
    exclude_patterns: Vec<String>,
    /// Maximum depth for directory traversal (None = unlimited)
    max_depth: Option<usize>,
    follow_symlinks: bool,
}

impl FileDiscovery {
    pub fn new() -> Self {
        Self {
            extensions: vec!["xml".to_string()],
            exclude_patterns: vec![],
            max_depth: None,
            follow_symlinks: false,
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Discover documents under `path`, sorted.
    ///
    /// A file given directly is returned whatever its extension.
    pub fn discover_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let metadata = std::fs::metadata(path).map_err(|source| XsdError::InputUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        if metadata.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }

        let overrides = self.build_overrides(path)?;
        let walker = WalkBuilder::new(path)
            .max_depth(self.max_depth)
            .follow_links(self.follow_symlinks)
            .overrides(overrides)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) => {
                    let is_file = entry.file_type().is_some_and(|t| t.is_file());
                    if is_file && self.should_process(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
                // Log error but continue processing other files
                Err(e) => log::warn!("Error walking {}: {}", path.display(), e),
            }
        }

        files.sort();
        log::debug!("Discovered {} documents under {}", files.len(), path.display());
        Ok(files)
    }

    /// Check if a file should be processed based on its extension
    pub fn should_process(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }

    fn build_overrides(&self, root: &Path) -> Result<Override> {
        let mut builder = OverrideBuilder::new(root);
        for pattern in &self.exclude_patterns {
            builder
                .add(&format!("!{}", pattern))
                .map_err(|e| XsdError::FileSystemTraversal {
                    path: root.to_path_buf(),
                    reason: format!("Invalid exclude pattern '{}': {}", pattern, e),
                })?;
        }
        builder.build().map_err(|e| XsdError::FileSystemTraversal {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}
