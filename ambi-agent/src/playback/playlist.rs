//! Playlist directory scanning
//!
//! The playlist is a flat directory of ready-to-play files. Every scan
//! rebuilds the list from scratch, ordered by file name, so an unchanged
//! directory always plays in the same order. A missing directory or one with
//! no eligible files is simply an empty playlist.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, trace};

/// Extensions accepted when none are configured
pub const DEFAULT_EXTENSIONS: &[&str] = &["mp3", "ogg", "opus", "flac", "wav", "m4a", "aac"];

/// Scans one directory for playable files
#[derive(Debug, Clone)]
pub struct PlaylistSource {
    dir: PathBuf,
    extensions: Vec<String>,
}

impl PlaylistSource {
    pub fn new<S: AsRef<str>>(dir: impl Into<PathBuf>, extensions: &[S]) -> Self {
        let extensions = extensions
            .iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self {
            dir: dir.into(),
            extensions,
        }
    }

    pub fn with_default_extensions(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, DEFAULT_EXTENSIONS)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List eligible files as absolute paths, sorted by file name
    pub async fn scan(&self) -> Vec<PathBuf> {
        let dir = match fs::canonicalize(&self.dir).await {
            Ok(dir) => dir,
            Err(e) => {
                debug!("Playlist directory {} unavailable: {}", self.dir.display(), e);
                return Vec::new();
            }
        };

        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) => {
                debug!("Cannot list playlist directory {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        loop {
            match read_dir.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if self.is_eligible(&path).await {
                        entries.push(path);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped listing {} early: {}", dir.display(), e);
                    break;
                }
            }
        }

        entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        trace!("Scanned {} playlist entries in {}", entries.len(), dir.display());
        entries
    }

    fn has_known_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.extensions.iter().any(|known| *known == e)
            })
            .unwrap_or(false)
    }

    /// Regular, non-hidden file with a recognized extension
    async fn is_eligible(&self, path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true);
        if hidden || !self.has_known_extension(path) {
            return false;
        }
        // Follows symlinks, like Path::is_file
        fs::metadata(path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }
}
