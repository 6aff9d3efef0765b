// relay-core/src/artifacts/writer.rs

//! Writes artifact bundles under `<root>/<owner>/`, never outside it.

use super::ArtifactBundle;
use super::extract::coerce_binary_path;
use crate::errors::{RelayError, Result};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

pub const FALLBACK_FILE_NAME: &str = "generated-file.txt";
pub const RESPONSES_DIR: &str = "responses";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArtifactFile {
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArtifactBundle {
    pub base_dir: PathBuf,
    pub files: Vec<WrittenArtifactFile>,
}

/// Normalizes an untrusted path into a relative, forward-slash path with no
/// `.` or `..` segments. `..` consumes the previous segment when there is one
/// and is dropped otherwise. Never returns an empty string.
pub fn sanitize_relative_path(unsafe_path: &str) -> String {
    let unified = unsafe_path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        segments.join("/")
    }
}

/// A path made of a single segment, for owner ids and response file names.
fn flatten_segment(value: &str) -> String {
    sanitize_relative_path(value).replace('/', "_")
}

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        let root_dir = std::path::absolute(&root_dir).map_err(|e| RelayError::io(&root_dir, e))?;
        Ok(Self { root_dir })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// The sandbox directory for an owner.
    pub fn owner_dir(&self, owner_id: &str) -> PathBuf {
        self.root_dir.join(flatten_segment(owner_id))
    }

    /// Writes every file of `bundle`, overwriting existing files.
    ///
    /// All paths are validated before the first write. A filesystem failure
    /// part way through leaves the earlier files in place.
    pub fn write_bundle(&self, owner_id: &str, bundle: &ArtifactBundle) -> Result<WrittenArtifactBundle> {
        let base_dir = self.owner_dir(owner_id);

        let mut planned = Vec::with_capacity(bundle.files.len());
        for file in &bundle.files {
            let sanitized = sanitize_relative_path(&file.path);
            // Sanitizing can expose an extension the extractor never saw.
            let relative_path = match coerce_binary_path(&sanitized) {
                Some((text_path, _)) => text_path,
                None => sanitized,
            };
            let absolute_path = base_dir.join(&relative_path);
            if !absolute_path.starts_with(&base_dir) || absolute_path == base_dir {
                warn!(path = %file.path, "Rejected artifact path outside the owner directory.");
                return Err(RelayError::InvalidOutputPath(absolute_path));
            }
            if relative_path != file.path {
                debug!(from = %file.path, to = %relative_path, "Sanitized artifact path.");
            }
            planned.push((relative_path, absolute_path, &file.content));
        }

        fs::create_dir_all(&base_dir).map_err(|e| RelayError::io(&base_dir, e))?;
        let canonical_base = fs::canonicalize(&base_dir).map_err(|e| RelayError::io(&base_dir, e))?;

        let mut files = Vec::with_capacity(planned.len());
        for (relative_path, absolute_path, content) in planned {
            write_inside(&canonical_base, Path::new(&relative_path), content)?;
            files.push(WrittenArtifactFile {
                relative_path,
                absolute_path,
                content: content.clone(),
            });
        }

        info!(
            owner = owner_id,
            base_dir = %base_dir.display(),
            files = files.len(),
            "Wrote artifact bundle."
        );
        Ok(WrittenArtifactBundle { base_dir, files })
    }

    /// Saves a long reply as a single file under `<owner>/responses/`.
    pub fn write_large_text(&self, owner_id: &str, filename: &str, content: &str) -> Result<PathBuf> {
        let base_dir = self.owner_dir(owner_id);
        fs::create_dir_all(&base_dir).map_err(|e| RelayError::io(&base_dir, e))?;
        let canonical_base = fs::canonicalize(&base_dir).map_err(|e| RelayError::io(&base_dir, e))?;

        let relative_path = Path::new(RESPONSES_DIR).join(flatten_segment(filename));
        write_inside(&canonical_base, &relative_path, content)?;
        let absolute_path = base_dir.join(relative_path);
        info!(
            owner = owner_id,
            path = %absolute_path.display(),
            chars = content.chars().count(),
            "Saved large reply to file."
        );
        Ok(absolute_path)
    }
}

/// Creates the parents of `relative_path` one directory at a time below
/// `canonical_base`, then writes `content`. Symlinks are refused before
/// anything is created through them.
fn write_inside(canonical_base: &Path, relative_path: &Path, content: &str) -> Result<()> {
    let absolute_path = canonical_base.join(relative_path);
    let mut components = relative_path.components().peekable();
    let mut current = canonical_base.to_path_buf();

    while let Some(component) = components.next() {
        let Component::Normal(segment) = component else {
            warn!(path = %absolute_path.display(), "Artifact path has a non-plain segment.");
            return Err(RelayError::InvalidOutputPath(absolute_path));
        };
        current.push(segment);
        let is_last = components.peek().is_none();

        match fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                warn!(path = %current.display(), "Refusing to write through a symlink.");
                return Err(RelayError::InvalidOutputPath(absolute_path));
            }
            Ok(metadata) if is_last && metadata.is_dir() => {
                return Err(RelayError::io(
                    &current,
                    io::Error::new(io::ErrorKind::IsADirectory, "an artifact file collides with a directory"),
                ));
            }
            Ok(metadata) if !is_last && !metadata.is_dir() => {
                return Err(RelayError::io(
                    &current,
                    io::Error::new(io::ErrorKind::NotADirectory, "an artifact directory collides with a file"),
                ));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !is_last {
                    fs::create_dir(&current).map_err(|e| RelayError::io(&current, e))?;
                }
            }
            Err(e) => return Err(RelayError::io(&current, e)),
        }
    }

    let parent = absolute_path
        .parent()
        .ok_or_else(|| RelayError::InvalidOutputPath(absolute_path.clone()))?;
    let canonical_parent = fs::canonicalize(parent).map_err(|e| RelayError::io(parent, e))?;
    if !canonical_parent.starts_with(canonical_base) || absolute_path == canonical_base {
        warn!(path = %absolute_path.display(), "Artifact parent resolves outside the owner directory.");
        return Err(RelayError::InvalidOutputPath(absolute_path));
    }

    fs::write(&absolute_path, content).map_err(|e| RelayError::io(&absolute_path, e))
}
