//! Gallery store — enrolled (name, encoding) pairs persisted as one JSON object.
//!
//! The file holds two parallel arrays, `encodings` and `names`, where
//! `names[i]` labels `encodings[i]`. Enrollment is rare and interactive, so
//! every save rewrites the whole file.

use crate::types::{Embedding, Enrollment};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery storage corrupt: {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("gallery I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// On-disk layout of the gallery file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct GalleryFile {
    encodings: Vec<Embedding>,
    names: Vec<String>,
}

/// In-memory gallery, in enrollment order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    entries: Vec<Enrollment>,
}

impl Gallery {
    pub fn new(entries: Vec<Enrollment>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[Enrollment] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, name: impl Into<String>, encoding: Embedding) {
        self.entries.push(Enrollment {
            name: name.into(),
            encoding,
        });
    }

    /// Split into the parallel `(encodings, names)` view.
    pub fn into_parts(self) -> (Vec<Embedding>, Vec<String>) {
        self.entries
            .into_iter()
            .map(|e| (e.encoding, e.name))
            .unzip()
    }

    fn from_file(file: GalleryFile, path: &Path) -> Result<Self, GalleryError> {
        if file.encodings.len() != file.names.len() {
            return Err(GalleryError::Corrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "{} encodings but {} names",
                    file.encodings.len(),
                    file.names.len()
                ),
            });
        }
        let entries = file
            .names
            .into_iter()
            .zip(file.encodings)
            .map(|(name, encoding)| Enrollment { name, encoding })
            .collect();
        Ok(Self { entries })
    }

    fn to_file(&self) -> GalleryFile {
        let (encodings, names) = self.clone().into_parts();
        GalleryFile { encodings, names }
    }
}

/// File-backed gallery store.
#[derive(Debug, Clone)]
pub struct GalleryStore {
    path: PathBuf,
}

impl GalleryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the gallery. A missing file is an empty gallery.
    pub fn load(&self) -> Result<Gallery, GalleryError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no gallery file yet");
                return Ok(Gallery::default());
            }
            Err(source) => {
                return Err(GalleryError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let file: GalleryFile =
            serde_json::from_slice(&raw).map_err(|e| GalleryError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        let gallery = Gallery::from_file(file, &self.path)?;
        tracing::debug!(
            path = %self.path.display(),
            entries = gallery.len(),
            "gallery loaded"
        );
        Ok(gallery)
    }

    /// Append one enrollment, rewriting the whole file.
    ///
    /// Re-enrolling an existing name adds a second independent entry.
    pub fn save(&self, name: &str, encoding: Embedding) -> Result<(), GalleryError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| GalleryError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let mut gallery = self.load()?;
        gallery.push(name, encoding);

        let json = serde_json::to_vec(&gallery.to_file()).map_err(|e| GalleryError::Corrupt {
            path: self.path.clone(),
            reason: format!("serialize: {e}"),
        })?;
        fs::write(&self.path, json).map_err(|source| GalleryError::Io {
            path: self.path.clone(),
            source,
        })?;

        tracing::info!(name, entries = gallery.len(), "enrollment saved");
        Ok(())
    }
}
