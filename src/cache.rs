//! Transient file cache
//!
//! Uploads land directly in the cache directory under collision-free names.
//! Every job attempt writes its outputs into its own scratch directory,
//! removed when the attempt ends.

use crate::normalize::sanitize_file_name;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Claim a cache path for an upload named `file_name`.
    pub async fn reserve(&self, file_name: &str) -> io::Result<PathBuf> {
        self.ensure().await?;
        create_unique(&self.root, file_name).await
    }

    /// Fresh scratch directory for one job attempt.
    pub async fn scratch(&self) -> io::Result<Scratch> {
        let dir = self.root.join(format!("job-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Scratch { dir })
    }

    /// Delete cached files. Already-missing files are fine.
    pub async fn discard(&self, paths: &[PathBuf]) {
        for path in paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Deleted cached file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete cached file");
                }
            }
        }
    }

    /// Wipe and recreate the cache directory. Returns whether it existed.
    pub async fn clear_all(&self) -> io::Result<bool> {
        let existed = match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e),
        };
        self.ensure().await?;
        Ok(existed)
    }
}

/// Output directory owned by a single job attempt.
#[derive(Debug)]
pub struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    /// Claim an output path named `file_name` inside this scratch directory.
    pub async fn output(&self, file_name: &str) -> io::Result<PathBuf> {
        create_unique(&self.dir, file_name).await
    }

    pub async fn cleanup(self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to remove scratch directory");
            }
        }
    }
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    }
}

/// Create an empty file at `dir/name`, or `dir/stem_1.ext`, `dir/stem_2.ext`,
/// ... when taken. Creation is exclusive, so concurrent callers never share
/// a path.
pub async fn create_unique(dir: &Path, file_name: &str) -> io::Result<PathBuf> {
    let mut name = sanitize_file_name(file_name);
    if name.is_empty() || name == "." || name == ".." {
        name = "file".to_string();
    }
    let (stem, ext) = split_extension(&name);

    for n in 0u32.. {
        let candidate = if n == 0 {
            dir.join(&name)
        } else {
            dir.join(format!("{stem}_{n}{ext}"))
        };
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for {file_name}"),
    ))
}
