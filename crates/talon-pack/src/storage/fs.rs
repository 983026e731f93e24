//! Plain-filesystem package storage.

use std::io;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

use super::{PackageDescriptor, PackageLocation};
use crate::{Error, Result};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A directory of standalone package files.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
    recursive: bool,
}

impl DirectoryStorage {
    /// Storage rooted at `root`.
    pub fn new(root: &Path, recursive: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            recursive,
        }
    }

    /// The directory packages are enumerated from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List package files, grouped by extension then sorted by name.
    pub fn enumerate(&self, extensions: &[&str]) -> Result<Vec<PackageDescriptor>> {
        let patterns = extensions
            .iter()
            .map(|ext| Pattern::new(&format!("*.{}", ext)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, e.to_string())))?;

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut groups: Vec<Vec<PackageDescriptor>> = vec![Vec::new(); patterns.len()];

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
        {
            let entry = entry.map_err(walk_error)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            let Some(group) = patterns
                .iter()
                .position(|p| p.matches_with(&file_name, MATCH_OPTIONS))
            else {
                continue;
            };

            let name = relative_name(&self.root, entry.path());
            let size = entry.metadata().map_err(walk_error)?.len();
            groups[group].push(PackageDescriptor {
                name,
                size,
                location: PackageLocation::File(entry.path().to_path_buf()),
            });
        }

        Ok(groups
            .into_iter()
            .flat_map(|mut group| {
                group.sort_by(|a, b| a.name.cmp(&b.name));
                group
            })
            .collect())
    }
}

fn relative_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn walk_error(e: walkdir::Error) -> Error {
    let msg = e.to_string();
    Error::Io(
        e.into_io_error()
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, msg)),
    )
}
