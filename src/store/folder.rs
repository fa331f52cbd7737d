//! File store over a local directory tree.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{Result, StripError};

use super::{FileHandle, FileStore};

/// Longest file name written, in characters.
const MAX_NAME_CHARS: usize = 200;

/// Stores files under `root/<folder_id>/`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a folder id maps to. Ids may not escape the root.
    pub fn folder_path(&self, folder_id: &str) -> Result<PathBuf> {
        let relative = Path::new(folder_id);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StripError::InvalidPath(folder_id.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl FileStore for DirectoryStore {
    fn create_file(&mut self, folder_id: &str, data: &[u8], name: &str) -> Result<FileHandle> {
        let folder = self.folder_path(folder_id)?;
        std::fs::create_dir_all(&folder).map_err(|e| StripError::io(&folder, e))?;

        let mut path = unique_path(&folder.join(sanitize_file_name(name)));
        let mut file = loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break file,
                // Lost a race for the name: pick the next free one
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    path = unique_path(&path);
                }
                Err(e) => return Err(StripError::io(&path, e)),
            }
        };
        file.write_all(data)
            .and_then(|_| file.flush())
            .map_err(|e| StripError::io(&path, e))?;

        debug!(path = %path.display(), size = data.len(), "File created");
        Ok(FileHandle {
            id: path.to_string_lossy().into_owned(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: data.len() as u64,
        })
    }
}

/// Make a name safe to use as a single path component.
///
/// Path separators, characters Windows rejects and control characters become
/// `_`. Trailing dots and spaces are dropped.
pub fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_NAME_CHARS)
        .collect();

    let trimmed = sanitized.trim_end_matches(['.', ' ']).trim_start();
    match trimmed {
        "" | "." | ".." => "attachment".to_string(),
        name => name.to_string(),
    }
}

/// If `path` already exists, append a counter to make it unique.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or(Path::new("."));

    (1..)
        .map(|i| {
            if ext.is_empty() {
                parent.join(format!("{stem} ({i})"))
            } else {
                parent.join(format!("{stem} ({i}).{ext}"))
            }
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("a/b\\c:d.txt"), "a_b_c_d.txt");
        assert_eq!(sanitize_file_name("Re: plan?.doc"), "Re_ plan_.doc");
        assert_eq!(sanitize_file_name("name. . "), "name");
        assert_eq!(sanitize_file_name(".."), "attachment");
        assert_eq!(sanitize_file_name(""), "attachment");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_file_name(&long).chars().count(), MAX_NAME_CHARS);
    }

    #[test]
    fn test_folder_path_rejects_escapes() {
        let store = DirectoryStore::new("/tmp/root");
        assert_eq!(
            store.folder_path("attachments/2024").unwrap(),
            PathBuf::from("/tmp/root/attachments/2024")
        );
        assert!(store.folder_path("../elsewhere").is_err());
        assert!(store.folder_path("/etc").is_err());
    }

    #[test]
    fn test_unique_path_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        assert_eq!(unique_path(&path), path);
        std::fs::write(&path, b"1").unwrap();
        assert_eq!(unique_path(&path), dir.path().join("scan (1).pdf"));
    }
}
