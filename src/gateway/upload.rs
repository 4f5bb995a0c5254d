use std::path::{Path, PathBuf};

use reqwest::multipart::{Form, Part};
use walkdir::WalkDir;

use crate::error::{Result, ScanClientError};

/// A local directory to upload for scanning.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryUpload {
    pub root: PathBuf,
    pub recursive: bool,
}

/// One file of a directory upload and the name it travels under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEntry {
    pub path: PathBuf,
    /// `<directory name>/<path inside the directory>`, always `/` separated.
    pub relative_path: String,
}

impl DirectoryUpload {
    pub fn new(root: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            root: root.into(),
            recursive,
        }
    }

    pub fn directory_name(&self) -> String {
        self.root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.to_string_lossy().into_owned())
    }

    pub fn entries(&self) -> Result<Vec<UploadEntry>> {
        if !self.root.is_dir() {
            return Err(ScanClientError::NotADirectory(
                self.root.display().to_string(),
            ));
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let directory_name = self.directory_name();
        let mut entries = Vec::new();

        for entry in WalkDir::new(&self.root)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let inner = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");

            entries.push(UploadEntry {
                path: entry.path().to_path_buf(),
                relative_path: format!("{directory_name}/{inner}"),
            });
        }

        if entries.is_empty() {
            return Err(ScanClientError::EmptyDirectory(
                self.root.display().to_string(),
            ));
        }

        Ok(entries)
    }

    pub(crate) async fn to_form(&self) -> Result<Form> {
        let entries = self.entries()?;
        log::debug!(
            "uploading {} files from {}",
            entries.len(),
            self.root.display()
        );

        let mut form = Form::new()
            .text("directoryName", self.directory_name())
            .text("recursive", self.recursive.to_string());

        for entry in entries {
            let part = file_part(&entry.path, entry.relative_path).await?;
            form = form.part("files", part);
        }

        Ok(form)
    }
}

pub(crate) async fn single_file_form(path: &Path) -> Result<Form> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(ScanClientError::InvalidRequest(format!(
            "{} is not a file",
            path.display()
        )));
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(Form::new().part("file", file_part(path, file_name).await?))
}

async fn file_part(path: &Path, file_name: String) -> Result<Part> {
    let contents = tokio::fs::read(path).await?;
    let content_type = mime_guess::from_path(path)
        .first()
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());

    Ok(Part::bytes(contents)
        .file_name(file_name)
        .mime_str(&content_type)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::Builder::new().prefix("samples").tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.exe"), "a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.dll"), "c").unwrap();
        dir
    }

    fn relative_paths(upload: &DirectoryUpload) -> Vec<String> {
        upload
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.relative_path)
            .collect()
    }

    #[test]
    fn recursive_walk_prefixes_directory_name() {
        let dir = fixture();
        let upload = DirectoryUpload::new(dir.path(), true);
        let name = upload.directory_name();

        assert_eq!(
            relative_paths(&upload),
            vec![
                format!("{name}/a.exe"),
                format!("{name}/b.txt"),
                format!("{name}/nested/c.dll"),
            ]
        );
    }

    #[test]
    fn flat_walk_skips_subdirectories() {
        let dir = fixture();
        let upload = DirectoryUpload::new(dir.path(), false);
        let name = upload.directory_name();

        assert_eq!(
            relative_paths(&upload),
            vec![format!("{name}/a.exe"), format!("{name}/b.txt")]
        );
    }

    #[test]
    fn empty_and_missing_directories_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let empty = DirectoryUpload::new(dir.path(), true);
        assert!(matches!(
            empty.entries(),
            Err(ScanClientError::EmptyDirectory(_))
        ));

        let missing = DirectoryUpload::new(dir.path().join("gone"), true);
        assert!(matches!(
            missing.entries(),
            Err(ScanClientError::NotADirectory(_))
        ));
    }
}
