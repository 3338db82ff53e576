use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DataError;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// One image on disk and the index of its class in the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    pub label: usize,
}

/// An `ImageFolder`-style split: `<root>/<class>/<image>`.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pub root: PathBuf,
    pub classes: Vec<String>,
    pub samples: Vec<Sample>,
}

impl ImageFolder {
    /// Scan `root`, deriving the class roster from its sorted subfolder names.
    pub fn scan(root: &Path) -> Result<Self, DataError> {
        let classes = class_roster(root)?;
        Self::scan_with_roster(root, &classes)
    }

    /// Scan `root` mapping its class folders onto an existing roster.
    pub fn scan_with_roster(root: &Path, classes: &[String]) -> Result<Self, DataError> {
        let mut samples = Vec::new();
        for class in class_roster(root)? {
            let label = classes
                .iter()
                .position(|c| *c == class)
                .ok_or_else(|| DataError::UnknownClass(class.clone()))?;

            let mut paths: Vec<PathBuf> = fs::read_dir(root.join(&class))?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            paths.sort();
            samples.extend(paths.into_iter().map(|path| Sample { path, label }));
        }

        if samples.is_empty() {
            return Err(DataError::Empty(root.to_path_buf()));
        }

        Ok(ImageFolder {
            root: root.to_path_buf(),
            classes: classes.to_vec(),
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Sorted names of the class subfolders of `root`.
pub fn class_roster(root: &Path) -> Result<Vec<String>, DataError> {
    if !root.is_dir() {
        return Err(DataError::DataLayout(root.to_path_buf()));
    }
    let mut classes: Vec<String> = fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter_map(|p| p.file_name().and_then(|s| s.to_str()).map(str::to_string))
        .collect();
    classes.sort();
    if classes.is_empty() {
        return Err(DataError::DataLayout(root.to_path_buf()));
    }
    Ok(classes)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}
