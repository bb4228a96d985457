//! Index building for grouped image/mask datasets.
//!
//! A dataset root holds one directory per group. Each group keeps its images in
//! `source/` and the masks, under the same file names, in `mask/`:
//!
//! ```text
//! <root>/<group>/source/*.png
//! <root>/<group>/mask/<same name>
//! ```
//!
//! Building an index only enumerates directories. Mask paths are derived from
//! the image file names and are not checked here; a missing mask is resolved
//! when the sample is read.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{DatasetError, DatasetResult};

/// Extension of the indexed image files, compared case-sensitively.
pub const IMAGE_EXTENSION: &str = "png";
/// Per-group folder holding the source images.
pub const SOURCE_DIR: &str = "source";
/// Per-group folder holding the masks.
pub const MASK_DIR: &str = "mask";

/// One row of an index table: the group a file belongs to and its path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    /// Group name, the directory directly under the dataset root.
    pub group: String,
    /// Path of the image or mask file.
    pub path: PathBuf,
}

impl IndexEntry {
    pub fn new(group: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            group: group.into(),
            path: path.into(),
        }
    }
}

/// The image and mask tables of a dataset.
///
/// Row `i` of both tables describes the same sample. Every operation here
/// rebuilds both tables the same way, so they always have equal length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetIndex {
    images: Vec<IndexEntry>,
    masks: Vec<IndexEntry>,
}

impl DatasetIndex {
    /// Walk `root` and index every group.
    ///
    /// Groups are visited in file-name order and images within a group are
    /// sorted by file name, so the result only depends on the directory
    /// contents. Entries of the root that are not directories are ignored, and
    /// a group without a `source` folder contributes no rows.
    pub fn build<P: AsRef<Path>>(root: P) -> DatasetResult<Self> {
        let root = root.as_ref();

        if !root.exists() {
            return Err(DatasetError::RootNotFound {
                path: root.to_path_buf(),
            });
        }
        if !root.is_dir() {
            return Err(DatasetError::RootNotDirectory {
                path: root.to_path_buf(),
            });
        }

        let mut index = Self::default();
        let mut groups = 0usize;

        for entry in list_dir(root) {
            let entry = entry.map_err(|source| DatasetError::DirectoryReadFailed {
                path: root.to_path_buf(),
                source,
            })?;

            let group_path = entry.path();
            if !group_path.is_dir() {
                continue;
            }

            let group = entry
                .file_name()
                .to_str()
                .ok_or_else(|| DatasetError::InvalidUtf8Path {
                    path: group_path.to_path_buf(),
                })?
                .to_owned();

            let rows = index.push_group(&group, group_path)?;
            groups += 1;
            tracing::debug!(group = %group, rows, "collected group images");
        }

        tracing::info!(
            root = %root.display(),
            groups,
            rows = index.len(),
            "indexed dataset",
        );
        Ok(index)
    }

    /// Append the rows of one group, returning how many were added.
    fn push_group(&mut self, group: &str, group_path: &Path) -> DatasetResult<usize> {
        let source_dir = group_path.join(SOURCE_DIR);
        if !source_dir.is_dir() {
            tracing::debug!(group = %group, "group has no source folder, skipping");
            return Ok(0);
        }

        let mask_dir = group_path.join(MASK_DIR);
        let mut rows = 0;

        for entry in list_dir(&source_dir) {
            let entry = entry.map_err(|source| DatasetError::DirectoryReadFailed {
                path: source_dir.clone(),
                source,
            })?;

            let image_path = entry.path();
            let is_image = image_path
                .extension()
                .is_some_and(|ext| ext == IMAGE_EXTENSION);
            if !is_image || !image_path.is_file() {
                continue;
            }

            let mask_path = mask_dir.join(entry.file_name());
            self.images.push(IndexEntry::new(group, image_path));
            self.masks.push(IndexEntry::new(group, mask_path));
            rows += 1;
        }

        Ok(rows)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Image table.
    pub fn images(&self) -> &[IndexEntry] {
        &self.images
    }

    /// Mask table.
    pub fn masks(&self) -> &[IndexEntry] {
        &self.masks
    }

    /// Split the index back into its image and mask tables.
    pub fn into_tables(self) -> (Vec<IndexEntry>, Vec<IndexEntry>) {
        (self.images, self.masks)
    }

    /// Distinct group names, in the order they first appear.
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for entry in &self.images {
            if !groups.contains(&entry.group.as_str()) {
                groups.push(&entry.group);
            }
        }
        groups
    }

    /// Keep only the rows whose group is listed in `groups`.
    ///
    /// Relative order is preserved. An empty list selects everything.
    pub fn filter_groups<S: AsRef<str>>(&self, groups: &[S]) -> Self {
        if groups.is_empty() {
            return self.clone();
        }

        let selected = |entry: &&IndexEntry| groups.iter().any(|g| g.as_ref() == entry.group);

        Self {
            images: self.images.iter().filter(selected).cloned().collect(),
            masks: self.masks.iter().filter(selected).cloned().collect(),
        }
    }

    /// Truncate or cyclically replicate both tables to exactly `size` rows.
    ///
    /// A `size` of zero leaves the index untouched.
    pub fn resize_to(&self, size: usize) -> DatasetResult<Self> {
        if size == 0 {
            return Ok(self.clone());
        }

        Ok(Self {
            images: resize_cyclic(&self.images, size)?,
            masks: resize_cyclic(&self.masks, size)?,
        })
    }

    /// Rows of `self` followed by the rows of `other`.
    pub fn concat(&self, other: &Self) -> Self {
        Self {
            images: [self.images.as_slice(), other.images.as_slice()].concat(),
            masks: [self.masks.as_slice(), other.masks.as_slice()].concat(),
        }
    }
}

/// Return exactly `size` rows taken from `rows`.
///
/// With at least `size` rows this is the first `size` of them. Otherwise the
/// rows are repeated `ceil(size / len)` times end to end and the result is cut
/// to `size`, so row `j` of the output is row `j % len` of the input.
pub fn resize_cyclic<T: Clone>(rows: &[T], size: usize) -> DatasetResult<Vec<T>> {
    if rows.len() >= size {
        return Ok(rows[..size].to_vec());
    }
    if rows.is_empty() {
        return Err(DatasetError::EmptyIndex { size });
    }

    let copies = size.div_ceil(rows.len());
    Ok(std::iter::repeat(rows)
        .take(copies)
        .flatten()
        .take(size)
        .cloned()
        .collect())
}

fn list_dir(path: &Path) -> walkdir::IntoIter {
    WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
}
