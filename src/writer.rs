use image::{ImageFormat, RgbImage};
use serde::Serialize;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::class_map::ClassMap;
use crate::error::ConvertError;
use crate::split::Split;
use crate::types::NormalizedAnnotation;

/// The dataset descriptor written next to the split directories.
#[derive(Debug, Serialize)]
pub struct DatasetDescriptor {
    pub path: String,
    pub train: String,
    pub val: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    pub nc: usize,
    pub names: Vec<String>,
}

/// Materializes the fixed output layout for one category:
/// `<output>/<category>/<split>/{images,labels}` plus `data.yaml`.
///
/// Every write is atomic (temp file in the target directory, then rename),
/// so a cancelled or failed record never leaves partial output behind.
#[derive(Debug)]
pub struct DatasetWriter {
    category_root: PathBuf,
    has_test: bool,
}

impl DatasetWriter {
    /// Creates the directory tree, replacing any previous output for the
    /// category.
    pub fn create(
        output_root: &Path,
        category: &str,
        has_test: bool,
    ) -> Result<Self, ConvertError> {
        let category_root = output_root.join(category);

        let mut splits = vec![Split::Train, Split::Val];
        if has_test {
            splits.push(Split::Test);
        }
        for split in splits {
            let split_dir = category_root.join(split.as_str());
            create_output_directory(&split_dir.join("images"))?;
            create_output_directory(&split_dir.join("labels"))?;
        }

        Ok(Self {
            category_root,
            has_test,
        })
    }

    pub fn category_root(&self) -> &Path {
        &self.category_root
    }

    /// Writes one label file: one line per surviving annotation, 6-decimal
    /// fixed precision, newline-terminated. An empty annotation list yields
    /// an empty label file (a background sample).
    pub fn write_labels(
        &self,
        split: Split,
        stem: &str,
        annotations: &[NormalizedAnnotation],
    ) -> Result<(), ConvertError> {
        let mut contents = String::with_capacity(annotations.len() * 40);
        for annotation in annotations {
            contents.push_str(&annotation.to_label_line());
            contents.push('\n');
        }

        let path = self
            .category_root
            .join(split.as_str())
            .join("labels")
            .join(format!("{stem}.txt"));
        write_atomic(&path, contents.as_bytes())
    }

    /// Copies an unmodified source image into the split, keeping its
    /// extension.
    pub fn copy_image(&self, split: Split, stem: &str, source: &Path) -> Result<PathBuf, ConvertError> {
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        let path = self
            .category_root
            .join(split.as_str())
            .join("images")
            .join(format!("{stem}.{ext}"));

        let bytes = fs::read(source).map_err(|source| ConvertError::Write {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    /// Encodes an augmented sample to JPEG and writes it into the split.
    pub fn write_image(
        &self,
        split: Split,
        stem: &str,
        image: &RgbImage,
    ) -> Result<PathBuf, ConvertError> {
        let path = self
            .category_root
            .join(split.as_str())
            .join("images")
            .join(format!("{stem}.jpg"));

        let mut encoded = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)
            .map_err(|e| ConvertError::Write {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?;
        write_atomic(&path, &encoded)?;
        Ok(path)
    }

    /// Emits the dataset descriptor with the class count and the
    /// index-aligned class-name list.
    pub fn write_descriptor(&self, class_map: &ClassMap) -> Result<(), ConvertError> {
        let absolute_root = fs::canonicalize(&self.category_root)?;
        let descriptor = DatasetDescriptor {
            path: absolute_root.to_string_lossy().into_owned(),
            train: "train/images".to_string(),
            val: "val/images".to_string(),
            test: self.has_test.then(|| "test/images".to_string()),
            nc: class_map.num_classes(),
            names: class_map.names().to_vec(),
        };

        let path = self.category_root.join("data.yaml");
        let contents = serde_yaml::to_string(&descriptor).map_err(|e| {
            ConvertError::Write {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            }
        })?;
        write_atomic(&path, contents.as_bytes())
    }
}

/// Creates a fresh directory, replacing a previous one.
fn create_output_directory(path: &Path) -> Result<(), ConvertError> {
    if path.exists() {
        log::warn!(
            "Directory {} already exists. Deleting and recreating it.",
            path.display()
        );
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    Ok(())
}

/// Writes bytes to a temp file in the target directory and renames it into
/// place, so readers never observe a partial file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let result = fs::write(&tmp_path, bytes).and_then(|()| fs::rename(&tmp_path, path));
    result.map_err(|source| ConvertError::Write {
        path: path.to_path_buf(),
        source,
    })
}
