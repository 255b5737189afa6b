use clap::ValueEnum;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use crate::error::ConvertError;

/// How unresolved class codes are handled.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ClassPolicy {
    /// Any unresolved code aborts the whole run before any file is written.
    Strict,
    /// The annotation is dropped with a warning and processing continues.
    Lenient,
}

/// One entry of the configured class table.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassEntry {
    pub code: String,
    pub name: String,
}

/// Maps vendor class codes to a dense `[0, N)` index space.
///
/// The table is supplied as configuration, so distinct categories or runs can
/// use distinct vocabularies. Indices follow the order of the class-list file,
/// which keeps the descriptor's `names` list stable across runs.
#[derive(Debug, Clone)]
pub struct ClassMap {
    index_by_code: HashMap<String, u32>,
    names: Vec<String>,
}

impl ClassMap {
    /// Builds the map from ordered entries; index = position in the list.
    ///
    /// Fails with a configuration error on an empty list or a duplicate code,
    /// which keeps the mapping injective and total over the configured codes.
    pub fn from_entries(entries: Vec<ClassEntry>) -> Result<Self, ConvertError> {
        if entries.is_empty() {
            return Err(ConvertError::Config(
                "class table must contain at least one entry".to_string(),
            ));
        }

        let mut index_by_code = HashMap::with_capacity(entries.len());
        let mut names = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            if entry.code.is_empty() {
                return Err(ConvertError::Config(format!(
                    "class entry {index} has an empty code"
                )));
            }
            if index_by_code.insert(entry.code.clone(), index as u32).is_some() {
                return Err(ConvertError::Config(format!(
                    "duplicate class code '{}' in class table",
                    entry.code
                )));
            }
            names.push(entry.name);
        }

        Ok(Self {
            index_by_code,
            names,
        })
    }

    /// Loads the class table from a YAML or JSON list of `{code, name}` entries.
    pub fn from_file(path: &Path) -> Result<Self, ConvertError> {
        let file = File::open(path).map_err(|e| {
            ConvertError::Config(format!("cannot open class file {}: {e}", path.display()))
        })?;

        let entries: Vec<ClassEntry> = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_reader(file).map_err(|e| {
                ConvertError::Config(format!("cannot parse class file {}: {e}", path.display()))
            })?
        } else {
            serde_yaml::from_reader(file).map_err(|e| {
                ConvertError::Config(format!("cannot parse class file {}: {e}", path.display()))
            })?
        };

        Self::from_entries(entries)
    }

    /// Resolves a vendor code to its target index, if configured.
    pub fn resolve(&self, code: &str) -> Option<u32> {
        self.index_by_code.get(code).copied()
    }

    /// Number of target classes `N`.
    pub fn num_classes(&self) -> usize {
        self.names.len()
    }

    /// Class names, index-aligned with the mapping.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The name for a resolved index.
    pub fn name_of(&self, index: u32) -> &str {
        &self.names[index as usize]
    }
}
