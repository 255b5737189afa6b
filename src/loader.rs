use glob::glob;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::ConvertError;
use crate::report::ReportAccumulator;
use crate::types::{ImageMeta, RawAnnotation, Shape, SourceRecord, IMG_FORMATS};

/// Coordinate payload of a vendor annotation.
///
/// Vendors emit either a flat number list (`[x1, y1, x2, y2, ...]`) or a
/// nested pair list (`[[x1, y1], [x2, y2], ...]`); both decode to the same
/// flat form. Anything else is an explicit decode failure.
#[derive(Debug, Clone)]
pub struct CoordList(pub Vec<f64>);

impl<'de> Deserialize<'de> for CoordList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CoordVisitor;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Element {
            Number(f64),
            Pair(Vec<f64>),
        }

        impl<'de> Visitor<'de> for CoordVisitor {
            type Value = CoordList;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a flat list of numbers or a list of [x, y] pairs")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<CoordList, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut flat = Vec::new();
                while let Some(element) = seq.next_element::<Element>()? {
                    match element {
                        Element::Number(value) => flat.push(value),
                        Element::Pair(pair) => {
                            if pair.len() != 2 {
                                return Err(de::Error::custom(
                                    "coordinate pair must contain exactly two values",
                                ));
                            }
                            flat.extend(pair);
                        }
                    }
                }
                Ok(CoordList(flat))
            }
        }

        deserializer.deserialize_seq(CoordVisitor)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AnnotationKind {
    Box,
    Polygon,
}

#[derive(Debug, Deserialize)]
struct VendorAnnotation {
    class_id: String,
    #[serde(rename = "type")]
    kind: AnnotationKind,
    coord: CoordList,
}

#[derive(Debug, Deserialize)]
struct VendorImageMeta {
    #[serde(default)]
    id: String,
    resolution: (u32, u32),
}

#[derive(Debug, Deserialize)]
struct VendorRecord {
    image_meta: VendorImageMeta,
    #[serde(default)]
    annotations: Vec<VendorAnnotation>,
}

/// Lists the category directories under the data root, sorted by name.
///
/// An empty filter selects every category; a named category that does not
/// exist is a configuration error.
pub fn discover_categories(
    data_root: &Path,
    filter: &[String],
) -> Result<Vec<String>, ConvertError> {
    if !data_root.is_dir() {
        return Err(ConvertError::Config(format!(
            "data root {} does not exist",
            data_root.display()
        )));
    }

    let mut categories: Vec<String> = std::fs::read_dir(data_root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    categories.sort();

    if filter.is_empty() {
        return Ok(categories);
    }

    let known: HashSet<&str> = categories.iter().map(String::as_str).collect();
    for wanted in filter {
        if !known.contains(wanted.as_str()) {
            return Err(ConvertError::Config(format!(
                "category '{wanted}' not found under {}",
                data_root.display()
            )));
        }
    }
    Ok(filter.to_vec())
}

/// Collects and parses every label JSON under a category directory.
///
/// Parse failures are reported and skipped; duplicate record ids are dropped
/// after the first occurrence so output paths stay per-record-unique. The
/// result is sorted by id, which makes the sample cap deterministic.
pub fn collect_records(
    category_dir: &Path,
    report: &ReportAccumulator,
) -> Result<Vec<SourceRecord>, ConvertError> {
    let pattern = format!("{}/**/*.json", category_dir.display());
    let json_paths: Vec<PathBuf> = glob(&pattern)
        .map_err(|e| ConvertError::Config(format!("bad data root path: {e}")))?
        .filter_map(|entry| entry.ok())
        .collect();

    let mut records: Vec<SourceRecord> = json_paths
        .into_par_iter()
        .filter_map(|json_path| match parse_record(&json_path) {
            Ok(record) => Some(record),
            Err(reason) => {
                let stem = json_path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("<unnamed>");
                report.warn(stem, reason);
                report.record_submitted();
                report.record_skipped();
                None
            }
        })
        .collect();

    records.sort_by(|a, b| a.id.cmp(&b.id));

    let mut seen = HashSet::new();
    records.retain(|record| {
        if seen.insert(record.id.clone()) {
            true
        } else {
            report.warn(&record.id, "duplicate record id, keeping first occurrence");
            report.record_submitted();
            report.record_skipped();
            false
        }
    });

    Ok(records)
}

/// Caps the record list with a seeded shuffle, so the retained subset is
/// reproducible for a fixed seed.
pub fn sample_records(records: &mut Vec<SourceRecord>, cap: Option<usize>, seed: u64) {
    let Some(cap) = cap else { return };
    if records.len() <= cap {
        return;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    records.shuffle(&mut rng);
    records.truncate(cap);
    records.sort_by(|a, b| a.id.cmp(&b.id));
}

fn parse_record(json_path: &Path) -> Result<SourceRecord, String> {
    let file = File::open(json_path).map_err(|e| format!("cannot open label file: {e}"))?;
    let vendor: VendorRecord =
        serde_json::from_reader(file).map_err(|e| format!("cannot parse label file: {e}"))?;

    let (width, height) = vendor.image_meta.resolution;
    if width == 0 || height == 0 {
        return Err(format!("declared resolution {width}x{height} is invalid"));
    }

    let id = if vendor.image_meta.id.is_empty() {
        json_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or("label file has no usable stem")?
            .to_string()
    } else {
        vendor.image_meta.id.clone()
    };

    let mut annotations = Vec::with_capacity(vendor.annotations.len());
    for (index, annotation) in vendor.annotations.into_iter().enumerate() {
        let coords = annotation.coord.0;
        let shape = match annotation.kind {
            AnnotationKind::Box => {
                if coords.len() != 4 {
                    return Err(format!(
                        "annotation {index}: box coord needs 4 values, got {}",
                        coords.len()
                    ));
                }
                Shape::Box {
                    x: coords[0],
                    y: coords[1],
                    w: coords[2],
                    h: coords[3],
                }
            }
            AnnotationKind::Polygon => {
                if coords.len() < 6 || coords.len() % 2 != 0 {
                    return Err(format!(
                        "annotation {index}: polygon coord needs at least 3 (x, y) pairs, got {} values",
                        coords.len()
                    ));
                }
                Shape::Polygon {
                    points: coords.chunks_exact(2).map(|p| (p[0], p[1])).collect(),
                }
            }
        };
        annotations.push(RawAnnotation {
            class_code: annotation.class_id,
            shape,
        });
    }

    let image_path = resolve_image_path(json_path, &id);
    Ok(SourceRecord {
        id,
        image: ImageMeta {
            path: image_path,
            width,
            height,
        },
        annotations,
    })
}

/// Finds the image file belonging to a label JSON: a sibling with the same
/// stem (or the record id as stem) in one of the supported formats. When no
/// candidate exists the default `.jpg` sibling is returned and image
/// validation reports it as missing.
fn resolve_image_path(json_path: &Path, id: &str) -> PathBuf {
    let dir = json_path.parent().unwrap_or_else(|| Path::new("."));
    let stem = json_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(id);

    for candidate_stem in [stem, id] {
        for ext in IMG_FORMATS {
            let candidate = dir.join(format!("{candidate_stem}.{ext}"));
            if candidate.exists() {
                return candidate;
            }
        }
    }

    dir.join(format!("{stem}.jpg"))
}
