//! Pairing of dependent files with the main files they belong to.

use meshdepot_core::models::FormatType;
use serde::Serialize;
use std::path::Path;

use crate::classify::{classify, content_type_for, FileFamily};
use crate::unpack::UploadItem;

/// Order in which main files become Formats. Input order is kept within a type.
pub const MAIN_FILE_PRIORITY: [FormatType; 5] = [
    FormatType::Tilt,
    FormatType::Glb,
    FormatType::Gltf2,
    FormatType::Obj,
    FormatType::Fbx,
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("no usable files: upload needs at least one .tilt, .glb, .gltf, .obj or .fbx file")]
    NoUsableFiles,
}

/// A file that must be written to the byte store once.
#[derive(Debug, Clone)]
pub struct PlannedFile {
    pub item: UploadItem,
    pub family: FileFamily,
    pub content_type: &'static str,
}

/// A Format to create: `root` and `resources` index into `MatchPlan::files`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFormat {
    pub format_type: FormatType,
    pub root: usize,
    pub resources: Vec<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchSummary {
    /// Files with an unknown extension.
    pub unclassified: Vec<String>,
    /// Dependent files no main file accepted.
    pub unattached: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MatchPlan {
    pub asset_name: String,
    pub files: Vec<PlannedFile>,
    pub formats: Vec<PlannedFormat>,
    pub summary: MatchSummary,
}

/// Build the Format plan for a flattened upload.
///
/// A dependent file compatible with several main files is attached to every
/// one of them; it still appears once in `files`.
pub fn plan_formats(items: Vec<UploadItem>) -> Result<MatchPlan, MatchError> {
    let mut summary = MatchSummary::default();
    let mut mains = Vec::new();
    let mut subs = Vec::new();

    for item in items {
        match classify(&item.file_name) {
            None => {
                tracing::debug!(file = %item.file_name, "Dropping unclassified file");
                summary.unclassified.push(item.file_name);
            }
            Some(c) => match c.format_type {
                Some(format_type) => mains.push((format_type, c.family, item)),
                None => subs.push((c.family, item)),
            },
        }
    }

    if mains.is_empty() {
        return Err(MatchError::NoUsableFiles);
    }

    // sort_by_key is stable
    mains.sort_by_key(|(format_type, _, _)| priority_of(*format_type));

    let asset_name = stem_of(&mains[0].2.file_name);

    let mut files: Vec<PlannedFile> = Vec::new();
    let mut formats = Vec::new();

    for (format_type, family, item) in mains {
        let content_type = content_type_for(&item.file_name);
        files.push(PlannedFile {
            item,
            family,
            content_type,
        });
        formats.push(PlannedFormat {
            format_type,
            root: files.len() - 1,
            resources: Vec::new(),
        });
    }

    for (family, item) in subs {
        let accepting: Vec<usize> = formats
            .iter()
            .enumerate()
            .filter(|(_, f)| files[f.root].family.accepts(family))
            .map(|(i, _)| i)
            .collect();

        if accepting.is_empty() {
            tracing::debug!(file = %item.file_name, "No compatible main file");
            summary.unattached.push(item.file_name);
            continue;
        }

        let content_type = content_type_for(&item.file_name);
        files.push(PlannedFile {
            item,
            family,
            content_type,
        });
        let index = files.len() - 1;
        for i in accepting {
            formats[i].resources.push(index);
        }
    }

    Ok(MatchPlan {
        asset_name,
        files,
        formats,
        summary,
    })
}

fn priority_of(format_type: FormatType) -> usize {
    MAIN_FILE_PRIORITY
        .iter()
        .position(|t| *t == format_type)
        .unwrap_or(MAIN_FILE_PRIORITY.len())
}

fn stem_of(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(file_name)
        .to_string()
}
