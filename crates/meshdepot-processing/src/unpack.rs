//! Archive expansion for upload batches.
//!
//! Zip archives are flattened into their member files. Each archive may carry a
//! `thumbnail.{png,jpg,jpeg}` and a `manifest.json`; the first of each found
//! across the batch is split out, later copies are discarded.

use bytes::Bytes;
use serde::Serialize;
use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::path::{Component, Path};

use crate::classify::is_archive;

/// Default cap on bytes decompressed from all archives of one upload (2 GiB).
pub const DEFAULT_MAX_DECOMPRESSED_BYTES: u64 = 2048 * 1024 * 1024;

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_PREALLOCATED_BYTES: u64 = 64 * 1024 * 1024;

const THUMBNAIL_NAMES: [&str; 3] = ["thumbnail.png", "thumbnail.jpg", "thumbnail.jpeg"];
const MANIFEST_NAME: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq)]
pub struct UploadItem {
    pub file_name: String,
    pub data: Bytes,
}

impl UploadItem {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }
}

/// An archive or archive entry that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct UnpackedUpload {
    pub files: Vec<UploadItem>,
    pub thumbnail: Option<UploadItem>,
    pub manifest: Option<serde_json::Value>,
    pub skipped: Vec<SkippedEntry>,
}

impl UnpackedUpload {
    fn skip(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        let name = name.into();
        let reason = reason.into();
        tracing::warn!(entry = %name, reason = %reason, "Skipping upload entry");
        self.skipped.push(SkippedEntry { name, reason });
    }

    /// Flattened names must stay unique: they become storage keys.
    fn push_file(&mut self, seen: &mut HashSet<String>, item: UploadItem) {
        if !seen.insert(item.file_name.to_lowercase()) {
            let name = item.file_name;
            self.skip(name, "duplicate file name");
            return;
        }
        self.files.push(item);
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveUnpacker {
    max_decompressed_bytes: u64,
}

impl Default for ArchiveUnpacker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DECOMPRESSED_BYTES)
    }
}

impl ArchiveUnpacker {
    pub fn new(max_decompressed_bytes: u64) -> Self {
        Self {
            max_decompressed_bytes,
        }
    }

    /// Expand every archive in `items`. Non-archive items pass through.
    ///
    /// Never fails: unreadable archives and entries are recorded in `skipped`.
    pub fn unpack(&self, items: Vec<UploadItem>) -> UnpackedUpload {
        let mut out = UnpackedUpload::default();
        let mut seen = HashSet::new();
        let mut budget = self.max_decompressed_bytes;

        for item in items {
            if is_archive(&item.file_name) {
                self.expand_archive(item, &mut out, &mut seen, &mut budget);
            } else {
                match base_name(&item.file_name) {
                    Some(name) => out.push_file(
                        &mut seen,
                        UploadItem {
                            file_name: name,
                            data: item.data,
                        },
                    ),
                    None => out.skip(item.file_name, "invalid file name"),
                }
            }
        }

        tracing::debug!(
            files = out.files.len(),
            skipped = out.skipped.len(),
            has_thumbnail = out.thumbnail.is_some(),
            has_manifest = out.manifest.is_some(),
            "Upload unpacked"
        );

        out
    }

    fn expand_archive(
        &self,
        item: UploadItem,
        out: &mut UnpackedUpload,
        seen: &mut HashSet<String>,
        budget: &mut u64,
    ) {
        let archive_name = item.file_name;
        let mut archive = match zip::ZipArchive::new(Cursor::new(item.data)) {
            Ok(archive) => archive,
            Err(e) => {
                out.skip(archive_name, format!("invalid zip archive: {}", e));
                return;
            }
        };

        for i in 0..archive.len() {
            let mut entry = match archive.by_index(i) {
                Ok(entry) => entry,
                Err(e) => {
                    out.skip(
                        format!("{}#{}", archive_name, i),
                        format!("zip read error: {}", e),
                    );
                    continue;
                }
            };

            if entry.is_dir() {
                continue;
            }

            let entry_path = match entry.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => {
                    let raw = entry.name().to_string();
                    out.skip(raw, "unsafe path in archive");
                    continue;
                }
            };

            if is_hidden(&entry_path) {
                continue;
            }

            let Some(file_name) = entry_path
                .file_name()
                .and_then(|n| n.to_str())
                .map(String::from)
            else {
                continue;
            };

            if entry.size() > *budget {
                out.skip(
                    format!("{}/{}", archive_name, entry_path.display()),
                    "decompressed size limit exceeded",
                );
                continue;
            }

            let mut data = Vec::with_capacity(capacity_hint(entry.size()));
            if let Err(e) = (&mut entry).take(*budget + 1).read_to_end(&mut data) {
                out.skip(
                    format!("{}/{}", archive_name, entry_path.display()),
                    format!("corrupt entry: {}", e),
                );
                continue;
            }
            if data.len() as u64 > *budget {
                out.skip(
                    format!("{}/{}", archive_name, entry_path.display()),
                    "decompressed size limit exceeded",
                );
                continue;
            }
            *budget -= data.len() as u64;

            let lower = file_name.to_lowercase();
            if THUMBNAIL_NAMES.contains(&lower.as_str()) {
                if out.thumbnail.is_none() {
                    out.thumbnail = Some(UploadItem::new(file_name, data));
                } else {
                    tracing::debug!(archive = %archive_name, entry = %file_name, "Ignoring extra thumbnail");
                }
                continue;
            }

            if lower == MANIFEST_NAME {
                if out.manifest.is_none() {
                    match serde_json::from_slice::<serde_json::Value>(&data) {
                        Ok(manifest) => out.manifest = Some(manifest),
                        Err(e) => out.skip(
                            format!("{}/{}", archive_name, file_name),
                            format!("manifest is not valid JSON: {}", e),
                        ),
                    }
                } else {
                    tracing::debug!(archive = %archive_name, "Ignoring extra manifest");
                }
                continue;
            }

            out.push_file(seen, UploadItem::new(file_name, data));
        }
    }
}

/// Directory components and dot-files such as `.DS_Store` or `__MACOSX/` are
/// archive metadata, not model content.
fn is_hidden(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(part) => {
            let part = part.to_string_lossy();
            part.starts_with('.') || part == "__MACOSX"
        }
        _ => false,
    })
}

/// Strip any directory part a client may have sent with a multipart file name.
fn base_name(file_name: &str) -> Option<String> {
    let normalized = file_name.replace('\\', "/");
    let name = normalized.rsplit('/').next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

/// Zip headers are untrusted; the declared size only seeds the buffer.
fn capacity_hint(declared_size: u64) -> usize {
    declared_size.min(MAX_PREALLOCATED_BYTES) as usize
}
