//! Upload processing: turning a batch of uploaded files into planned Formats.
//!
//! Nothing here touches storage or the database. `unpack` flattens archives,
//! `classify` maps file names to families, and `matcher` pairs dependent files
//! with the main files they belong to.

pub mod classify;
pub mod matcher;
pub mod unpack;

pub use classify::{classify, content_type_for, is_archive, Classification, FileFamily};
pub use matcher::{plan_formats, MatchError, MatchPlan, MatchSummary, PlannedFile, PlannedFormat};
pub use unpack::{ArchiveUnpacker, SkippedEntry, UnpackedUpload, UploadItem};
