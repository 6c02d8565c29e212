//! Error types for the planlift library.
//!
//! One fatal error enum covers everything that aborts an operation. Two
//! classes of failure deliberately do NOT appear here:
//!
//! * A missing region detector — the pipeline degrades to full-page crops
//!   and records the degradation as a step annotation, never an error.
//! * A single asset missing on disk during a batch operation (selection,
//!   promotion, room extraction) — the asset is skipped with a
//!   `tracing::warn!` and the rest of the batch completes.
//!
//! A failure inside a pipeline stage is fatal *to the job*: the worker
//! captures the message verbatim into the job record and marks the job
//! terminal, but the process and other jobs keep running.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the planlift library.
#[derive(Debug, Error)]
pub enum PlanliftError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source document was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid source reference '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// An image file could not be decoded.
    #[error("Failed to decode image '{path}': {detail}")]
    ImageDecodeFailed { path: PathBuf, detail: String },

    /// An image file could not be written.
    #[error("Failed to write image '{path}': {detail}")]
    ImageWriteFailed { path: PathBuf, detail: String },

    /// The region detector reported a failure for a whole run
    /// (per-page detector errors fall back to the full page instead).
    #[error("Region detector '{detector}' failed: {detail}")]
    DetectorFailed { detector: String, detail: String },

    // ── Job / registry errors ─────────────────────────────────────────────
    /// No job record exists with the given id.
    #[error("Job not found: '{id}'")]
    JobNotFound { id: String },

    /// The operation requires a completed job.
    #[error("Job '{id}' is not complete (status: {status})")]
    JobNotComplete { id: String, status: String },

    /// The job's assets already belong to another project; promoting them
    /// again would relocate that project's directory out from under it.
    #[error("Job '{id}' is already promoted to project '{project_id}'")]
    JobAlreadyPromoted { id: String, project_id: String },

    /// The job finished but its manifest is missing on disk.
    #[error("Manifest not found for job '{id}' at '{path}'")]
    ManifestMissing { id: String, path: PathBuf },

    /// No project registry exists (neither document record nor disk mirror).
    #[error("Project not found: '{id}'")]
    ProjectNotFound { id: String },

    /// A promoted asset referenced by a room operation does not exist.
    #[error("Asset '{filename}' is not in the registry of project '{project_id}'")]
    AssetNotRegistered {
        project_id: String,
        filename: String,
    },

    /// No room with the given id exists on any asset of the project.
    #[error("Room not found: '{id}'")]
    RoomNotFound { id: String },

    /// A persisted JSON record could not be parsed.
    #[error("Corrupt record at '{path}': {detail}")]
    RecordCorrupted { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Filesystem operation under the storage root failed.
    #[error("Storage I/O failed at '{path}': {source}")]
    StorageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlanliftError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PlanliftError::StorageIo {
            path: path.into(),
            source,
        }
    }
}
