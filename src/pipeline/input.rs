//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! pdfium only opens file-system paths, so a URL source is downloaded into
//! a `TempDir` whose lifetime is tied to the returned value; the directory
//! and the file in it disappear when the pipeline run drops it. Both
//! branches go through the same `%PDF` magic check, so a mislabelled file
//! fails here with a useful message instead of deep inside pdfium.

use crate::error::PlanliftError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: [u8; 4] = *b"%PDF";

/// A source reference resolved to an openable local PDF.
#[derive(Debug)]
pub enum ResolvedInput {
    /// The reference was already a local file.
    Local(PathBuf),
    /// The reference was a URL; the download lives in a temp directory
    /// that is cleaned up when this value drops.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Whether the source reference should be treated as a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a source reference: download a URL, validate a local path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, PlanliftError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn verify_magic(magic: [u8; 4], path: &Path) -> Result<(), PlanliftError> {
    if magic == PDF_MAGIC {
        Ok(())
    } else {
        Err(PlanliftError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        })
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, PlanliftError> {
    use std::io::Read;

    let path = PathBuf::from(path_str);
    // One open probes existence, readability and the header in a single
    // syscall path.
    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PlanliftError::PermissionDenied { path });
        }
        Err(_) => return Err(PlanliftError::FileNotFound { path }),
    };

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_ok() {
        verify_magic(magic, &path)?;
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, PlanliftError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| PlanliftError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            PlanliftError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }
    let body = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    let dir = TempDir::new().map_err(|e| PlanliftError::Internal(e.to_string()))?;
    let path = dir.path().join(filename_from_url(url));

    if body.len() >= 4 {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&body[..4]);
        verify_magic(magic, &path)?;
    }

    tokio::fs::write(&path, &body)
        .await
        .map_err(|e| PlanliftError::io(&path, e))?;
    info!("Downloaded {} bytes to {}", body.len(), path.display());

    Ok(ResolvedInput::Downloaded {
        path,
        _temp_dir: dir,
    })
}

/// Extract a reasonable filename from the URL path.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
