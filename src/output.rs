//! Disposition of captured images: clipboard or PNG file.

use chrono::{DateTime, Local};
use image::{ImageFormat, ImageResult};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::capture::PixelBuffer;

/// Prefix of every saved capture's file name.
pub const FILE_PREFIX: &str = "Pict_";

#[derive(Debug, Error)]
pub enum DispatchFailure {
    #[error("clipboard unavailable: {0}")]
    ClipboardUnavailable(String),
    #[error("failed to set clipboard image: {0}")]
    Clipboard(String),
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to clear read-only flag on {path}: {source}")]
    ClearReadOnly {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create temporary file in {path}: {source}")]
    TempFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to move capture into place at {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Destination for clipboard-mode captures.
pub trait ClipboardSink {
    /// Replaces the system clipboard's image content. Consumes the buffer.
    fn set_image(&mut self, buffer: PixelBuffer) -> Result<(), DispatchFailure>;
}

/// File name for a capture taken at `at`: `Pict_<YYYYMMDDHHmmss>.png`.
pub fn capture_file_name(at: DateTime<Local>) -> String {
    format!("{}{}.png", FILE_PREFIX, at.format("%Y%m%d%H%M%S"))
}

/// Saves `buffer` as a PNG in `dir`, named after `at`.
///
/// The directory is created if missing. The image is encoded into a
/// temporary file in `dir` and moved over the final name only once complete,
/// so a failed save leaves any earlier file of the same name untouched. Two
/// captures within one second leave a single file containing the later one.
pub fn save_png(
    buffer: &PixelBuffer,
    dir: &Path,
    at: DateTime<Local>,
) -> Result<PathBuf, DispatchFailure> {
    fs::create_dir_all(dir).map_err(|source| DispatchFailure::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(capture_file_name(at));
    write_replacing(&path, dir, |file| {
        let mut writer = BufWriter::new(file);
        buffer.image().write_to(&mut writer, ImageFormat::Png)?;
        writer.flush()?;
        Ok(())
    })?;

    Ok(path)
}

/// Writes a new file at `path` through `write`, replacing any existing one.
///
/// `write` fills a temporary file in `dir`; the temporary file is removed if
/// `write` or the final rename fails.
fn write_replacing<F>(path: &Path, dir: &Path, write: F) -> Result<(), DispatchFailure>
where
    F: FnOnce(&mut File) -> ImageResult<()>,
{
    let mut temp = NamedTempFile::new_in(dir).map_err(|source| DispatchFailure::TempFile {
        path: dir.to_path_buf(),
        source,
    })?;

    write(temp.as_file_mut()).map_err(|source| DispatchFailure::Encode {
        path: path.to_path_buf(),
        source,
    })?;

    let cleared = clear_read_only(path)?;
    if cleared {
        tracing::debug!("Replacing read-only capture {}", path.display());
    }

    temp.persist(path).map_err(|e| {
        if cleared {
            restore_read_only(path);
        }
        DispatchFailure::Persist {
            path: path.to_path_buf(),
            source: e.error,
        }
    })?;

    Ok(())
}

/// Clears read-only protection on `path` if it exists. Returns whether the
/// flag was set.
#[allow(clippy::permissions_set_readonly_false)]
fn clear_read_only(path: &Path) -> Result<bool, DispatchFailure> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(source) => {
            return Err(DispatchFailure::ClearReadOnly {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut permissions = metadata.permissions();
    if !permissions.readonly() {
        return Ok(false);
    }

    permissions.set_readonly(false);
    fs::set_permissions(path, permissions).map_err(|source| DispatchFailure::ClearReadOnly {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}

fn restore_read_only(path: &Path) {
    let result = fs::metadata(path).and_then(|metadata| {
        let mut permissions = metadata.permissions();
        permissions.set_readonly(true);
        fs::set_permissions(path, permissions)
    });
    if let Err(e) = result {
        tracing::debug!("Could not restore read-only flag on {}: {}", path.display(), e);
    }
}

#[cfg(windows)]
pub use self::win32::SystemClipboard;

#[cfg(windows)]
mod win32 {
    use arboard::{Clipboard, ImageData};
    use std::borrow::Cow;

    use super::{ClipboardSink, DispatchFailure};
    use crate::capture::PixelBuffer;

    /// The Windows clipboard, opened afresh for every write.
    #[derive(Debug, Default)]
    pub struct SystemClipboard;

    impl ClipboardSink for SystemClipboard {
        fn set_image(&mut self, buffer: PixelBuffer) -> Result<(), DispatchFailure> {
            let mut clipboard = Clipboard::new()
                .map_err(|e| DispatchFailure::ClipboardUnavailable(e.to_string()))?;
            let image = ImageData {
                width: buffer.width() as usize,
                height: buffer.height() as usize,
                bytes: Cow::Owned(buffer.into_raw()),
            };
            clipboard
                .set_image(image)
                .map_err(|e| DispatchFailure::Clipboard(e.to_string()))
        }
    }
}
