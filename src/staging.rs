use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWriteExt};
use uuid::Uuid;

/// A staged upload on local disk.
///
/// The on-disk artifact lives exactly as long as this value: `Drop`
/// removes it, so every exit path of a request (success, provider
/// failure, validation failure, client disconnect) releases the file.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    filename: String,
    size: u64,
}

impl StagedFile {
    /// Streams `reader` into a uniquely named file under `dir`.
    ///
    /// The partial file is cleaned up if the copy fails midway.
    pub async fn create<R>(dir: &Path, filename: &str, mut reader: R) -> std::io::Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        // the directory may have been cleaned up since startup
        tokio::fs::create_dir_all(dir).await?;

        let path = dir.join(unique_name(filename));
        let mut file = File::create(&path).await?;

        // Constructed before the copy so an early error still unlinks.
        let mut staged = Self {
            path,
            filename: filename.to_string(),
            size: 0,
        };

        staged.size = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;

        tracing::debug!(
            path = %staged.path.display(),
            size = staged.size,
            "File staged"
        );

        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Staged file deleted"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "Failed to delete staged file"
            ),
        }
    }
}

/// Unique on-disk name: a UUID plus the original extension when the
/// extension is plain ASCII alphanumeric.
fn unique_name(filename: &str) -> String {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()));

    match ext {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
        None => Uuid::new_v4().to_string(),
    }
}
