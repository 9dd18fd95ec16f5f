//! File backed watermark.

use crate::{StorageError, WatermarkStore};
use std::{
    fs::{self, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

/// Stores the watermark as a decimal number in a single file.
///
/// Each save writes a temporary file, syncs it and renames it over the previous one, so
/// a crash leaves either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileWatermark {
    path: PathBuf,
}

impl FileWatermark {
    /// Creates a watermark store at `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the watermark file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl WatermarkStore for FileWatermark {
    fn load_watermark(&self) -> Result<Option<u64>, StorageError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        contents.trim().parse().map(Some).map_err(|_| {
            StorageError::Corrupted(format!(
                "watermark file {} holds {:?}",
                self.path.display(),
                contents.trim()
            ))
        })
    }

    fn save_watermark(&self, block_number: u64) -> Result<(), StorageError> {
        let temp = self.temp_path();
        {
            let mut file = File::create(&temp)?;
            file.write_all(block_number.to_string().as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;

        #[cfg(unix)]
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }
}
