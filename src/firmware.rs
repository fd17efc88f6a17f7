//! Local firmware images flashed onto new instances.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::ambient;
use crate::farm::{ImageUpload, InstanceId};

/// Errors raised while loading a firmware image.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FirmwareError {
    /// Raised when the path has no final file-name component.
    #[error("firmware path {path} has no file name")]
    MissingFileName {
        /// Path supplied by the caller.
        path: Utf8PathBuf,
    },
    /// Raised when the file cannot be read.
    #[error("failed to read firmware {path}: {message}")]
    Read {
        /// Path supplied by the caller.
        path: Utf8PathBuf,
        /// Operating system error message.
        message: String,
    },
}

/// Firmware image read from disk.
///
/// The image is uploaded under its file name, so `build/fw.bin` appears as
/// `fw.bin` on the device farm.
#[derive(Clone, Eq, PartialEq)]
pub struct FirmwareImage {
    path: Utf8PathBuf,
    name: String,
    bytes: Vec<u8>,
}

impl FirmwareImage {
    /// Reads the image at `path`.
    ///
    /// The contents are uploaded as they are; a zero-byte file is a valid
    /// image.
    ///
    /// # Errors
    ///
    /// Returns [`FirmwareError`] when the path has no file name or cannot be
    /// read.
    pub fn load(path: &Utf8Path) -> Result<Self, FirmwareError> {
        let name = path
            .file_name()
            .ok_or_else(|| FirmwareError::MissingFileName {
                path: path.to_path_buf(),
            })?;
        let bytes = ambient::read_bytes(path).map_err(|message| FirmwareError::Read {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            name: name.to_owned(),
            bytes,
        })
    }

    /// Builds an image from bytes already in memory.
    #[must_use]
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = name.into();
        Self {
            path: Utf8PathBuf::from(&file_name),
            name: file_name,
            bytes,
        }
    }

    /// Name the image is uploaded under.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Path the image was read from.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Raw image contents.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Builds the firmware upload bound to `instance`.
    #[must_use]
    pub fn upload_for(&self, instance: InstanceId) -> ImageUpload {
        ImageUpload::firmware(self.name.clone(), instance, self.bytes.clone())
    }
}

impl std::fmt::Debug for FirmwareImage {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("FirmwareImage")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}
