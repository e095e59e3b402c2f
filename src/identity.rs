// src/identity.rs
// Stable per-device identifier, generated once and kept in a local file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::config::parse_config;
use crate::defs::{DeviceId, DEVICE_ID_KEY};
use crate::logging::log_info;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("device storage unavailable at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("device storage at {} holds an empty device_uuid", .0.display())]
    Empty(PathBuf),
}

#[derive(Debug, Clone)]
pub struct IdentityProvider {
    path: PathBuf,
}

impl IdentityProvider {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the persisted device id, creating and storing a new one on first use.
    pub fn load_or_create(&self) -> Result<DeviceId, IdentityError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => self.parse_stored(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.create(""),
            Err(source) => Err(self.storage_error(source)),
        }
    }

    fn parse_stored(&self, content: &str) -> Result<DeviceId, IdentityError> {
        let entries = parse_config(content)
            .map_err(|e| self.storage_error(io::Error::new(io::ErrorKind::InvalidData, e.to_string())))?;
        match entries.get(DEVICE_ID_KEY) {
            Some(id) if !id.is_empty() => Ok(id.clone()),
            Some(_) => Err(IdentityError::Empty(self.path.clone())),
            // A file without the key is treated as first use; its other lines are kept
            None => self.create(content),
        }
    }

    fn create(&self, existing: &str) -> Result<DeviceId, IdentityError> {
        let device_id = Uuid::new_v4().to_string();

        let mut content = existing.to_string();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&format!("{DEVICE_ID_KEY} = {device_id}\n"));

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.storage_error(e))?;
            }
        }
        fs::write(&self.path, content).map_err(|e| self.storage_error(e))?;

        log_info(&format!("Generated new device id {device_id} in {}", self.path.display()));
        Ok(device_id)
    }

    fn storage_error(&self, source: io::Error) -> IdentityError {
        IdentityError::Storage { path: self.path.clone(), source }
    }
}
