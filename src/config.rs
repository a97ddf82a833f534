use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PipelineError;
use crate::transfer::{HiddenEntryPolicy, PathEnumerator};

/// Which side of a matched folder pair is read from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// Copy the settled watched folder into the same-named destination folder.
    #[default]
    WatchedToDestination,
    /// Seed the freshly created watched folder from the same-named destination folder.
    DestinationToWatched,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineSettings {
    pub debounce_secs: u64,
    pub check_interval_secs: u64,
    pub hidden_policy: HiddenEntryPolicy,
    pub hidden_prefix: String,
    pub direction: TransferDirection,
    pub fail_on_verification_mismatch: bool,
    pub resume_watching_after_reset: bool,
    pub auto_reset: bool,
    pub stop_command: Option<Vec<String>>,
    pub resume_command: Option<Vec<String>>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            debounce_secs: 5,
            check_interval_secs: 1,
            hidden_policy: HiddenEntryPolicy::Exclude,
            hidden_prefix: ".".to_string(),
            direction: TransferDirection::WatchedToDestination,
            fail_on_verification_mismatch: false,
            resume_watching_after_reset: true,
            auto_reset: true,
            stop_command: None,
            resume_command: None,
        }
    }
}

impl PipelineSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn enumerator(&self) -> PathEnumerator {
        PathEnumerator::new(self.hidden_policy, self.hidden_prefix.clone())
    }
}

/// Settings persisted between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub source_root: PathBuf,
    #[serde(default)]
    pub destination_root: PathBuf,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

impl AppConfig {
    pub fn new(source_root: PathBuf, destination_root: PathBuf) -> Self {
        Self {
            source_root,
            destination_root,
            pipeline: PipelineSettings::default(),
        }
    }

    /// `(source, target)` for a one-shot copy or comparison of the two roots.
    pub fn endpoints(&self) -> (&Path, &Path) {
        match self.pipeline.direction {
            TransferDirection::WatchedToDestination => (&self.source_root, &self.destination_root),
            TransferDirection::DestinationToWatched => (&self.destination_root, &self.source_root),
        }
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = fs::read_to_string(path).map_err(|e| PipelineError::from_io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| PipelineError::InvalidConfig {
            reason: format!("{}: {e}", path.display()),
        })
    }

    /// Missing file yields the defaults; a malformed one is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self, PipelineError> {
        match fs::metadata(path) {
            Ok(_) => Self::load(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No settings at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(PipelineError::from_io(path, e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PipelineError::from_io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| PipelineError::InvalidConfig {
            reason: e.to_string(),
        })?;
        fs::write(path, json).map_err(|e| PipelineError::from_io(path, e))?;
        log::info!("Saved settings to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |reason: &str| {
            Err(PipelineError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.source_root.as_os_str().is_empty() {
            return invalid("source_root is not set");
        }
        if self.destination_root.as_os_str().is_empty() {
            return invalid("destination_root is not set");
        }
        if self.pipeline.debounce_secs == 0 {
            return invalid("debounce_secs must be at least 1");
        }
        if self.pipeline.check_interval_secs == 0 {
            return invalid("check_interval_secs must be at least 1");
        }
        if self.pipeline.hidden_policy == HiddenEntryPolicy::Exclude && self.pipeline.hidden_prefix.is_empty() {
            return invalid("hidden_prefix must not be empty when hidden entries are excluded");
        }
        Ok(())
    }
}
