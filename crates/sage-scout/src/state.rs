//! Persistent scout state: the watermark and the processed-id set.
//!
//! Loaded once at startup and saved once at the end of a run. All mutation
//! goes through this type under a single internal lock, and the file is
//! written atomically (temp file + rename) so a crash never leaves a torn
//! state file. The watermark only ever moves forward.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use sage::error::{Error, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateData {
    watermark: i64,
    #[serde(default)]
    processed_ids: HashMap<String, bool>,
}

/// File-backed scout state.
pub struct ScoutState {
    path: PathBuf,
    data: Mutex<StateData>,
}

impl ScoutState {
    /// Load state from `path`, starting fresh when the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let data = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => StateData::default(),
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::store(format!("failed to decode state file: {e}")))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StateData::default(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// The current high-water timestamp.
    #[must_use]
    pub fn watermark(&self) -> i64 {
        self.data.lock().expect("state lock").watermark
    }

    /// Whether `id` was already submitted successfully.
    #[must_use]
    pub fn is_processed(&self, id: &str) -> bool {
        self.data
            .lock()
            .expect("state lock")
            .processed_ids
            .get(id)
            .copied()
            .unwrap_or(false)
    }

    /// Record `id` as submitted.
    pub fn mark_processed(&self, id: &str) {
        self.data
            .lock()
            .expect("state lock")
            .processed_ids
            .insert(id.to_string(), true);
    }

    /// Advance the watermark. Older timestamps are ignored.
    pub fn update_watermark(&self, timestamp: i64) {
        let mut data = self.data.lock().expect("state lock");
        if timestamp > data.watermark {
            data.watermark = timestamp;
        }
    }

    /// Persist the state atomically: write a temp file, then rename over
    /// the target.
    pub fn save(&self) -> Result<()> {
        let serialized = {
            let data = self.data.lock().expect("state lock");
            serde_json::to_string_pretty(&*data)?
        };

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
