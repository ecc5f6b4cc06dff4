//! Persisted phase markers.
//!
//! All markers live in a single TOML file. A marker is only ever added, never
//! removed, so a phase that finds its marker set can skip its work on every
//! later invocation, including after a reboot or a crash.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Error, Write};
use std::path::{Path, PathBuf};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, AsRefStr, Display, EnumIter, EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum Marker {
    KernelRebootIssued,
    DependenciesInstalled,
    RepoCloned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub set_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    markers: BTreeMap<String, MarkerRecord>,
}

pub struct StateStore {
    path: PathBuf,
    state: StateFile,
}

impl StateStore {
    /// Opens the store at `path`. A missing file is an empty store; the file is
    /// only created by the first [`StateStore::ensure_set`].
    pub fn open(path: &Path) -> Result<Self, Error> {
        let state = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                Error::other(format!("Corrupted state file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateFile::default(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has(&self, marker: Marker) -> bool {
        self.state.markers.contains_key(marker.as_ref())
    }

    pub fn get(&self, marker: Marker) -> Option<&MarkerRecord> {
        self.state.markers.get(marker.as_ref())
    }

    /// Sets `marker` and writes the store to disk before returning. Returns
    /// `false` without touching the file when the marker was already set.
    pub fn ensure_set(&mut self, marker: Marker) -> Result<bool, Error> {
        if self.has(marker) {
            return Ok(false);
        }
        let record = MarkerRecord {
            set_at: chrono::Local::now().to_rfc3339(),
        };
        self.state
            .markers
            .insert(marker.as_ref().to_string(), record);
        if let Err(e) = self.persist() {
            self.state.markers.remove(marker.as_ref());
            return Err(e);
        }
        Ok(true)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Marker, Option<&MarkerRecord>)> + '_ {
        Marker::iter().map(|marker| (marker, self.get(marker)))
    }

    fn persist(&self) -> Result<(), Error> {
        let content = toml::to_string(&self.state)
            .map_err(|e| Error::other(format!("Failed to encode state: {e}")))?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp_path = self.path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
