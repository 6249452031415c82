//! Durable keyed store for workload records and the deployment audit log.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{DeploymentLog, WorkloadRecord};

const WORKLOADS_FILE: &str = "workloads.json";
const LOG_FILE: &str = "deployments.log";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access store file {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("corrupt store file {path}: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
}

pub trait WorkloadStore: Send + Sync {
    fn list_workloads(&self) -> Result<Vec<WorkloadRecord>, StoreError>;
    fn get_workload(&self, name: &str) -> Result<Option<WorkloadRecord>, StoreError>;
    /// Insert or replace the record keyed by its name.
    fn put_workload(&self, record: &WorkloadRecord) -> Result<(), StoreError>;
    /// Returns whether a record was present.
    fn remove_workload(&self, name: &str) -> Result<bool, StoreError>;
    fn append_log(&self, entry: &DeploymentLog) -> Result<(), StoreError>;
    /// Oldest first, optionally restricted to one workload.
    fn list_logs(&self, workload: Option<&str>) -> Result<Vec<DeploymentLog>, StoreError>;
}

fn matches_workload(entry: &DeploymentLog, workload: Option<&str>) -> bool {
    workload.map_or(true, |name| entry.workload.as_deref() == Some(name))
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    workloads: Mutex<BTreeMap<String, WorkloadRecord>>,
    logs: Mutex<Vec<DeploymentLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkloadStore for MemoryStore {
    fn list_workloads(&self) -> Result<Vec<WorkloadRecord>, StoreError> {
        let workloads = self.workloads.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(workloads.values().cloned().collect())
    }

    fn get_workload(&self, name: &str) -> Result<Option<WorkloadRecord>, StoreError> {
        let workloads = self.workloads.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(workloads.get(name).cloned())
    }

    fn put_workload(&self, record: &WorkloadRecord) -> Result<(), StoreError> {
        let mut workloads = self.workloads.lock().unwrap_or_else(PoisonError::into_inner);
        workloads.insert(record.name().to_string(), record.clone());
        Ok(())
    }

    fn remove_workload(&self, name: &str) -> Result<bool, StoreError> {
        let mut workloads = self.workloads.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(workloads.remove(name).is_some())
    }

    fn append_log(&self, entry: &DeploymentLog) -> Result<(), StoreError> {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.push(entry.clone());
        Ok(())
    }

    fn list_logs(&self, workload: Option<&str>) -> Result<Vec<DeploymentLog>, StoreError> {
        let logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(logs
            .iter()
            .filter(|e| matches_workload(e, workload))
            .cloned()
            .collect())
    }
}

/// Store backed by a directory holding `workloads.json` and a JSON-lines
/// `deployments.log`.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn workloads_path(&self) -> PathBuf {
        self.dir.join(WORKLOADS_FILE)
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    fn read_workloads(&self) -> Result<BTreeMap<String, WorkloadRecord>, StoreError> {
        let path = self.workloads_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(io_error(&path, source)),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            path: path.display().to_string(),
            source,
        })
    }

    fn write_workloads(&self, workloads: &BTreeMap<String, WorkloadRecord>) -> Result<(), StoreError> {
        let path = self.workloads_path();
        let bytes = serde_json::to_vec_pretty(workloads).map_err(|source| StoreError::Corrupt {
            path: path.display().to_string(),
            source,
        })?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|source| io_error(&path, source))?;
        tmp.write_all(&bytes)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|source| io_error(&path, source))?;
        tmp.persist(&path)
            .map_err(|e| io_error(&path, e.error))?;
        debug!(path = %path.display(), count = workloads.len(), "saved workload records");
        Ok(())
    }
}

fn io_error(path: &Path, source: io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl WorkloadStore for JsonFileStore {
    fn list_workloads(&self) -> Result<Vec<WorkloadRecord>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_workloads()?.into_values().collect())
    }

    fn get_workload(&self, name: &str) -> Result<Option<WorkloadRecord>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_workloads()?.remove(name))
    }

    fn put_workload(&self, record: &WorkloadRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut workloads = self.read_workloads()?;
        workloads.insert(record.name().to_string(), record.clone());
        self.write_workloads(&workloads)
    }

    fn remove_workload(&self, name: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut workloads = self.read_workloads()?;
        if workloads.remove(name).is_none() {
            return Ok(false);
        }
        self.write_workloads(&workloads)?;
        Ok(true)
    }

    fn append_log(&self, entry: &DeploymentLog) -> Result<(), StoreError> {
        let path = self.log_path();
        let mut line = serde_json::to_string(entry).map_err(|source| StoreError::Corrupt {
            path: path.display().to_string(),
            source,
        })?;
        line.push('\n');
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| io_error(&path, source))?;
        file.write_all(line.as_bytes())
            .map_err(|source| io_error(&path, source))
    }

    fn list_logs(&self, workload: Option<&str>) -> Result<Vec<DeploymentLog>, StoreError> {
        let path = self.log_path();
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(io_error(&path, source)),
        };

        let mut entries = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| io_error(&path, source))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DeploymentLog>(&line) {
                Ok(entry) if matches_workload(&entry, workload) => entries.push(entry),
                Ok(_) => {}
                // A torn final line from an interrupted append is skipped, not fatal.
                Err(err) => warn!(path = %path.display(), line = lineno + 1, "skipping unreadable log entry: {err}"),
            }
        }
        Ok(entries)
    }
}
