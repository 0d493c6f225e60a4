//! Checkpoint: el conjunto durable de ids de jobs completados.
//!
//! El archivo vive junto al manifiesto. Si existe, la corrida está
//! incompleta; una corrida limpia lo borra al salir.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::error::CheckpointError;
use crate::job::JobId;

pub const CHECKPOINT_FILE_NAME: &str = ".running";

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    completed: BTreeSet<JobId>,
    updated_at: DateTime<Utc>,
}

/// Lee el conjunto completado, o `None` si no hay checkpoint (corrida nueva).
pub fn load(path: &Path) -> Result<Option<BTreeSet<JobId>>, CheckpointError> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CheckpointError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let snapshot: Snapshot =
        serde_json::from_slice(&raw).map_err(|source| CheckpointError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(Some(snapshot.completed))
}

/// Reemplaza el checkpoint con `completed`. El contenido nuevo se escribe en un
/// archivo temporal hermano y se renombra encima del viejo: quien lea ve el
/// snapshot anterior o el nuevo.
pub fn save(path: &Path, completed: &BTreeSet<JobId>) -> Result<(), CheckpointError> {
    let snapshot = Snapshot {
        completed: completed.clone(),
        updated_at: Utc::now(),
    };
    let bytes = serde_json::to_vec(&snapshot)?;

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(CHECKPOINT_FILE_NAME);
    let tmp = path.with_file_name(format!("{}.tmp.{}", name, std::process::id()));

    let to_err = |source| CheckpointError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::create(&tmp).map_err(to_err)?;
    file.write_all(&bytes).map_err(to_err)?;
    file.sync_all().map_err(to_err)?;
    drop(file);
    fs::rename(&tmp, path).map_err(to_err)?;

    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// Archivo de checkpoint ligado al directorio de un manifiesto.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(CHECKPOINT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<Option<BTreeSet<JobId>>, CheckpointError> {
        load(&self.path)
    }

    pub fn save(&self, completed: &BTreeSet<JobId>) -> Result<(), CheckpointError> {
        save(&self.path, completed)
    }

    /// Borra el checkpoint. Devuelve si el archivo existía.
    pub fn remove(&self) -> Result<bool, CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CheckpointError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> BTreeSet<JobId> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_file_means_fresh_start() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::in_dir(tmp.path());
        assert!(!store.exists());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save_overwrites_the_whole_set() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::in_dir(tmp.path());

        store.save(&ids(&["1", "2"])).unwrap();
        assert_eq!(store.load().unwrap(), Some(ids(&["1", "2"])));

        store.save(&ids(&["1", "2", "3"])).unwrap();
        assert_eq!(store.load().unwrap(), Some(ids(&["1", "2", "3"])));

        // no queda ningún temporal
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(leftovers, vec![CHECKPOINT_FILE_NAME.to_string()]);
    }

    #[test]
    fn empty_set_still_marks_the_run_incomplete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::in_dir(tmp.path());
        store.save(&BTreeSet::new()).unwrap();
        assert!(store.exists());
        assert_eq!(store.load().unwrap(), Some(BTreeSet::new()));
    }

    #[test]
    fn remove_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::in_dir(tmp.path());
        store.save(&ids(&["a"])).unwrap();

        assert!(store.remove().unwrap());
        assert!(!store.exists());
        assert!(!store.remove().unwrap());
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_fresh_start() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::in_dir(tmp.path());
        fs::write(store.path(), b"\x80\x03pickle").unwrap();
        assert!(matches!(store.load(), Err(CheckpointError::Corrupt { .. })));
    }
}
