//! JSON file persistence.

use crate::error::StoreResult;
use crate::persistence::Persistence;
use parking_lot::Mutex;
use quotesync_protocol::Snapshot;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A file-based persistence backend storing the snapshot as JSON.
///
/// Data survives process restarts.
///
/// # Durability
///
/// `save()` writes the whole snapshot to a sibling `.tmp` file, syncs it and
/// renames it over the target, so a crash leaves either the old or the new
/// snapshot on disk, never a torn one.
///
/// # Example
///
/// ```no_run
/// use quotesync_protocol::Snapshot;
/// use quotesync_store::{JsonFilePersistence, Persistence};
/// use std::path::Path;
///
/// let persistence = JsonFilePersistence::open(Path::new("quotes.json")).unwrap();
/// persistence.save(&Snapshot::empty()).unwrap();
/// ```
#[derive(Debug)]
pub struct JsonFilePersistence {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFilePersistence {
    /// Creates a backend for `path`. The file is created on first save.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` exists but is a directory.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if path.is_dir() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            )
            .into());
        }
        Ok(Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Like [`open`](Self::open), creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created.
    pub fn open_with_create_dirs(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl Persistence for JsonFilePersistence {
    fn load(&self) -> StoreResult<Option<Snapshot>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, snapshot: &Snapshot) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let json = serde_json::to_vec_pretty(snapshot)?;

        let temp = self.temp_path();
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}
