use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, ser::PrettyFormatter};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::history::{History, HistoryEntry};
use crate::types::{LibraryEntry, ResultRecord};

const HISTORY_KEY: &str = "history";
const LIBRARY_KEY: &str = "library";

/// On-disk document. Keys this version does not know about are carried through
/// untouched.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedStore {
    #[serde(default)]
    pub history: History,
    #[serde(default)]
    pub library: BTreeMap<String, LibraryEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Watch history and tracked library, backed by one JSON file.
///
/// Loaded once at startup and written back explicitly; mutations in between
/// live only in memory.
#[derive(Debug)]
pub struct LibraryStore {
    path: PathBuf,
    doc: PersistedStore,
}

impl LibraryStore {
    /// Missing or unreadable files yield an empty store. An unreadable file is
    /// moved aside to `<name>.bak` so the next save cannot clobber it.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = match read_document(&path) {
            Ok(Some(doc)) => doc,
            Ok(None) => PersistedStore::default(),
            Err(err) => {
                warn!(%err, "starting with an empty library");
                let backup = backup_path(&path);
                match fs::rename(&path, &backup) {
                    Ok(()) => warn!(backup = %backup.display(), "unreadable store moved aside"),
                    Err(err) => warn!(%err, "could not move unreadable store aside"),
                }
                PersistedStore::default()
            }
        };
        info!(
            path = %path.display(),
            history = doc.history.len(),
            library = doc.library.len(),
            "store loaded"
        );
        Self { path, doc }
    }

    pub fn save(&self) -> Result<()> {
        let err = |reason: String| Error::Persistence {
            path: self.path.clone(),
            reason,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| err(e.to_string()))?;
        }
        let mut buf = Vec::new();
        let mut ser =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        self.doc
            .serialize(&mut ser)
            .map_err(|e| err(e.to_string()))?;
        fs::write(&self.path, buf).map_err(|e| err(e.to_string()))?;
        info!(path = %self.path.display(), "store saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw top-level access, as the document would show it.
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            HISTORY_KEY => serde_json::to_value(&self.doc.history).ok(),
            LIBRARY_KEY => serde_json::to_value(&self.doc.library).ok(),
            other => self.doc.extra.get(other).cloned(),
        }
    }

    /// `history` and `library` must keep their shapes; other keys are stored as given.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let err = |reason: String| Error::Persistence {
            path: self.path.clone(),
            reason: format!("{key}: {reason}"),
        };
        match key {
            HISTORY_KEY => {
                self.doc.history = serde_json::from_value(value).map_err(|e| err(e.to_string()))?
            }
            LIBRARY_KEY => {
                self.doc.library = serde_json::from_value(value).map_err(|e| err(e.to_string()))?
            }
            other => {
                self.doc.extra.insert(other.to_string(), value);
            }
        }
        Ok(())
    }

    pub fn history(&self) -> &History {
        &self.doc.history
    }

    pub fn record_history(&mut self, entry: HistoryEntry) -> bool {
        self.doc.history.record(entry)
    }

    pub fn library(&self) -> &BTreeMap<String, LibraryEntry> {
        &self.doc.library
    }

    pub fn library_mut(&mut self) -> &mut BTreeMap<String, LibraryEntry> {
        &mut self.doc.library
    }

    /// Returns false when the id was already tracked; the stored entry is refreshed either way.
    pub fn track(&mut self, record: ResultRecord) -> bool {
        self.doc
            .library
            .insert(record.id.clone(), record)
            .is_none()
    }

    pub fn untrack(&mut self, id: &str) -> Option<LibraryEntry> {
        self.doc.library.remove(id)
    }

    pub fn is_tracked(&self, id: &str) -> bool {
        self.doc.library.contains_key(id)
    }
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}

fn read_document(path: &Path) -> Result<Option<PersistedStore>> {
    if !path.exists() {
        return Ok(None);
    }
    let err = |reason: String| Error::Persistence {
        path: path.to_path_buf(),
        reason,
    };
    let data = fs::read_to_string(path).map_err(|e| err(e.to_string()))?;
    let doc = serde_json::from_str(&data).map_err(|e| err(e.to_string()))?;
    Ok(Some(doc))
}
