//! Event code enrichment table.
//!
//! The table is a CSV file with the columns `Eventid`, `Description` and
//! `See on`, produced by [`builder::LookupBuilder`]. It is loaded once at
//! startup and only read afterwards.

/// Builds the table from the online encyclopedia.
pub mod builder;

use std::{
    collections::{HashMap, hash_map::Entry},
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use builder::LookupBuilder;

/// Failures reading or building the lookup table.
#[derive(Error, Debug)]
pub enum LookupError {
    /// The file could not be read or written.
    #[error("failed to read lookup table {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The CSV could not be read or written.
    #[error("invalid lookup table: {0}")]
    Csv(#[from] csv::Error),

    /// The encyclopedia could not be downloaded.
    #[error("failed to fetch lookup source: {0}")]
    Fetch(#[from] reqwest::Error),

    /// The encyclopedia page had no usable rows.
    #[error("could not parse lookup source: {0}")]
    Parse(String),
}

/// Description and reference link for one event code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupEntry {
    /// Human-readable event description.
    pub description: String,
    /// Documentation link for the event.
    pub reference_url: String,
}

/// One CSV row, as written by the builder and read by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRow {
    /// Event id as text.
    #[serde(rename = "Eventid")]
    pub event_id: String,
    /// Event description.
    #[serde(rename = "Description")]
    pub description: String,
    /// Documentation link.
    #[serde(rename = "See on")]
    pub see_on: String,
}

/// Event code to enrichment map.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: HashMap<u32, LookupEntry>,
}

impl LookupTable {
    /// Reads the table at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LookupError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LookupError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_reader(file)?;
        info!(
            path = %path.display(),
            entries = table.len(),
            "loaded event code lookup table"
        );
        Ok(table)
    }

    /// Reads a CSV table. Rows that do not fit the header are skipped; only
    /// I/O failures abort the read.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LookupError> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut rows = Vec::new();
        for row in csv.deserialize::<LookupRow>() {
            match row {
                Ok(row) => rows.push(row),
                Err(err) if err.is_io_error() => return Err(err.into()),
                Err(err) => warn!(error = %err, "skipping malformed lookup row"),
            }
        }
        Ok(Self::from_rows(rows))
    }

    /// Builds the table from raw rows. Rows with a non-numeric id are skipped
    /// and the first row wins for duplicate ids.
    pub fn from_rows(rows: impl IntoIterator<Item = LookupRow>) -> Self {
        let mut entries = HashMap::new();
        for row in rows {
            let Ok(code) = row.event_id.trim().parse::<u32>() else {
                warn!(event_id = %row.event_id, "skipping lookup row with invalid event id");
                continue;
            };

            match entries.entry(code) {
                Entry::Vacant(slot) => {
                    slot.insert(LookupEntry {
                        description: row.description,
                        reference_url: row.see_on,
                    });
                }
                Entry::Occupied(_) => {
                    debug!(event_code = code, "duplicate lookup row ignored");
                }
            }
        }
        Self { entries }
    }

    /// Enrichment for `event_code`, if the table knows it.
    pub fn get(&self, event_code: u32) -> Option<&LookupEntry> {
        self.entries.get(&event_code)
    }

    /// Number of known event codes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no event code is known.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
