pub mod record;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{instrument, warn};

use crate::date::Date;
use crate::ip::IpAddr4;
use crate::tariff::Tariff;

pub use record::{Record, RecordError, TRAFFIC_SLOTS};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("index {0} is out of range")]
    IndexOutOfRange(usize),
    #[error("no current file is set")]
    NoCurrentFile,
    #[error("cannot open {path}: {source}")]
    CannotOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Optional search criteria shared by `SELECT`, `DELETE`, `EDIT` and
/// `CALCULATE_CHARGES`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub name: Option<String>,
    pub ip: Option<IpAddr4>,
    pub date: Option<Date>,
}

impl Criteria {
    fn matches(&self, record: &Record) -> bool {
        self.name.as_deref().is_none_or(|n| n == record.name())
            && self.ip.is_none_or(|ip| ip == record.ip())
            && self.date.is_none_or(|d| d == record.date())
    }
}

/// The in-memory ordered list of records plus the last file used for
/// load/save. All operations here assume single-threaded access; callers
/// (the session loop) are responsible for holding the store's rw-lock for
/// the duration of a request.
#[derive(Debug, Default)]
pub struct Store {
    records: Vec<Record>,
    current_file: Option<PathBuf>,
}

impl Store {
    #[must_use]
    pub fn current_file(&self) -> Option<&Path> {
        self.current_file.as_deref()
    }

    pub fn add_record(&mut self, record: Record) {
        self.records.push(record);
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Result<Record, StoreError> {
        self.records
            .get(index)
            .cloned()
            .ok_or(StoreError::IndexOutOfRange(index))
    }

    pub fn edit_record(&mut self, index: usize, record: Record) -> Result<(), StoreError> {
        let slot = self
            .records
            .get_mut(index)
            .ok_or(StoreError::IndexOutOfRange(index))?;
        *slot = record;
        Ok(())
    }

    #[must_use]
    pub fn find_by_criteria(&self, criteria: &Criteria) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| criteria.matches(record))
            .map(|(index, _)| index)
            .collect()
    }

    /// Drops duplicate/out-of-range indices, then removes the survivors in
    /// descending order so earlier removals don't shift later indices.
    pub fn delete_by_indices(&mut self, indices: &[usize]) -> usize {
        let mut unique: Vec<usize> = indices
            .iter()
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter(|&i| i < self.records.len())
            .collect();
        unique.sort_unstable_by(|a, b| b.cmp(a));
        for index in &unique {
            self.records.remove(*index);
        }
        unique.len()
    }

    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub async fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize, StoreError> {
        let path = path.as_ref();
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| StoreError::CannotOpen {
                    path: path.display().to_string(),
                    source,
                })?;

        let mut records = Vec::new();
        let mut skipped = 0usize;
        let mut lines = contents.lines().peekable();

        while lines.peek().is_some() {
            while lines.peek().is_some_and(|l| l.trim().is_empty()) {
                lines.next();
            }
            if lines.peek().is_none() {
                break;
            }

            let mut checkpoint = lines.clone();
            match Record::parse(&mut checkpoint) {
                Ok(record) => {
                    records.push(record);
                    lines = checkpoint;
                }
                Err(err) => {
                    warn!(%err, "skipping malformed record");
                    skipped += 1;
                    if lines.next().is_none() {
                        break;
                    }
                }
            }
        }

        self.records = records;
        self.current_file = Some(path.to_path_buf());
        Ok(skipped)
    }

    #[instrument(skip(self), fields(path))]
    pub async fn save_file(&mut self, path: Option<&Path>) -> Result<(), StoreError> {
        let target = match path {
            Some(p) => p.to_path_buf(),
            None => self
                .current_file
                .clone()
                .ok_or(StoreError::NoCurrentFile)?,
        };

        let body = self
            .records
            .iter()
            .map(Record::to_string)
            .collect::<Vec<_>>()
            .join("\n\n");

        tokio::fs::write(&target, body)
            .await
            .map_err(|source| StoreError::Io {
                path: target.display().to_string(),
                source,
            })?;

        self.current_file = Some(target);
        Ok(())
    }

    /// No parsed command reaches this directly; `LOAD` replaces the list
    /// wholesale instead (spec.md §3/§4.2), but the op is part of C2's
    /// contract in its own right.
    pub fn clear_all(&mut self) {
        self.records.clear();
        self.current_file = None;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The single shared record store, guarded by one reader/writer lock (C10).
/// Callers acquire this lock for the full duration of handler dispatch and
/// reply serialization so a consistent snapshot is transmitted.
pub static STORE: LazyLock<Arc<RwLock<Store>>> =
    LazyLock::new(|| Arc::new(RwLock::new(Store::default())));

/// Charge for one record under `tariff`, counted only if `record.date()`
/// falls within the inclusive `[from, to]` range.
#[must_use]
pub fn calc_for_record(record: &Record, tariff: &Tariff, from: &Date, to: &Date) -> f64 {
    if !record.date().in_range(from, to) {
        return 0.0;
    }

    let mut total = 0.0;
    for hour in 0..TRAFFIC_SLOTS {
        let in_rate = match tariff.in_rate(hour) {
            Ok(rate) => rate,
            Err(err) => {
                warn!(%err, "tariff lookup failed, charging zero for hour");
                continue;
            }
        };
        let out_rate = match tariff.out_rate(hour) {
            Ok(rate) => rate,
            Err(err) => {
                warn!(%err, "tariff lookup failed, charging zero for hour");
                continue;
            }
        };
        total += record.traffic_in()[hour] * in_rate + record.traffic_out()[hour] * out_rate;
    }
    total
}
