//! Per-user service-hour entries and their running totals.
//!
//! Entries live under `entries/<code>/<push key>`; the sum of their hours is
//! kept in `totals/<code>`. Add, set and remove commit the entry and the
//! moved total in one multi-document transaction, so the total equals the
//! sum of hours in every committed state, including after a failed write.

mod entry;
mod form;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

pub use entry::{format_phone, Entry, EDIT_WINDOW_DAYS, FLAG_HOURS, FLAG_KEYWORDS};
pub use form::{parse_phone, Defaulted, EntryForm, ParsedEntry, DATE_FORMAT, DEFAULT_HOURS};

use crate::error::{AppError, AppResult};
use crate::storage::{self, transact, transact_many, DocumentStore, StoreError};

/// A flagged entry together with its owner, for the review page.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FlaggedEntry {
    pub email: String,
    pub key: String,
    pub entry: Entry,
}

#[derive(Clone)]
pub struct EntryStore {
    store: Arc<dyn DocumentStore>,
}

fn decode_entry(key: &str, v: JsonValue) -> Result<Entry, StoreError> {
    serde_json::from_value(v).map_err(|e| StoreError::Encoding(format!("{key}: {e}")))
}

fn encode_entry(e: &Entry) -> Result<JsonValue, StoreError> {
    serde_json::to_value(e).map_err(|e| StoreError::Encoding(e.to_string()))
}

/// Fresh push keys tried before `add` gives up.
const MAX_KEY_DRAWS: usize = 8;

fn not_found(email: &str, key: &str) -> AppError {
    AppError::not_found("entry_not_found".to_string(), format!("no entry {key} for {email}"))
}

impl EntryStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self { Self { store } }

    pub fn get(&self, email: &str, key: &str) -> AppResult<Entry> {
        let path = self.entry_path(email, key)?;
        match self.store.get(&path)? {
            Some(v) => Ok(decode_entry(&path, v)?),
            None => Err(not_found(email, key)),
        }
    }

    /// Store a new entry and return its key. The flag is recomputed first.
    pub fn add(&self, email: &str, entry: &Entry) -> AppResult<String> {
        let mut entry = entry.clone();
        entry.refresh_flagged();
        let value = encode_entry(&entry)?;
        let prefix = storage::entries_prefix(email)?;
        let total = storage::total_key(email)?;
        for _ in 0..MAX_KEY_DRAWS {
            let key = self.store.push_key();
            let keys = [format!("{prefix}/{key}"), total.clone()];
            let (_, written) = transact_many(self.store.as_ref(), &keys, |cur| {
                if cur[0].is_some() {
                    return None;
                }
                Some(vec![Some(value.clone()), Some(json!(stored_total(&cur[1]) + entry.hours as i64))])
            })?;
            if written.is_some() {
                debug!(target: "service_hours::entries", email, key = %key, hours = entry.hours, "entry added");
                return Ok(key);
            }
        }
        Err(StoreError::Conflict(prefix).into())
    }

    /// Replace an existing entry. The flag is recomputed; the total moves by
    /// the difference in hours.
    pub fn set(&self, email: &str, key: &str, entry: &Entry) -> AppResult<()> {
        let path = self.entry_path(email, key)?;
        let mut entry = entry.clone();
        entry.refresh_flagged();
        let value = encode_entry(&entry)?;
        let keys = [path.clone(), storage::total_key(email)?];
        let mut failure: Option<StoreError> = None;
        let mut delta = 0;
        let (_, written) = transact_many(self.store.as_ref(), &keys, |cur| {
            let old = match cur[0].clone().map(|v| decode_entry(&path, v))? {
                Ok(old) => old,
                Err(e) => {
                    failure = Some(e);
                    return None;
                }
            };
            delta = entry.hours as i64 - old.hours as i64;
            Some(vec![Some(value.clone()), Some(json!(stored_total(&cur[1]) + delta))])
        })?;
        if let Some(e) = failure {
            return Err(e.into());
        }
        if written.is_none() {
            return Err(not_found(email, key));
        }
        debug!(target: "service_hours::entries", email, key, delta, "entry updated");
        Ok(())
    }

    pub fn remove(&self, email: &str, key: &str) -> AppResult<()> {
        let path = self.entry_path(email, key)?;
        let keys = [path.clone(), storage::total_key(email)?];
        let mut failure: Option<StoreError> = None;
        let mut hours = 0;
        let (_, written) = transact_many(self.store.as_ref(), &keys, |cur| {
            let old = match cur[0].clone().map(|v| decode_entry(&path, v))? {
                Ok(old) => old,
                Err(e) => {
                    failure = Some(e);
                    return None;
                }
            };
            hours = old.hours;
            Some(vec![None, Some(json!(stored_total(&cur[1]) - old.hours as i64))])
        })?;
        if let Some(e) = failure {
            return Err(e.into());
        }
        if written.is_none() {
            return Err(not_found(email, key));
        }
        debug!(target: "service_hours::entries", email, key, hours, "entry removed");
        Ok(())
    }

    /// Override the review flag without touching anything else.
    pub fn flag(&self, email: &str, key: &str, flagged: bool) -> AppResult<()> {
        let path = self.entry_path(email, key)?;
        let (seen, _) = transact(self.store.as_ref(), &path, |cur| {
            let mut v = cur?.clone();
            if let Some(obj) = v.as_object_mut() {
                if flagged {
                    obj.insert("flagged".into(), json!(true));
                } else {
                    obj.remove("flagged");
                }
            }
            Some(v)
        })?;
        if seen.is_none() {
            return Err(not_found(email, key));
        }
        Ok(())
    }

    /// Entries of one user, ordered by key (creation order).
    pub fn list(&self, email: &str) -> AppResult<Vec<(String, Entry)>> {
        let prefix = storage::entries_prefix(email)?;
        let mut out = Vec::new();
        for (path, value) in self.store.list(&prefix)? {
            let key = path.rsplit('/').next().unwrap_or_default().to_string();
            out.push((key, decode_entry(&path, value)?));
        }
        Ok(out)
    }

    pub fn total(&self, email: &str) -> AppResult<u64> {
        let raw = self.store.get(&storage::total_key(email)?)?;
        Ok(stored_total(&raw).max(0) as u64)
    }

    /// Every flagged entry across all users.
    pub fn list_flagged(&self) -> AppResult<Vec<FlaggedEntry>> {
        let mut out = Vec::new();
        for (path, value) in self.store.list("entries")? {
            if value.get("flagged").and_then(|f| f.as_bool()) != Some(true) {
                continue;
            }
            // entries/<code>/<key>
            let mut parts = path.splitn(3, '/').skip(1);
            let (Some(code), Some(key)) = (parts.next(), parts.next()) else { continue };
            out.push(FlaggedEntry {
                email: storage::decode_email(code),
                key: key.to_string(),
                entry: decode_entry(&path, value)?,
            });
        }
        Ok(out)
    }

    /// Storage path of one entry; a key that is not a single path segment
    /// cannot name an entry.
    fn entry_path(&self, email: &str, key: &str) -> AppResult<String> {
        storage::validate_segment(key).map_err(|_| not_found(email, key))?;
        Ok(storage::entry_key(email, key)?)
    }
}

fn stored_total(v: &Option<JsonValue>) -> i64 {
    v.as_ref().and_then(|v| v.as_i64()).unwrap_or(0)
}

#[cfg(test)]
#[path = "entries_tests.rs"]
mod entries_tests;
