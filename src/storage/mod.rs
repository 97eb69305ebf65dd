//!
//! service-hours storage module
//! ----------------------------
//! The application keeps every document (users, entries, running totals) in a
//! key/value document store addressed by `/`-separated paths:
//!
//! - `users/<code>`              one user record per email
//! - `entries/<code>/<push key>` one service-hour entry
//! - `totals/<code>`             running hour total for the user
//!
//! `<code>` is the email with `.` replaced by `^` (see [`code_email`]).
//!
//! `DocumentStore` is the seam to the backing service. It offers plain
//! get/set/delete/list, versioned compare-and-swap over one or several
//! documents for read-modify-write transactions ([`transact`],
//! [`transact_many`]), ordered push keys, and an atomic multi-document update
//! over a prefix. `MemoryStore` is the bundled implementation.

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

pub mod kv;
mod push_key;

pub use kv::{MemoryStore, PersistenceSettings};
pub use push_key::PushKeyGenerator;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(String),
    #[error("store encoding error: {0}")]
    Encoding(String),
    /// A transaction kept losing to concurrent writers.
    #[error("conflicting update on {0}")]
    Conflict(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A stored document together with its version.
/// Versions strictly increase on every write of the same key.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub value: JsonValue,
    pub version: u64,
}

/// One write produced by [`DocumentStore::update_children`].
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Set { key: String, value: JsonValue },
    Delete { key: String },
}

/// One conditional write inside [`DocumentStore::compare_and_swap_many`].
#[derive(Debug, Clone, PartialEq)]
pub struct Cas {
    pub key: String,
    /// `None` = the key must be absent.
    pub expected: Option<u64>,
    /// `None` deletes.
    pub new: Option<JsonValue>,
}

pub trait DocumentStore: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<JsonValue>> {
        Ok(self.get_versioned(key)?.map(|v| v.value))
    }

    fn get_versioned(&self, key: &str) -> StoreResult<Option<Versioned>>;

    fn set(&self, key: &str, value: JsonValue) -> StoreResult<()>;

    /// Returns whether a document existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Apply every write in `ops` only if each key is still at its expected
    /// version; otherwise nothing is written and false is returned. No other
    /// write interleaves with the check and the writes.
    fn compare_and_swap_many(&self, ops: Vec<Cas>) -> StoreResult<bool>;

    /// Write `new` (or delete when `None`) only if the current version is
    /// `expected` (`None` = the key must be absent). Returns false on mismatch.
    fn compare_and_swap(&self, key: &str, expected: Option<u64>, new: Option<JsonValue>) -> StoreResult<bool> {
        self.compare_and_swap_many(vec![Cas { key: key.to_string(), expected, new }])
    }

    /// Direct children and descendants of `prefix`, ordered by key.
    fn list(&self, prefix: &str) -> StoreResult<Vec<(String, JsonValue)>>;

    /// A fresh child key; later calls sort after earlier ones.
    fn push_key(&self) -> String;

    /// Store `value` under `<prefix>/<fresh push key>` and return the push key.
    fn push(&self, prefix: &str, value: JsonValue) -> StoreResult<String> {
        for _ in 0..MAX_TRANSACT_ATTEMPTS {
            let child = self.push_key();
            validate_segment(&child)?;
            let key = format!("{}/{}", prefix.trim_end_matches('/'), child);
            // the absent check guards against documents loaded from an older snapshot
            if self.compare_and_swap(&key, None, Some(value.clone()))? {
                return Ok(child);
            }
        }
        Err(StoreError::Conflict(prefix.to_string()))
    }

    /// Run `f` over the documents under `prefix` and apply its writes atomically:
    /// no other write to the store interleaves between the read and the writes.
    fn update_children(
        &self,
        prefix: &str,
        f: &mut dyn FnMut(Vec<(String, JsonValue)>) -> Vec<Write>,
    ) -> StoreResult<usize>;
}

/// Attempts a transaction makes before giving up with [`StoreError::Conflict`].
pub const MAX_TRANSACT_ATTEMPTS: u32 = 1_000;

/// Values seen on the committing attempt, and what was written
/// (`None` when the transaction declined to write).
pub type Committed = (Vec<Option<JsonValue>>, Option<Vec<Option<JsonValue>>>);

/// Read-modify-write over several documents, committed with one
/// [`DocumentStore::compare_and_swap_many`].
///
/// `f` sees the current value of each key (in `keys` order) and returns one
/// replacement per key (`None` deletes), or `None` to stop without writing.
/// `f` may run several times under contention, so it must not have side
/// effects beyond what it returns.
pub fn transact_many<S, F>(store: &S, keys: &[String], mut f: F) -> StoreResult<Committed>
where
    S: DocumentStore + ?Sized,
    F: FnMut(&[Option<JsonValue>]) -> Option<Vec<Option<JsonValue>>>,
{
    for attempt in 0..MAX_TRANSACT_ATTEMPTS {
        let mut seen = Vec::with_capacity(keys.len());
        let mut versions = Vec::with_capacity(keys.len());
        for key in keys {
            match store.get_versioned(key)? {
                Some(v) => {
                    seen.push(Some(v.value));
                    versions.push(Some(v.version));
                }
                None => {
                    seen.push(None);
                    versions.push(None);
                }
            }
        }
        let Some(next) = f(&seen) else {
            return Ok((seen, None));
        };
        debug_assert_eq!(next.len(), keys.len(), "one write per key");
        let ops = keys
            .iter()
            .zip(versions)
            .zip(next.iter().cloned())
            .map(|((key, expected), new)| Cas { key: key.clone(), expected, new })
            .collect();
        if store.compare_and_swap_many(ops)? {
            if attempt > 0 {
                debug!(target: "service_hours::store", keys = ?keys, attempt, "transaction committed after retries");
            }
            return Ok((seen, Some(next)));
        }
        std::thread::yield_now();
    }
    warn!(target: "service_hours::store", keys = ?keys, attempts = MAX_TRANSACT_ATTEMPTS, "transaction gave up");
    Err(StoreError::Conflict(keys.join(", ")))
}

/// Read-modify-write on a single document.
///
/// `f` sees the current value (or `None`) and returns the replacement (or
/// `None` to delete). Returns the value `f` saw on the attempt that
/// committed, paired with what was written.
pub fn transact<S, F>(store: &S, key: &str, mut f: F) -> StoreResult<(Option<JsonValue>, Option<JsonValue>)>
where
    S: DocumentStore + ?Sized,
    F: FnMut(Option<&JsonValue>) -> Option<JsonValue>,
{
    let (mut seen, written) = transact_many(store, &[key.to_string()], |cur| Some(vec![f(cur[0].as_ref())]))?;
    Ok((seen.pop().flatten(), written.and_then(|mut w| w.pop()).flatten()))
}

/// Encode an email so it is usable as a single path segment.
/// `/` would split the path and `^` would collide with an encoded `.`.
pub fn code_email(email: &str) -> StoreResult<String> {
    if email.contains('^') || email.contains(char::is_whitespace) {
        return Err(StoreError::InvalidKey(email.to_string()));
    }
    let code = email.replace('.', "^");
    validate_segment(&code)?;
    Ok(code)
}

pub fn decode_email(code: &str) -> String {
    code.replace('^', ".")
}

pub fn user_key(email: &str) -> StoreResult<String> { Ok(format!("users/{}", code_email(email)?)) }
pub fn entries_prefix(email: &str) -> StoreResult<String> { Ok(format!("entries/{}", code_email(email)?)) }
pub fn total_key(email: &str) -> StoreResult<String> { Ok(format!("totals/{}", code_email(email)?)) }

pub fn entry_key(email: &str, key: &str) -> StoreResult<String> {
    validate_segment(key)?;
    Ok(format!("entries/{}/{}", code_email(email)?, key))
}

/// Reject keys that would escape their parent path.
pub fn validate_segment(segment: &str) -> StoreResult<()> {
    if segment.is_empty() || segment.contains('/') || segment == "." || segment == ".." {
        return Err(StoreError::InvalidKey(segment.to_string()));
    }
    Ok(())
}
