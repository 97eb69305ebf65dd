//! User directory: email -> user record, backed by the document store.
//!
//! Records come from the roster import (bulk replace) or are created on the
//! first verified sign-in of someone not on the roster. Admin flags are owned
//! by the directory and survive roster replacement.

mod roster;
mod user;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::info;

pub use roster::{parse_admin_list, parse_roster_csv};
pub use user::{User, HOURS_PER_YEAR};

use crate::error::AppResult;
use crate::identity::VerifiedIdentity;
use crate::storage::{self, transact, DocumentStore, StoreError, Write};

/// Outcome counts of a roster replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RosterSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeGroup {
    pub grade: i64,
    pub students: Vec<User>,
}

#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn DocumentStore>,
}

fn decode_user(key: &str, v: JsonValue) -> Result<User, StoreError> {
    serde_json::from_value(v).map_err(|e| StoreError::Encoding(format!("{key}: {e}")))
}

fn encode_user(u: &User) -> Result<JsonValue, StoreError> {
    serde_json::to_value(u).map_err(|e| StoreError::Encoding(e.to_string()))
}

impl UserDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self { Self { store } }

    pub fn find(&self, email: &str) -> AppResult<Option<User>> {
        let key = storage::user_key(email)?;
        match self.store.get(&key)? {
            Some(v) => Ok(Some(decode_user(&key, v)?)),
            None => Ok(None),
        }
    }

    /// Look up a user; unknown emails yield a non-admin placeholder record.
    pub fn get(&self, email: &str) -> AppResult<User> {
        Ok(self.find(email)?.unwrap_or_else(|| User::placeholder(email)))
    }

    pub fn put(&self, user: &User) -> AppResult<()> {
        self.store.set(&storage::user_key(&user.email)?, encode_user(user)?)?;
        Ok(())
    }

    /// Directory record for a verified identity, creating it on first sign-in
    /// and filling in the display name while the stored one is a placeholder.
    pub fn resolve_identity(&self, identity: &VerifiedIdentity) -> AppResult<User> {
        let key = storage::user_key(&identity.email)?;
        let mut failure: Option<StoreError> = None;
        let (_, written) = transact(self.store.as_ref(), &key, |cur| {
            let mut user = match cur.map(|v| decode_user(&key, v.clone())) {
                Some(Ok(u)) => u,
                Some(Err(e)) => {
                    failure = Some(e);
                    return cur.cloned();
                }
                None => User::placeholder(&identity.email),
            };
            if user.is_placeholder_name() && !identity.name.is_empty() {
                user.name = identity.name.clone();
            }
            user.email = identity.email.clone();
            match encode_user(&user) {
                Ok(v) => Some(v),
                Err(e) => {
                    failure = Some(e);
                    cur.cloned()
                }
            }
        })?;
        if let Some(e) = failure {
            return Err(e.into());
        }
        match written {
            Some(v) => Ok(decode_user(&key, v)?),
            None => Ok(User::placeholder(&identity.email)),
        }
    }

    /// Replace the roster: non-admin users missing from `users` are removed,
    /// listed users are inserted or updated keeping their stored admin flag.
    /// Admins missing from the list are kept untouched.
    pub fn replace_roster(&self, users: &[User]) -> AppResult<RosterSummary> {
        let incoming = users
            .iter()
            .map(|u| Ok((storage::user_key(&u.email)?, u)))
            .collect::<Result<HashMap<String, &User>, StoreError>>()?;
        let mut summary = RosterSummary::default();
        let mut failure: Option<StoreError> = None;

        self.store.update_children("users", &mut |existing| {
            summary = RosterSummary::default();
            let mut writes = Vec::new();
            let mut stored_admin: HashMap<String, bool> = HashMap::new();
            for (key, value) in existing {
                let admin = value.get("admin").and_then(|a| a.as_bool()).unwrap_or(false);
                stored_admin.insert(key.clone(), admin);
                if !admin && !incoming.contains_key(&key) {
                    writes.push(Write::Delete { key });
                    summary.removed += 1;
                }
            }
            for (key, u) in incoming.iter() {
                let mut rec = (*u).clone();
                match stored_admin.get(key) {
                    Some(admin) => {
                        rec.admin = *admin;
                        summary.updated += 1;
                    }
                    None => {
                        rec.admin = false;
                        summary.added += 1;
                    }
                }
                match encode_user(&rec) {
                    Ok(value) => writes.push(Write::Set { key: key.clone(), value }),
                    Err(e) => {
                        failure = Some(e);
                        return Vec::new();
                    }
                }
            }
            writes
        })?;
        if let Some(e) = failure {
            return Err(e.into());
        }
        info!(
            target: "service_hours::directory",
            added = summary.added, updated = summary.updated, removed = summary.removed,
            "roster replaced"
        );
        Ok(summary)
    }

    /// Mark each email as an administrator, creating placeholder records as needed.
    pub fn grant_admins(&self, emails: &[String]) -> AppResult<usize> {
        let mut granted = 0;
        for email in emails {
            let key = storage::user_key(email)?;
            let mut failure: Option<StoreError> = None;
            transact(self.store.as_ref(), &key, |cur| {
                let mut user = match cur.map(|v| decode_user(&key, v.clone())) {
                    Some(Ok(u)) => u,
                    Some(Err(e)) => {
                        failure = Some(e);
                        return cur.cloned();
                    }
                    None => User::placeholder(email),
                };
                user.admin = true;
                match encode_user(&user) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        failure = Some(e);
                        cur.cloned()
                    }
                }
            })?;
            if let Some(e) = failure {
                return Err(e.into());
            }
            granted += 1;
        }
        info!(target: "service_hours::directory", granted, "admin flags granted");
        Ok(granted)
    }

    /// Every user, sorted by name.
    pub fn list(&self) -> AppResult<Vec<User>> {
        let mut out = Vec::new();
        for (key, value) in self.store.list("users")? {
            out.push(decode_user(&key, value)?);
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.email.cmp(&b.email)));
        Ok(out)
    }

    /// Students with a known graduation year who are still in school,
    /// grouped by school grade (highest first), names ascending.
    pub fn students_by_grade(&self, today: NaiveDate) -> AppResult<Vec<GradeGroup>> {
        let mut groups: BTreeMap<i64, Vec<User>> = BTreeMap::new();
        for u in self.list()? {
            if u.grade == 0 {
                continue;
            }
            let g = u.school_grade(today);
            if g <= 12 {
                groups.entry(g).or_default().push(u);
            }
        }
        Ok(groups
            .into_iter()
            .rev()
            .map(|(grade, students)| GradeGroup { grade, students })
            .collect())
    }
}

#[cfg(test)]
#[path = "directory_tests.rs"]
mod directory_tests;
