//! POST /do/* handlers. Each mutation checks the session, authorizes the
//! caller against the target student and answers with a redirect.

use axum::extract::{Form, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde::Deserialize;
use tracing::{debug, info};

use super::web::{see_other, student_path};
use super::{session_user, today, AppState};
use crate::directory::parse_roster_csv;
use crate::entries::EntryForm;
use crate::error::{AppError, AppResult};
use crate::identity::{require_admin, require_editable, require_student_access};

/// Entry form as posted, plus the target student and (for updates) the entry key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryPost {
    pub student: String,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hours: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub contactname: Option<String>,
    #[serde(default)]
    pub contactemail: Option<String>,
    #[serde(default)]
    pub contactphone: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl EntryPost {
    fn form(&self) -> EntryForm {
        EntryForm {
            name: self.name.clone(),
            hours: self.hours.clone(),
            date: self.date.clone(),
            org: self.org.clone(),
            contactname: self.contactname.clone(),
            contactemail: self.contactemail.clone(),
            contactphone: self.contactphone.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryRef {
    pub student: String,
    pub entry: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterPost {
    pub roster: String,
}

fn required_key(key: &Option<String>) -> AppResult<&str> {
    match key.as_deref().map(str::trim) {
        Some(k) if !k.is_empty() => Ok(k),
        _ => Err(AppError::user("missing_entry".to_string(), "no entry key given".to_string())),
    }
}

pub async fn add(State(state): State<AppState>, headers: HeaderMap, Form(post): Form<EntryPost>) -> AppResult<Response> {
    let user = session_user(&state, &headers)?;
    require_student_access(&user, &post.student)?;
    let today = today();
    let parsed = post.form().parse(today);
    if parsed.defaulted.any() {
        debug!(target: "service_hours::http", defaulted = ?parsed.defaulted, "entry form fell back to defaults");
    }
    require_editable(&user, &parsed.entry, today)?;
    let key = state.entries.add(&post.student, &parsed.entry)?;
    info!(target: "service_hours::http", by = %user.email, student = %post.student, key = %key, "entry added");
    Ok(see_other(&student_path(&post.student), None))
}

pub async fn update(State(state): State<AppState>, headers: HeaderMap, Form(post): Form<EntryPost>) -> AppResult<Response> {
    let user = session_user(&state, &headers)?;
    require_student_access(&user, &post.student)?;
    let key = required_key(&post.entry)?;
    let today = today();
    let old = state.entries.get(&post.student, key)?;
    require_editable(&user, &old, today)?;
    let parsed = post.form().parse(today);
    require_editable(&user, &parsed.entry, today)?;
    state.entries.set(&post.student, key, &parsed.entry)?;
    info!(target: "service_hours::http", by = %user.email, student = %post.student, key, "entry updated");
    Ok(see_other(&student_path(&post.student), None))
}

pub async fn delete(State(state): State<AppState>, headers: HeaderMap, Form(post): Form<EntryRef>) -> AppResult<Response> {
    let user = session_user(&state, &headers)?;
    require_student_access(&user, &post.student)?;
    let old = state.entries.get(&post.student, &post.entry)?;
    require_editable(&user, &old, today())?;
    state.entries.remove(&post.student, &post.entry)?;
    info!(target: "service_hours::http", by = %user.email, student = %post.student, key = %post.entry, "entry deleted");
    Ok(see_other(&student_path(&post.student), None))
}

pub async fn unflag(State(state): State<AppState>, headers: HeaderMap, Form(post): Form<EntryRef>) -> AppResult<Response> {
    let user = session_user(&state, &headers)?;
    require_admin(&user)?;
    state.entries.flag(&post.student, &post.entry, false)?;
    info!(target: "service_hours::http", by = %user.email, student = %post.student, key = %post.entry, "entry unflagged");
    Ok(see_other("/flagged", None))
}

pub async fn roster(State(state): State<AppState>, headers: HeaderMap, Form(post): Form<RosterPost>) -> AppResult<Response> {
    let user = session_user(&state, &headers)?;
    require_admin(&user)?;
    let users = parse_roster_csv(&post.roster)?;
    let summary = state.directory.replace_roster(&users)?;
    info!(
        target: "service_hours::http",
        by = %user.email, added = summary.added, updated = summary.updated, removed = summary.removed,
        "roster uploaded"
    );
    Ok(see_other("/admin", None))
}
