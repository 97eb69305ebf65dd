//! GET handlers: sign-in/out and the rendered pages.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::web::{self, see_other, student_path};
use super::{session_user, today, AppState};
use crate::directory::User;
use crate::entries::{Entry, EntryForm, DATE_FORMAT};
use crate::error::{signin_redirect_location, AppError, AppResult};
use crate::identity::{require_admin, require_student_access};
use crate::template::Page;

pub const ACTION_VIEW: &str = "View";
pub const ACTION_EDIT: &str = "Edit";
pub const ACTION_ADD: &str = "Add";

/// Template view of one entry.
#[derive(Debug, Serialize)]
pub struct EntryView {
    pub key: String,
    pub name: String,
    pub hours: u32,
    pub date: String,
    pub org: String,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub description: String,
    pub flagged: bool,
}

impl EntryView {
    pub fn new(key: &str, e: &Entry) -> Self {
        Self {
            key: key.to_string(),
            name: e.name.clone(),
            hours: e.hours,
            date: e.date.format(DATE_FORMAT).to_string(),
            org: e.organization.clone(),
            contact_name: e.contact_name.clone().unwrap_or_default(),
            contact_email: e.contact_email.clone().unwrap_or_default(),
            contact_phone: e.formatted_phone().unwrap_or_default(),
            description: e.description.clone().unwrap_or_default(),
            flagged: e.flagged,
        }
    }
}

#[derive(Serialize)]
struct SigninCtx<'a> {
    client_id: &'a str,
    domain: &'a str,
}

#[derive(Serialize)]
struct ListCtx<'a> {
    user: &'a User,
    student: &'a User,
    total: u64,
    required: u32,
    entries: Vec<EntryView>,
}

#[derive(Serialize)]
struct EditCtx<'a> {
    user: &'a User,
    student: &'a User,
    action: &'static str,
    key: &'a str,
    form_action: &'static str,
    entry: EntryView,
}

#[derive(Serialize)]
struct StudentRow {
    name: String,
    email: String,
    total: u64,
    required: u32,
    complete: bool,
}

#[derive(Serialize)]
struct GradeRow {
    grade: i64,
    students: Vec<StudentRow>,
}

#[derive(Serialize)]
struct AdminCtx<'a> {
    user: &'a User,
    groups: Vec<GradeRow>,
}

#[derive(Serialize)]
struct FlaggedRow {
    email: String,
    student: String,
    key: String,
    name: String,
    hours: u32,
    date: String,
    org: String,
}

#[derive(Serialize)]
struct FlaggedCtx<'a> {
    user: &'a User,
    entries: Vec<FlaggedRow>,
}

fn render<T: Serialize>(state: &AppState, page: Page, ctx: &T) -> AppResult<Response> {
    Ok(web::html(state.templates.render(page, ctx)?))
}

pub async fn signin_page(State(state): State<AppState>) -> AppResult<Response> {
    let ctx = SigninCtx {
        client_id: state.config.client_id.as_deref().unwrap_or(""),
        domain: &state.config.domain,
    };
    render(&state, Page::Signin, &ctx)
}

#[derive(Debug, Deserialize)]
pub struct SigninQuery {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    redirect: Option<String>,
}

pub async fn signin(State(state): State<AppState>, Query(q): Query<SigninQuery>) -> AppResult<Response> {
    let token = q.token.unwrap_or_default();
    let issued = state
        .sessions
        .issue_from_identity(&token, state.verifier.as_ref(), &state.directory)
        .await;
    let (session, user) = match issued {
        Ok(ok) => ok,
        Err(e @ (AppError::Authentication { .. } | AppError::Upstream { .. })) => {
            warn!(target: "service_hours::http", error = %e, "sign-in rejected");
            return Ok(see_other(&signin_redirect_location(e.message()), None));
        }
        Err(e) => return Err(e),
    };
    let cookie = web::set_session_cookie(&session, state.config.secure_cookies)?;
    let location = match web::safe_redirect(q.redirect.as_deref()) {
        Some(r) => r.to_string(),
        None if user.admin => "/admin".to_string(),
        None => student_path(&user.email),
    };
    info!(target: "service_hours::http", email = %user.email, admin = user.admin, "signed in");
    Ok(see_other(&location, Some(cookie)))
}

pub async fn signout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = web::session_token(&headers) {
        state.sessions.remove(&token);
    }
    see_other("/#signout", Some(web::clear_session_cookie(state.config.secure_cookies)))
}

pub async fn admin(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let user = session_user(&state, &headers)?;
    require_admin(&user)?;
    let today = today();
    let mut groups = Vec::new();
    for g in state.directory.students_by_grade(today)? {
        let mut students = Vec::with_capacity(g.students.len());
        for s in g.students {
            let total = state.entries.total(&s.email)?;
            let required = s.required_hours(today);
            students.push(StudentRow { total, required, complete: total >= required as u64, name: s.name, email: s.email });
        }
        groups.push(GradeRow { grade: g.grade, students });
    }
    render(&state, Page::Admin, &AdminCtx { user: &user, groups })
}

pub async fn flagged(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let user = session_user(&state, &headers)?;
    require_admin(&user)?;
    let mut names: HashMap<String, String> = HashMap::new();
    let mut rows = Vec::new();
    for f in state.entries.list_flagged()? {
        let student = match names.get(&f.email) {
            Some(n) => n.clone(),
            None => {
                let n = state.directory.get(&f.email)?.name;
                names.insert(f.email.clone(), n.clone());
                n
            }
        };
        let view = EntryView::new(&f.key, &f.entry);
        rows.push(FlaggedRow { email: f.email, student, key: f.key, name: view.name, hours: view.hours, date: view.date, org: view.org });
    }
    render(&state, Page::Flagged, &FlaggedCtx { user: &user, entries: rows })
}

pub async fn list(State(state): State<AppState>, headers: HeaderMap, Path(email): Path<String>) -> AppResult<Response> {
    let user = session_user(&state, &headers)?;
    require_student_access(&user, &email)?;
    let student = state.directory.get(&email)?;
    let entries = state.entries.list(&email)?.iter().map(|(k, e)| EntryView::new(k, e)).collect();
    let ctx = ListCtx {
        user: &user,
        student: &student,
        total: state.entries.total(&email)?,
        required: student.required_hours(today()),
        entries,
    };
    render(&state, Page::List, &ctx)
}

/// Blank add form; query parameters pre-fill it.
pub async fn new_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(email): Path<String>,
    Query(form): Query<EntryForm>,
) -> AppResult<Response> {
    let user = session_user(&state, &headers)?;
    require_student_access(&user, &email)?;
    let student = state.directory.get(&email)?;
    let entry = form.parse(today()).entry;
    let ctx = EditCtx {
        user: &user,
        student: &student,
        action: ACTION_ADD,
        key: "",
        form_action: "/do/add",
        entry: EntryView::new("", &entry),
    };
    render(&state, Page::Edit, &ctx)
}

pub async fn edit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((email, key)): Path<(String, String)>,
) -> AppResult<Response> {
    let user = session_user(&state, &headers)?;
    require_student_access(&user, &email)?;
    let student = state.directory.get(&email)?;
    let entry = state.entries.get(&email, &key)?;
    let action = if !user.admin && !entry.is_editable(today()) { ACTION_VIEW } else { ACTION_EDIT };
    let ctx = EditCtx {
        user: &user,
        student: &student,
        action,
        key: &key,
        form_action: "/do/update",
        entry: EntryView::new(&key, &entry),
    };
    render(&state, Page::Edit, &ctx)
}

fn form_query(form: &EntryForm) -> String {
    let fields = [
        ("name", &form.name),
        ("hours", &form.hours),
        ("date", &form.date),
        ("org", &form.org),
        ("contactname", &form.contactname),
        ("contactemail", &form.contactemail),
        ("contactphone", &form.contactphone),
        ("description", &form.description),
    ];
    fields
        .iter()
        .filter_map(|(k, v)| v.as_deref().map(|v| format!("{}={}", k, urlencoding::encode(v))))
        .collect::<Vec<_>>()
        .join("&")
}

/// Copy an entry into a new add form dated today.
pub async fn duplicate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((email, key)): Path<(String, String)>,
) -> AppResult<Response> {
    let user = session_user(&state, &headers)?;
    require_student_access(&user, &email)?;
    let mut entry = state.entries.get(&email, &key)?;
    entry.date = today();
    let location = format!("{}/new?{}", student_path(&email), form_query(&EntryForm::from_entry(&entry)));
    Ok(see_other(&location, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn form_query_skips_missing_fields_and_encodes() {
        let mut e = Entry::new("Soup & Salad", 2, "Kitchen", NaiveDate::from_ymd_opt(2025, 10, 1).unwrap());
        e.description = None;
        let q = form_query(&EntryForm::from_entry(&e));
        assert_eq!(q, "name=Soup%20%26%20Salad&hours=2&date=2025-10-01&org=Kitchen");
    }

    #[test]
    fn entry_view_formats_optional_fields() {
        let mut e = Entry::new("x", 1, "y", NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        e.contact_phone = Some(9145551234);
        let v = EntryView::new("k", &e);
        assert_eq!(v.date, "2025-01-02");
        assert_eq!(v.contact_phone, "914-555-1234");
        assert_eq!(v.contact_name, "");
    }
}
