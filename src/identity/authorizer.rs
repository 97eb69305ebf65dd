//! Who may act on whose entries.
//!
//! A signed-in user may act as a student when it is their own email or when
//! they carry the admin flag. Roster import, unflagging and the all-student
//! views are admin-only. Students may only change entries inside the edit
//! window; admins are not bound by it.

use chrono::NaiveDate;

use crate::directory::User;
use crate::entries::Entry;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Student,
    Admin,
}

pub fn role_of(user: &User) -> Role {
    if user.admin { Role::Admin } else { Role::Student }
}

pub fn can_act_as(actor: &User, student_email: &str) -> bool {
    match role_of(actor) {
        Role::Admin => true,
        Role::Student => actor.email == student_email,
    }
}

pub fn require_student_access(actor: &User, student_email: &str) -> AppResult<()> {
    if can_act_as(actor, student_email) {
        return Ok(());
    }
    Err(AppError::authorization(
        "not_your_student".to_string(),
        format!("{} may not act as {}", actor.email, student_email),
    ))
}

pub fn require_admin(actor: &User) -> AppResult<()> {
    match role_of(actor) {
        Role::Admin => Ok(()),
        Role::Student => Err(AppError::authorization("admin_only".to_string(), "administrators only".to_string())),
    }
}

/// Gate a student's change of `entry`; admins pass regardless of date.
pub fn require_editable(actor: &User, entry: &Entry, today: NaiveDate) -> AppResult<()> {
    if actor.admin || entry.is_editable(today) {
        return Ok(());
    }
    Err(AppError::authorization(
        "entry_locked".to_string(),
        "entries older than 30 days can only be changed by an administrator".to_string(),
    ))
}
