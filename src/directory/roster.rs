//! Roster CSV import: `Name, Graduation-Year, Email, Years-Late`, header row first.

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use super::User;
use crate::error::{AppError, AppResult};

// `/` and `^` are reserved by the storage key encoding
fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s/^]+@[^@\s/^]+$").expect("static regex"))
}

/// Parse roster text into user records (admin flags are left false; the
/// directory preserves stored flags on replace).
pub fn parse_roster_csv(text: &str) -> AppResult<Vec<User>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut out = Vec::new();
    for (idx, rec) in reader.records().enumerate() {
        // header is line 1
        let line = idx + 2;
        let rec = rec.map_err(|e| AppError::user("bad_roster".to_string(), format!("line {line}: {e}")))?;
        if rec.len() < 4 {
            warn!(target: "service_hours::directory", line, "roster row has fewer than 4 cells, skipping: '{}'", rec.iter().collect::<Vec<_>>().join(","));
            continue;
        }
        let name = rec[0].to_string();
        let grade: u32 = rec[1]
            .parse()
            .map_err(|_| AppError::user("bad_roster".to_string(), format!("line {line}: graduation year '{}' is not a number", &rec[1])))?;
        let email = rec[2].to_string();
        if !email_re().is_match(&email) {
            return Err(AppError::user("bad_roster".to_string(), format!("line {line}: '{email}' is not an email address")));
        }
        let lateness: u32 = rec[3]
            .parse()
            .map_err(|_| AppError::user("bad_roster".to_string(), format!("line {line}: years late '{}' is not a number", &rec[3])))?;
        out.push(User { name, email, grade, lateness, admin: false });
    }
    Ok(out)
}

/// Parse an admin list: one email per line, blank lines and `#` comments ignored.
pub fn parse_admin_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}
