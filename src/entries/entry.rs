use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Entries at or above this many hours always go to review.
pub const FLAG_HOURS: u32 = 10;
/// Case-insensitive substrings that send an entry to review.
pub const FLAG_KEYWORDS: [&str; 3] = ["cit", "counselor", "camp"];
/// Students may change an entry only this many days after its date.
pub const EDIT_WINDOW_DAYS: i64 = 30;

/// One logged service activity. The serialized form is the storage
/// representation: dates are calendar days (`YYYY-MM-DD`), empty optional
/// fields and a false `flagged` are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hours: u32,
    pub date: NaiveDate,
    #[serde(rename = "org", default)]
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub last_modified: NaiveDate,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub flagged: bool,
}

impl Entry {
    pub fn new(name: &str, hours: u32, organization: &str, today: NaiveDate) -> Self {
        let mut e = Self {
            name: name.to_string(),
            hours,
            date: today,
            organization: organization.to_string(),
            contact_name: None,
            contact_email: None,
            contact_phone: None,
            description: None,
            last_modified: today,
            flagged: false,
        };
        e.refresh_flagged();
        e
    }

    /// Blank form defaults: one hour, dated today.
    pub fn empty(today: NaiveDate) -> Self {
        Self::new("", 1, "", today)
    }

    /// Whether the entry needs administrator review.
    pub fn needs_review(&self) -> bool {
        if self.hours >= FLAG_HOURS {
            return true;
        }
        let fields = [
            self.name.to_lowercase(),
            self.organization.to_lowercase(),
            self.description.as_deref().unwrap_or("").to_lowercase(),
        ];
        FLAG_KEYWORDS.iter().any(|kw| fields.iter().any(|f| f.contains(kw)))
    }

    pub fn refresh_flagged(&mut self) {
        self.flagged = self.needs_review();
    }

    /// Students may edit entries dated within the last 30 days (or later).
    pub fn is_editable(&self, today: NaiveDate) -> bool {
        today.signed_duration_since(self.date) <= Duration::days(EDIT_WINDOW_DAYS)
    }

    pub fn formatted_phone(&self) -> Option<String> {
        self.contact_phone.map(format_phone)
    }
}

/// `5551234567` -> `555-123-4567`, `15551234567` -> `+1 555-123-4567`,
/// anything else is shown as `+<digits>`.
pub fn format_phone(n: u64) -> String {
    let s = n.to_string();
    match s.len() {
        10 => format!("{}-{}-{}", &s[0..3], &s[3..6], &s[6..]),
        11 if s.starts_with('1') => format!("+1 {}-{}-{}", &s[1..4], &s[4..7], &s[7..]),
        _ => format!("+{s}"),
    }
}
