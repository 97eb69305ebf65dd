//! Lenient parsing of the entry form.
//!
//! Browsers post whatever the user typed. Fields that do not parse fall back
//! to a default instead of failing the request:
//!
//! | field          | fallback          |
//! |----------------|-------------------|
//! | `hours`        | 1                 |
//! | `date`         | today             |
//! | `contactphone` | none              |
//! | text fields    | empty / none      |

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Entry;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_HOURS: u32 = 1;

/// Raw form/query fields as posted by the entry page.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct EntryForm {
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

/// Which fields fell back to their default while parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Defaulted {
    pub hours: bool,
    pub date: bool,
    pub contact_phone: bool,
}

impl Defaulted {
    pub fn any(&self) -> bool { self.hours || self.date || self.contact_phone }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub entry: Entry,
    pub defaulted: Defaulted,
}

fn text(v: &Option<String>) -> String {
    v.as_deref().map(str::trim).unwrap_or("").to_string()
}

fn opt_text(v: &Option<String>) -> Option<String> {
    let t = text(v);
    if t.is_empty() { None } else { Some(t) }
}

/// Strip the separators people type into phone numbers and parse the digits.
pub fn parse_phone(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(|c| !matches!(c, '-' | '+' | ' ' | '(' | ')' | '.')).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u64>().ok().filter(|n| *n != 0)
}

impl EntryForm {
    pub fn parse(&self, today: NaiveDate) -> ParsedEntry {
        let mut defaulted = Defaulted::default();

        let hours = match self.hours.as_deref().map(str::trim).and_then(|h| h.parse::<u32>().ok()) {
            Some(h) => h,
            None => {
                defaulted.hours = true;
                DEFAULT_HOURS
            }
        };
        let date = match self.date.as_deref().and_then(|d| NaiveDate::parse_from_str(d.trim(), DATE_FORMAT).ok()) {
            Some(d) => d,
            None => {
                defaulted.date = true;
                today
            }
        };
        let raw_phone = text(&self.contactphone);
        let contact_phone = parse_phone(&raw_phone);
        if contact_phone.is_none() && !raw_phone.is_empty() {
            defaulted.contact_phone = true;
        }

        let mut entry = Entry {
            name: text(&self.name),
            hours,
            date,
            organization: text(&self.org),
            contact_name: opt_text(&self.contactname),
            contact_email: opt_text(&self.contactemail),
            contact_phone,
            description: opt_text(&self.description),
            last_modified: today,
            flagged: false,
        };
        entry.refresh_flagged();
        ParsedEntry { entry, defaulted }
    }

    /// Form fields that reproduce `entry` (used to pre-fill the add form).
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            name: Some(entry.name.clone()),
            hours: Some(entry.hours.to_string()),
            date: Some(entry.date.format(DATE_FORMAT).to_string()),
            org: Some(entry.organization.clone()),
            contactname: entry.contact_name.clone(),
            contactemail: entry.contact_email.clone(),
            contactphone: entry.contact_phone.map(|p| p.to_string()),
            description: entry.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2025, 10, 19).unwrap() }

    #[test]
    fn well_formed_form_parses_without_defaults() {
        let form = EntryForm {
            name: Some("Food drive".into()),
            hours: Some("3".into()),
            date: Some("2025-10-01".into()),
            org: Some("Food Bank".into()),
            contactname: Some("Lee".into()),
            contactemail: Some("lee@fb.org".into()),
            contactphone: Some("(914) 555-1234".into()),
            description: Some("".into()),
        };
        let p = form.parse(today());
        assert!(!p.defaulted.any());
        assert_eq!(p.entry.hours, 3);
        assert_eq!(p.entry.date, NaiveDate::from_ymd_opt(2025, 10, 1).unwrap());
        assert_eq!(p.entry.contact_phone, Some(9145551234));
        assert_eq!(p.entry.description, None);
        assert_eq!(p.entry.last_modified, today());
        assert!(!p.entry.flagged);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let form = EntryForm {
            hours: Some("lots".into()),
            date: Some("yesterday".into()),
            contactphone: Some("call me".into()),
            ..Default::default()
        };
        let p = form.parse(today());
        assert_eq!(p.defaulted, Defaulted { hours: true, date: true, contact_phone: true });
        assert_eq!(p.entry.hours, DEFAULT_HOURS);
        assert_eq!(p.entry.date, today());
        assert_eq!(p.entry.contact_phone, None);
    }

    #[test]
    fn missing_fields_are_defaulted_but_blank_phone_is_not_an_error() {
        let p = EntryForm::default().parse(today());
        assert!(p.defaulted.hours);
        assert!(p.defaulted.date);
        assert!(!p.defaulted.contact_phone);
        assert_eq!(p.entry.name, "");
    }

    #[test]
    fn negative_hours_fall_back() {
        let form = EntryForm { hours: Some("-4".into()), ..Default::default() };
        assert_eq!(form.parse(today()).entry.hours, DEFAULT_HOURS);
    }

    #[test]
    fn parse_recomputes_flag() {
        let form = EntryForm { hours: Some("12".into()), org: Some("Library".into()), ..Default::default() };
        assert!(form.parse(today()).entry.flagged);
    }

    #[test]
    fn from_entry_reproduces_entry() {
        let form = EntryForm {
            name: Some("Tutoring".into()),
            hours: Some("2".into()),
            date: Some("2025-10-10".into()),
            org: Some("Library".into()),
            contactphone: Some("9145551234".into()),
            ..Default::default()
        };
        let e = form.parse(today()).entry;
        assert_eq!(EntryForm::from_entry(&e).parse(today()).entry, e);
    }
}
