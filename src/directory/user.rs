use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Hours a student owes per year of attendance.
pub const HOURS_PER_YEAR: u32 = 20;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub email: String,
    /// Graduation year; 0 when unknown (staff or someone not on the roster).
    #[serde(default)]
    pub grade: u32,
    /// Years the student is behind their graduating class.
    #[serde(default)]
    pub lateness: u32,
    #[serde(default)]
    pub admin: bool,
}

impl User {
    /// Record handed out for an email the directory does not know.
    pub fn placeholder(email: &str) -> Self {
        Self { name: email.to_string(), email: email.to_string(), ..Default::default() }
    }

    pub fn is_placeholder_name(&self) -> bool {
        self.name.is_empty() || self.name == self.email
    }

    /// Years the student has attended so far, counting the current school
    /// year once September starts.
    pub fn years_in_school(&self, today: NaiveDate) -> u32 {
        let year = today.year() as i64;
        let grade = self.grade as i64;
        let late = self.lateness as i64;
        if year >= grade {
            return (4 - late).max(0) as u32;
        }
        let mut years = year - (grade - 4) - late;
        if today.month() >= 9 {
            years += 1;
        }
        years.max(0) as u32
    }

    /// Conventional school grade (9..12 for high school) derived from the
    /// graduation year.
    pub fn school_grade(&self, today: NaiveDate) -> i64 {
        let mut g = today.year() as i64 - self.grade as i64 + 12;
        if today.month() >= 9 {
            g += 1;
        }
        g
    }

    pub fn required_hours(&self, today: NaiveDate) -> u32 {
        self.years_in_school(today) * HOURS_PER_YEAR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, day).unwrap() }

    fn student(grade: u32, lateness: u32) -> User {
        User { name: "S".into(), email: "s@x.org".into(), grade, lateness, admin: false }
    }

    #[test]
    fn years_in_school_counts_from_september() {
        let s = student(2027, 0);
        // class of 2027 started September 2023
        assert_eq!(s.years_in_school(d(2024, 3, 1)), 1);
        assert_eq!(s.years_in_school(d(2024, 9, 5)), 2);
        assert_eq!(s.years_in_school(d(2027, 6, 1)), 4);
    }

    #[test]
    fn lateness_reduces_years_and_never_goes_negative() {
        let s = student(2027, 1);
        assert_eq!(s.years_in_school(d(2024, 3, 1)), 0);
        assert_eq!(s.years_in_school(d(2028, 1, 1)), 3);
        let far = student(2040, 0);
        assert_eq!(far.years_in_school(d(2024, 3, 1)), 0);
    }

    #[test]
    fn required_hours_scale_with_years() {
        assert_eq!(student(2027, 0).required_hours(d(2025, 10, 1)), 60);
    }

    #[test]
    fn school_grade_rolls_over_in_september() {
        let s = student(2027, 0);
        assert_eq!(s.school_grade(d(2025, 5, 1)), 10);
        assert_eq!(s.school_grade(d(2025, 9, 1)), 11);
    }

    #[test]
    fn placeholder_uses_email_as_name() {
        let u = User::placeholder("who@x.org");
        assert_eq!(u.name, "who@x.org");
        assert!(u.is_placeholder_name());
        assert!(!u.admin);
        assert_eq!(u.grade, 0);
    }
}
