use super::*;
use crate::storage::MemoryStore;

fn dir() -> UserDirectory {
    UserDirectory::new(Arc::new(MemoryStore::new()))
}

fn user(name: &str, email: &str, grade: u32, admin: bool) -> User {
    User { name: name.into(), email: email.into(), grade, lateness: 0, admin }
}

fn ident(email: &str, name: &str) -> VerifiedIdentity {
    VerifiedIdentity { email: email.into(), name: name.into() }
}

#[test]
fn get_unknown_email_returns_placeholder() {
    let d = dir();
    let u = d.get("nobody@s.org").unwrap();
    assert_eq!(u, User::placeholder("nobody@s.org"));
    assert!(d.find("nobody@s.org").unwrap().is_none());
}

#[test]
fn replace_roster_preserves_admins_and_their_flags() {
    let d = dir();
    d.put(&user("A", "a@s.org", 0, true)).unwrap();
    d.put(&user("B", "b@s.org", 2025, false)).unwrap();

    let summary = d
        .replace_roster(&[user("B", "b@s.org", 2026, false), user("C", "c@s.org", 2027, false)])
        .unwrap();
    assert_eq!(summary, RosterSummary { added: 1, updated: 1, removed: 0 });

    let all = d.list().unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(d.get("a@s.org").unwrap(), user("A", "a@s.org", 0, true));
    assert_eq!(d.get("b@s.org").unwrap(), user("B", "b@s.org", 2026, false));
    assert_eq!(d.get("c@s.org").unwrap(), user("C", "c@s.org", 2027, false));
}

#[test]
fn replace_roster_removes_missing_non_admins() {
    let d = dir();
    d.put(&user("Old", "old@s.org", 2024, false)).unwrap();
    d.put(&user("Keep", "keep@s.org", 2026, false)).unwrap();
    let summary = d.replace_roster(&[user("Keep", "keep@s.org", 2026, false)]).unwrap();
    assert_eq!(summary.removed, 1);
    assert!(d.find("old@s.org").unwrap().is_none());
}

#[test]
fn replace_roster_keeps_admin_flag_of_listed_admin() {
    let d = dir();
    d.put(&user("Teacher", "t@s.org", 0, true)).unwrap();
    // roster rows never carry admin=true, the stored flag wins
    d.replace_roster(&[user("Teacher Renamed", "t@s.org", 2030, false)]).unwrap();
    let t = d.get("t@s.org").unwrap();
    assert!(t.admin);
    assert_eq!(t.name, "Teacher Renamed");
}

#[test]
fn resolve_identity_creates_record_on_first_signin() {
    let d = dir();
    let u = d.resolve_identity(&ident("new@s.org", "New Person")).unwrap();
    assert_eq!(u.name, "New Person");
    assert!(!u.admin);
    assert_eq!(d.find("new@s.org").unwrap(), Some(u));
}

#[test]
fn resolve_identity_keeps_roster_name_and_flags() {
    let d = dir();
    d.put(&user("Roster Name", "r@s.org", 2026, true)).unwrap();
    let u = d.resolve_identity(&ident("r@s.org", "Google Name")).unwrap();
    assert_eq!(u.name, "Roster Name");
    assert!(u.admin);
    assert_eq!(u.grade, 2026);
}

#[test]
fn resolve_identity_fills_placeholder_name() {
    let d = dir();
    d.grant_admins(&["boss@s.org".to_string()]).unwrap();
    assert_eq!(d.get("boss@s.org").unwrap().name, "boss@s.org");
    let u = d.resolve_identity(&ident("boss@s.org", "The Boss")).unwrap();
    assert_eq!(u.name, "The Boss");
    assert!(u.admin);
}

#[test]
fn students_by_grade_groups_and_sorts() {
    let d = dir();
    let today = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
    d.put(&user("Zed", "z@s.org", 2026, false)).unwrap(); // grade 12
    d.put(&user("Amy", "amy@s.org", 2026, false)).unwrap(); // grade 12
    d.put(&user("Bob", "bob@s.org", 2028, false)).unwrap(); // grade 10
    d.put(&user("Gone", "gone@s.org", 2024, false)).unwrap(); // graduated
    d.put(&user("Staff", "staff@s.org", 0, true)).unwrap();

    let groups = d.students_by_grade(today).unwrap();
    let grades: Vec<i64> = groups.iter().map(|g| g.grade).collect();
    assert_eq!(grades, vec![12, 10]);
    let names: Vec<&str> = groups[0].students.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Amy", "Zed"]);
}

#[test]
fn grant_admins_reports_unreadable_records() {
    let store = Arc::new(MemoryStore::new());
    store.set("users/bad@s^org", serde_json::json!("not a user")).unwrap();
    let d = UserDirectory::new(store.clone());

    let err = d.grant_admins(&["bad@s.org".to_string()]).unwrap_err();
    assert_eq!(err.code_str(), "store_unavailable");
    assert_eq!(store.get("users/bad@s^org").unwrap(), Some(serde_json::json!("not a user")));

    assert_eq!(d.grant_admins(&["good@s.org".to_string()]).unwrap(), 1);
}

#[test]
fn emails_reserved_by_key_encoding_are_rejected() {
    let d = dir();
    assert_eq!(d.resolve_identity(&ident("x/y@s.org", "X")).unwrap_err().http_status(), 400);
    assert!(d.get("a^b@s.org").is_err());
    assert!(d.replace_roster(&[user("X", "x/y@s.org", 2026, false)]).is_err());
    assert!(d.grant_admins(&["a^b@s.org".to_string()]).is_err());
    assert!(d.list().unwrap().is_empty());
}
