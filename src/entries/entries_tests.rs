use super::*;
use crate::storage::{Cas, MemoryStore, StoreResult, Versioned, Write};
use chrono::NaiveDate;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

const EMAIL: &str = "sam.student@school.org";

fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2025, 10, 19).unwrap() }

fn entries() -> EntryStore {
    EntryStore::new(Arc::new(MemoryStore::new()))
}

fn sum_of_hours(es: &EntryStore, email: &str) -> u64 {
    es.list(email).unwrap().iter().map(|(_, e)| e.hours as u64).sum()
}

#[test]
fn add_get_list_and_total() {
    let es = entries();
    let k1 = es.add(EMAIL, &Entry::new("Soup Kitchen", 2, "Kitchen", today())).unwrap();
    let k2 = es.add(EMAIL, &Entry::new("Park cleanup", 5, "Parks", today())).unwrap();
    assert_eq!(es.get(EMAIL, &k1).unwrap().hours, 2);
    let keys: Vec<String> = es.list(EMAIL).unwrap().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![k1, k2]);
    assert_eq!(es.total(EMAIL).unwrap(), 7);
}

#[test]
fn set_moves_total_by_delta_and_recomputes_flag() {
    let es = entries();
    let k = es.add(EMAIL, &Entry::new("Tutoring", 3, "Library", today())).unwrap();
    let mut e = es.get(EMAIL, &k).unwrap();
    e.hours = 11;
    e.flagged = false;
    es.set(EMAIL, &k, &e).unwrap();
    let stored = es.get(EMAIL, &k).unwrap();
    assert!(stored.flagged);
    assert_eq!(es.total(EMAIL).unwrap(), 11);

    e.hours = 1;
    es.set(EMAIL, &k, &e).unwrap();
    assert_eq!(es.total(EMAIL).unwrap(), 1);
    assert!(!es.get(EMAIL, &k).unwrap().flagged);
}

#[test]
fn remove_subtracts_hours() {
    let es = entries();
    let k = es.add(EMAIL, &Entry::new("A", 4, "B", today())).unwrap();
    es.add(EMAIL, &Entry::new("C", 2, "D", today())).unwrap();
    es.remove(EMAIL, &k).unwrap();
    assert_eq!(es.total(EMAIL).unwrap(), 2);
    let err = es.get(EMAIL, &k).unwrap_err();
    assert_eq!(err.http_status(), 404);
}

#[test]
fn missing_keys_are_not_found() {
    let es = entries();
    let e = Entry::new("A", 1, "B", today());
    assert_eq!(es.set(EMAIL, "-Nmissing", &e).unwrap_err().http_status(), 404);
    assert_eq!(es.remove(EMAIL, "-Nmissing").unwrap_err().http_status(), 404);
    assert_eq!(es.flag(EMAIL, "-Nmissing", true).unwrap_err().http_status(), 404);
    assert_eq!(es.get(EMAIL, "../totals").unwrap_err().http_status(), 404);
    // set on a missing key must not create it
    assert!(es.list(EMAIL).unwrap().is_empty());
    assert_eq!(es.total(EMAIL).unwrap(), 0);
}

#[test]
fn flag_overrides_without_touching_hours() {
    let es = entries();
    let k = es.add(EMAIL, &Entry::new("Counselor in training", 4, "Day Camp", today())).unwrap();
    assert!(es.get(EMAIL, &k).unwrap().flagged);
    es.flag(EMAIL, &k, false).unwrap();
    let e = es.get(EMAIL, &k).unwrap();
    assert!(!e.flagged);
    assert_eq!(e.hours, 4);
    assert_eq!(es.total(EMAIL).unwrap(), 4);
}

#[test]
fn list_flagged_spans_users() {
    let es = entries();
    es.add("a.b@s.org", &Entry::new("Camp", 2, "Y", today())).unwrap();
    es.add("c@s.org", &Entry::new("Food", 2, "Pantry", today())).unwrap();
    let k = es.add("c@s.org", &Entry::new("Marathon", 12, "Charity", today())).unwrap();
    let flagged = es.list_flagged().unwrap();
    assert_eq!(flagged.len(), 2);
    assert_eq!(flagged[0].email, "a.b@s.org");
    assert_eq!(flagged[1].email, "c@s.org");
    assert_eq!(flagged[1].key, k);
}

#[test]
fn users_do_not_share_totals() {
    let es = entries();
    es.add("x@s.org", &Entry::new("A", 3, "B", today())).unwrap();
    es.add("y@s.org", &Entry::new("A", 5, "B", today())).unwrap();
    assert_eq!(es.total("x@s.org").unwrap(), 3);
    assert_eq!(es.total("y@s.org").unwrap(), 5);
}

#[test]
fn total_matches_sum_after_random_sequence() {
    let es = entries();
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let mut keys: Vec<String> = Vec::new();
    for _ in 0..300 {
        match rng.gen_range(0..3) {
            0 => {
                let e = Entry::new("R", rng.gen_range(0..15), "Org", today());
                keys.push(es.add(EMAIL, &e).unwrap());
            }
            1 if !keys.is_empty() => {
                let k = &keys[rng.gen_range(0..keys.len())];
                let mut e = es.get(EMAIL, k).unwrap();
                e.hours = rng.gen_range(0..15);
                es.set(EMAIL, k, &e).unwrap();
            }
            2 if !keys.is_empty() => {
                let k = keys.swap_remove(rng.gen_range(0..keys.len()));
                es.remove(EMAIL, &k).unwrap();
            }
            _ => {}
        }
        assert_eq!(es.total(EMAIL).unwrap(), sum_of_hours(&es, EMAIL));
    }
}

#[test]
fn concurrent_updates_to_different_entries_all_count() {
    let es = entries();
    let keys: Vec<String> = (0..8)
        .map(|i| es.add(EMAIL, &Entry::new(&format!("E{i}"), 1, "Org", today())).unwrap())
        .collect();

    thread::scope(|scope| {
        for (i, key) in keys.iter().enumerate() {
            let es = es.clone();
            scope.spawn(move || {
                for round in 0..50u32 {
                    let mut e = es.get(EMAIL, key).unwrap();
                    e.hours = (i as u32 + round) % 9;
                    es.set(EMAIL, key, &e).unwrap();
                }
            });
        }
        // concurrent adds and removes on the same user
        let es_add = es.clone();
        scope.spawn(move || {
            for _ in 0..50 {
                let k = es_add.add(EMAIL, &Entry::new("Churn", 2, "Org", today())).unwrap();
                es_add.remove(EMAIL, &k).unwrap();
            }
        });
    });

    assert_eq!(es.total(EMAIL).unwrap(), sum_of_hours(&es, EMAIL));
}

/// A store whose writes touching `totals/*` fail while `broken` is set.
struct FailingTotals {
    inner: MemoryStore,
    broken: AtomicBool,
}

impl FailingTotals {
    fn new() -> Arc<Self> {
        Arc::new(Self { inner: MemoryStore::new(), broken: AtomicBool::new(false) })
    }
}

impl DocumentStore for FailingTotals {
    fn get_versioned(&self, key: &str) -> StoreResult<Option<Versioned>> { self.inner.get_versioned(key) }
    fn set(&self, key: &str, value: JsonValue) -> StoreResult<()> { self.inner.set(key, value) }
    fn delete(&self, key: &str) -> StoreResult<bool> { self.inner.delete(key) }
    fn compare_and_swap_many(&self, ops: Vec<Cas>) -> StoreResult<bool> {
        if self.broken.load(Ordering::SeqCst) && ops.iter().any(|op| op.key.starts_with("totals/")) {
            return Err(StoreError::Io("totals unavailable".into()));
        }
        self.inner.compare_and_swap_many(ops)
    }
    fn list(&self, prefix: &str) -> StoreResult<Vec<(String, JsonValue)>> { self.inner.list(prefix) }
    fn push_key(&self) -> String { self.inner.push_key() }
    fn update_children(
        &self,
        prefix: &str,
        f: &mut dyn FnMut(Vec<(String, JsonValue)>) -> Vec<Write>,
    ) -> StoreResult<usize> {
        self.inner.update_children(prefix, f)
    }
}

#[test]
fn failed_total_write_leaves_entries_untouched() {
    let store = FailingTotals::new();
    let es = EntryStore::new(store.clone());
    let kept = es.add(EMAIL, &Entry::new("Food drive", 4, "Pantry", today())).unwrap();

    store.broken.store(true, Ordering::SeqCst);
    let err = es.add(EMAIL, &Entry::new("Park cleanup", 5, "Parks", today())).unwrap_err();
    assert_eq!(err.code_str(), "store_unavailable");
    let mut changed = es.get(EMAIL, &kept).unwrap();
    changed.hours = 9;
    assert!(es.set(EMAIL, &kept, &changed).is_err());
    assert!(es.remove(EMAIL, &kept).is_err());

    assert_eq!(es.list(EMAIL).unwrap().len(), 1);
    assert_eq!(es.get(EMAIL, &kept).unwrap().hours, 4);
    assert_eq!(es.total(EMAIL).unwrap(), 4);
    assert_eq!(es.total(EMAIL).unwrap(), sum_of_hours(&es, EMAIL));

    store.broken.store(false, Ordering::SeqCst);
    es.set(EMAIL, &kept, &changed).unwrap();
    assert_eq!(es.total(EMAIL).unwrap(), sum_of_hours(&es, EMAIL));
}

#[test]
fn emails_that_cannot_be_keys_are_rejected() {
    let es = entries();
    let err = es.add("x/y@school.org", &Entry::new("A", 1, "Org", today())).unwrap_err();
    assert_eq!(err.http_status(), 400);
    assert!(es.list("a^b@school.org").is_err());
}
