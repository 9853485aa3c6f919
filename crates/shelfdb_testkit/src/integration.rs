//! Cross-crate integration test helpers.
//!
//! Provides a harness that mirrors every write into an in-memory model and
//! checks that the store and its index agree with it. The index on `tag`
//! is either non-unique or unique; with a unique index the model also
//! predicts which writes are rejected.

use crate::fixtures::{collect_cursor, TestEngine};
use crate::generators::{tagged_value, RecordOperation};
use shelfdb_core::{
    Direction, ErrorKind, IndexOptions, Key, KeyRange, StoreOptions, TransactionMode,
    TransactionStatus,
};
use std::collections::BTreeMap;

/// Store used by the harness.
pub const HARNESS_STORE: &str = "items";
/// Index on the `tag` field.
pub const HARNESS_INDEX: &str = "by_tag";

/// A test harness for integration testing.
pub struct IntegrationHarness {
    /// The database under test.
    pub db: TestEngine,
    /// Expected `id -> tag` contents.
    model: BTreeMap<i32, String>,
    unique: bool,
}

impl IntegrationHarness {
    /// Creates a harness over a fresh store with an index on `tag`.
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Creates a harness whose `tag` index is unique.
    pub fn with_unique_index() -> Self {
        Self::build(true)
    }

    fn build(unique: bool) -> Self {
        Self {
            db: TestEngine::with_index(
                HARNESS_STORE,
                StoreOptions::new().key_path("id"),
                HARNESS_INDEX,
                "tag",
                IndexOptions::new().unique(unique),
            ),
            model: BTreeMap::new(),
            unique,
        }
    }

    /// Whether the model expects `op` to fail with a constraint error.
    fn rejects(&self, op: &RecordOperation) -> bool {
        match op {
            RecordOperation::Add { id, .. } if self.model.contains_key(id) => true,
            RecordOperation::Put { id, tag } | RecordOperation::Add { id, tag } => {
                self.unique && self.model.iter().any(|(other, t)| other != id && t == tag)
            }
            _ => false,
        }
    }

    /// Applies one operation in its own read-write transaction and updates
    /// the model with what should have happened.
    pub fn apply(&mut self, op: &RecordOperation) {
        let txn = self.db.transaction(HARNESS_STORE, TransactionMode::ReadWrite);
        let store = txn.object_store(HARNESS_STORE).expect("Missing store");
        let request = match op {
            RecordOperation::Put { id, tag } => store.put(tagged_value(*id, tag), None),
            RecordOperation::Add { id, tag } => store.add(tagged_value(*id, tag), None),
            RecordOperation::Delete { from, to } => {
                store.delete(KeyRange::bound(*from, *to, false, false).expect("Invalid range"))
            }
            RecordOperation::Clear => store.clear(),
        }
        .expect("Failed to queue operation");
        self.db.run();

        if self.rejects(op) {
            let err = request.result().expect_err("Conflicting write succeeded");
            assert_eq!(err.kind(), ErrorKind::Constraint);
            assert_eq!(txn.status(), TransactionStatus::Aborted);
            return;
        }
        match op {
            RecordOperation::Put { id, tag } | RecordOperation::Add { id, tag } => {
                self.model.insert(*id, tag.clone());
            }
            RecordOperation::Delete { from, to } => {
                self.model.retain(|id, _| id < from || id > to);
            }
            RecordOperation::Clear => self.model.clear(),
        }
        assert!(request.result().is_ok(), "{op:?} failed");
        assert_eq!(txn.status(), TransactionStatus::Committed);
    }

    /// Checks the store and the index against the model.
    pub fn verify_all(&self) {
        let records = self.db.read_all(HARNESS_STORE);
        let expected: Vec<(Key, shelfdb_core::Value)> = self
            .model
            .iter()
            .map(|(id, tag)| (Key::from(*id), tagged_value(*id, tag)))
            .collect();
        assert_eq!(records, expected, "Store contents diverged from model");

        let txn = self.db.transaction(HARNESS_STORE, TransactionMode::ReadOnly);
        let request = txn
            .object_store(HARNESS_STORE)
            .and_then(|s| s.index(HARNESS_INDEX))
            .and_then(|i| i.open_key_cursor(KeyRange::all(), Direction::Next))
            .expect("Failed to open index cursor");
        let steps = collect_cursor(&request);
        self.db.run();

        let mut expected: Vec<(Key, Key)> = self
            .model
            .iter()
            .map(|(id, tag)| (Key::from(tag.as_str()), Key::from(*id)))
            .collect();
        expected.sort();
        let actual: Vec<(Key, Key)> = steps
            .take()
            .into_iter()
            .map(|s| (s.key, s.primary_key))
            .collect();
        assert_eq!(actual, expected, "Index diverged from model");
        if self.unique {
            assert!(
                actual.windows(2).all(|pair| pair[0].0 != pair[1].0),
                "Unique index holds a repeated key"
            );
        }
    }

    /// Returns the number of records the model expects.
    pub fn tracked_count(&self) -> usize {
        self.model.len()
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{tagged, walk_cursor, Collector};
    use crate::generators::{operation_sequence_strategy, PropTestConfig};
    use proptest::prelude::*;
    use shelfdb_core::{
        Config, DatabaseDefinition, Engine, ErrorKind, Outcome, Transaction, Value,
    };

    #[test]
    fn test_integration_harness() {
        let mut harness = IntegrationHarness::new();
        harness.apply(&RecordOperation::Put { id: 1, tag: "a".into() });
        harness.apply(&RecordOperation::Add { id: 2, tag: "a".into() });
        harness.apply(&RecordOperation::Add { id: 2, tag: "b".into() });
        harness.apply(&RecordOperation::Put { id: 3, tag: "b".into() });
        harness.apply(&RecordOperation::Delete { from: 3, to: 9 });
        harness.verify_all();
        assert_eq!(harness.tracked_count(), 2);
    }

    #[test]
    fn auto_increment_generates_sequential_keys() {
        let db = TestEngine::with_store("numbers", StoreOptions::new().auto_increment(true));
        let txn = db.transaction("numbers", TransactionMode::ReadWrite);
        let store = txn.object_store("numbers").unwrap();
        let first = store.add(Value::from("one"), None).unwrap();
        let second = store.add(Value::from("two"), None).unwrap();
        let count = store.count(KeyRange::all()).unwrap();
        db.run();

        assert_eq!(first.result().unwrap().key(), Some(&Key::from(1)));
        assert_eq!(second.result().unwrap().key(), Some(&Key::from(2)));
        assert_eq!(count.result().unwrap().count(), Some(2));
        assert_eq!(txn.status(), TransactionStatus::Committed);
    }

    #[test]
    fn generated_keys_follow_explicit_numeric_keys() {
        let db = TestEngine::with_store("numbers", StoreOptions::new().auto_increment(true));
        let txn = db.transaction("numbers", TransactionMode::ReadWrite);
        let store = txn.object_store("numbers").unwrap();
        store.put(Value::from("x"), Some(Key::from(10))).unwrap();
        let next = store.add(Value::from("y"), None).unwrap();
        db.run();
        assert_eq!(next.result().unwrap().key(), Some(&Key::from(11)));
    }

    #[test]
    fn unique_index_violation_aborts_and_rolls_back() {
        let db = TestEngine::with_index(
            "users",
            StoreOptions::new().key_path("id"),
            "by_tag",
            "tag",
            IndexOptions::new().unique(true),
        );
        let txn = db.transaction("users", TransactionMode::ReadWrite);
        let aborted = Collector::new();
        let sink = aborted.clone();
        txn.on_abort(move |event| sink.push(event.error.as_ref().map(|e| e.kind())));
        let store = txn.object_store("users").unwrap();
        let first = store.put(tagged(1, "same"), None).unwrap();
        let second = store.put(tagged(2, "same"), None).unwrap();
        db.run();

        assert!(first.result().is_ok());
        assert_eq!(second.result().unwrap_err().kind(), ErrorKind::Constraint);
        assert_eq!(txn.status(), TransactionStatus::Aborted);
        assert_eq!(aborted.items(), vec![Some(ErrorKind::Constraint)]);
        assert_eq!(db.count("users"), 0);
    }

    #[test]
    fn cursor_advance_skips_records() {
        let db = TestEngine::with_store("items", StoreOptions::new().key_path("id"));
        db.put_all("items", (1..=5).map(|i| tagged(i, "x")).collect());

        let txn = db.transaction("items", TransactionMode::ReadOnly);
        let request = txn
            .object_store("items")
            .unwrap()
            .open_cursor(KeyRange::all(), Direction::Next)
            .unwrap();
        let mut advanced = false;
        let steps = walk_cursor(&request, move |cursor| {
            if !advanced {
                advanced = true;
                cursor.advance(2).unwrap();
            }
        });
        db.run();
        let keys: Vec<Key> = steps.take().into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec![Key::from(1), Key::from(3)]);
    }

    #[test]
    fn continuing_backwards_is_a_data_error() {
        let db = TestEngine::with_store("items", StoreOptions::new().key_path("id"));
        db.put_all("items", (1..=5).map(|i| tagged(i, "x")).collect());

        let txn = db.transaction("items", TransactionMode::ReadOnly);
        let request = txn
            .object_store("items")
            .unwrap()
            .open_cursor(KeyRange::lower_bound(3, false), Direction::Next)
            .unwrap();
        let errors = Collector::new();
        let sink = errors.clone();
        request.on_success(move |event| {
            if let Ok(Outcome::Cursor(Some(cursor))) = event.request.result() {
                sink.push(cursor.continue_to(2).unwrap_err().kind());
                sink.push(cursor.continue_to(3).unwrap_err().kind());
            }
        });
        db.run();
        assert_eq!(errors.items(), vec![ErrorKind::Data, ErrorKind::Data]);
    }

    #[test]
    fn continue_to_seeks_forward() {
        let db = TestEngine::with_store("items", StoreOptions::new().key_path("id"));
        db.put_all("items", [1, 3, 5, 7].iter().map(|&i| tagged(i, "x")).collect());

        let txn = db.transaction("items", TransactionMode::ReadOnly);
        let request = txn
            .object_store("items")
            .unwrap()
            .open_cursor(KeyRange::all(), Direction::Next)
            .unwrap();
        let steps = walk_cursor(&request, |cursor| {
            if cursor.key() == Some(Key::from(1)) {
                cursor.continue_to(4).unwrap();
            } else {
                cursor.continue_().unwrap();
            }
        });
        db.run();
        let keys: Vec<Key> = steps.take().into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec![Key::from(1), Key::from(5), Key::from(7)]);
    }

    #[test]
    fn key_ranges_bound_reads() {
        let db = TestEngine::with_store("items", StoreOptions::new().key_path("id"));
        db.put_all("items", (1..=5).map(|i| tagged(i, "x")).collect());

        let txn = db.transaction("items", TransactionMode::ReadOnly);
        let store = txn.object_store("items").unwrap();
        let closed = store
            .open_key_cursor(KeyRange::bound(2, 4, false, false).unwrap(), Direction::Next)
            .unwrap();
        let open_upper = store
            .open_key_cursor(KeyRange::bound(2, 5, false, true).unwrap(), Direction::Prev)
            .unwrap();
        let count = store.count(KeyRange::bound(2, 4, true, false).unwrap()).unwrap();
        let closed_steps = collect_cursor(&closed);
        let open_steps = collect_cursor(&open_upper);
        db.run();

        let keys = |steps: Vec<crate::fixtures::CursorStep>| -> Vec<Key> {
            steps.into_iter().map(|s| s.key).collect()
        };
        assert_eq!(keys(closed_steps.take()), vec![Key::from(2), Key::from(3), Key::from(4)]);
        assert_eq!(keys(open_steps.take()), vec![Key::from(4), Key::from(3), Key::from(2)]);
        assert_eq!(count.result().unwrap().count(), Some(2));
        assert!(KeyRange::bound(3, 2, false, false).is_err());
    }

    #[test]
    fn cursor_resumes_after_concurrent_delete() {
        let db = TestEngine::with_store("items", StoreOptions::new().key_path("id"));
        db.put_all("items", (1..=5).map(|i| tagged(i, "x")).collect());

        let txn = db.transaction("items", TransactionMode::ReadWrite);
        let handle = txn.object_store("items").unwrap();
        let request = handle.open_cursor(KeyRange::all(), Direction::Next).unwrap();
        let steps = walk_cursor(&request, move |cursor| {
            if cursor.key() == Some(Key::from(2)) {
                handle.delete(Key::from(3)).unwrap();
            }
            cursor.continue_().unwrap();
        });
        db.run();
        let keys: Vec<Key> = steps.take().into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec![Key::from(1), Key::from(2), Key::from(4), Key::from(5)]);
        assert_eq!(db.count("items"), 4);
    }

    #[test]
    fn cursor_update_and_delete_write_through() {
        let db = TestEngine::with_store("items", StoreOptions::new().key_path("id"));
        db.put_all("items", (1..=4).map(|i| tagged(i, "x")).collect());

        let txn = db.transaction("items", TransactionMode::ReadWrite);
        let request = txn
            .object_store("items")
            .unwrap()
            .open_cursor(KeyRange::all(), Direction::Next)
            .unwrap();
        walk_cursor(&request, |cursor| {
            let id = cursor.primary_key().and_then(|k| k.as_number()).unwrap_or(0.0);
            if id as i32 % 2 == 0 {
                cursor.delete().unwrap();
            } else {
                cursor.update(tagged(id as i32, "updated")).unwrap();
            }
            cursor.continue_().unwrap();
        });
        db.run();
        assert_eq!(txn.status(), TransactionStatus::Committed);
        assert_eq!(
            db.read_all("items"),
            vec![
                (Key::from(1), tagged(1, "updated")),
                (Key::from(3), tagged(3, "updated")),
            ]
        );
    }

    #[test]
    fn index_cursor_follows_index_order() {
        let db = TestEngine::with_index(
            "items",
            StoreOptions::new().key_path("id"),
            "by_tag",
            "tag",
            IndexOptions::new(),
        );
        db.put_all("items", vec![tagged(1, "b"), tagged(2, "a"), tagged(3, "b")]);

        let txn = db.transaction("items", TransactionMode::ReadOnly);
        let index = txn.object_store("items").unwrap().index("by_tag").unwrap();
        let all = index.open_cursor(KeyRange::all(), Direction::Next).unwrap();
        let unique = index.open_cursor(KeyRange::all(), Direction::PrevUnique).unwrap();
        let all_steps = collect_cursor(&all);
        let unique_steps = collect_cursor(&unique);
        db.run();

        let pairs: Vec<(Key, Key)> = all_steps
            .take()
            .into_iter()
            .map(|s| (s.key, s.primary_key))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Key::from("a"), Key::from(2)),
                (Key::from("b"), Key::from(1)),
                (Key::from("b"), Key::from(3)),
            ]
        );
        let unique: Vec<Option<Value>> = unique_steps.take().into_iter().map(|s| s.value).collect();
        assert_eq!(unique, vec![Some(tagged(1, "b")), Some(tagged(2, "a"))]);
    }

    #[test]
    fn multi_entry_index_spreads_arrays() {
        let db = TestEngine::with_index(
            "people",
            StoreOptions::new().key_path("name"),
            "parents",
            "parent",
            IndexOptions::new().multi_entry(true),
        );
        let child = |name: &str, parents: &[&str]| {
            Value::map([
                ("name", Value::from(name)),
                ("parent", Value::from(parents.to_vec())),
            ])
        };
        db.put_all(
            "people",
            vec![child("Bart", &["Homer", "Marge"]), child("Lisa", &["Homer", "Marge", "Homer"])],
        );

        let txn = db.transaction("people", TransactionMode::ReadOnly);
        let index = txn.object_store("people").unwrap().index("parents").unwrap();
        let homers = index.count(Key::from("Homer")).unwrap();
        let first = index.get_key(Key::from("Marge")).unwrap();
        db.run();
        assert_eq!(homers.result().unwrap().count(), Some(2));
        assert_eq!(first.result().unwrap().key(), Some(&Key::from("Bart")));
    }

    fn trace(txn: &Transaction, label: &'static str, log: &Collector<String>) {
        let sink = log.clone();
        txn.on_complete(move |_| sink.push(format!("{label} complete")));
    }

    fn traced_get(txn: &Transaction, store: &str, label: &'static str, log: &Collector<String>) {
        let sink = log.clone();
        txn.object_store(store)
            .unwrap()
            .get(Key::from(1))
            .unwrap()
            .on_success(move |_| sink.push(format!("{label} read")));
    }

    fn two_stores() -> TestEngine {
        TestEngine::open(Engine::new(), 1, |txn| {
            txn.create_object_store("a", &StoreOptions::new().key_path("id")).unwrap();
            txn.create_object_store("b", &StoreOptions::new().key_path("id")).unwrap();
        })
    }

    #[test]
    fn writers_on_one_store_run_one_at_a_time() {
        let db = two_stores();
        let log = Collector::new();
        let first = db.transaction("a", TransactionMode::ReadWrite);
        let second = db.transaction("a", TransactionMode::ReadWrite);
        trace(&first, "first", &log);
        trace(&second, "second", &log);
        traced_get(&first, "a", "first", &log);
        traced_get(&second, "a", "second", &log);
        db.run();
        assert_eq!(
            log.items(),
            vec!["first read", "first complete", "second read", "second complete"]
        );
    }

    #[test]
    fn readers_and_disjoint_writers_overlap() {
        let db = two_stores();
        let log = Collector::new();
        let reader_one = db.transaction("a", TransactionMode::ReadOnly);
        let reader_two = db.transaction("a", TransactionMode::ReadOnly);
        let writer_b = db.transaction("b", TransactionMode::ReadWrite);
        trace(&reader_one, "r1", &log);
        trace(&reader_two, "r2", &log);
        trace(&writer_b, "wb", &log);
        traced_get(&reader_one, "a", "r1", &log);
        traced_get(&reader_two, "a", "r2", &log);
        traced_get(&writer_b, "b", "wb", &log);
        db.run();

        let items = log.items();
        let at = |s: &str| items.iter().position(|i| i == s).unwrap();
        assert!(at("r2 read") < at("r1 complete"));
        assert!(at("wb read") < at("r1 complete"));
    }

    #[test]
    fn writer_waits_for_earlier_reader() {
        let db = two_stores();
        let log = Collector::new();
        let reader = db.transaction("a", TransactionMode::ReadOnly);
        let writer = db.transaction("a", TransactionMode::ReadWrite);
        trace(&reader, "reader", &log);
        trace(&writer, "writer", &log);
        traced_get(&reader, "a", "reader", &log);
        traced_get(&writer, "a", "writer", &log);
        db.run();

        let items = log.items();
        let at = |s: &str| items.iter().position(|i| i == s).unwrap();
        assert!(at("reader complete") < at("writer read"));
    }

    #[test]
    fn readers_see_a_snapshot() {
        let db = TestEngine::with_store("items", StoreOptions::new().key_path("id"));
        db.put_all("items", vec![tagged(1, "before")]);

        let reader = db.transaction("items", TransactionMode::ReadOnly);
        let seen = reader.object_store("items").unwrap().get(Key::from(1)).unwrap();
        let writer = db.transaction("items", TransactionMode::ReadWrite);
        writer
            .object_store("items")
            .unwrap()
            .put(tagged(1, "after"), None)
            .unwrap();
        db.run();
        assert_eq!(seen.result().unwrap().value(), Some(&tagged(1, "before")));
        assert_eq!(db.read_all("items"), vec![(Key::from(1), tagged(1, "after"))]);
    }

    #[test]
    fn idle_transaction_times_out() {
        let engine = Engine::with_config(Config::new().idle_timeout_ticks(2));
        let db = TestEngine::open(engine, 1, |txn| {
            txn.create_object_store("items", &StoreOptions::new()).unwrap();
        });
        let txn = db.transaction("items", TransactionMode::ReadWrite);
        db.run();
        assert_eq!(txn.status(), TransactionStatus::Aborted);
        assert_eq!(txn.error().map(|e| e.kind()), Some(ErrorKind::Timeout));
        assert_eq!(db.stats().transactions_timed_out, 1);
    }

    #[test]
    fn explicit_abort_discards_writes() {
        let db = TestEngine::with_store("items", StoreOptions::new().key_path("id"));
        db.put_all("items", vec![tagged(1, "kept")]);

        let txn = db.transaction("items", TransactionMode::ReadWrite);
        let store = txn.object_store("items").unwrap();
        store.put(tagged(2, "dropped"), None).unwrap();
        store
            .delete(Key::from(1))
            .unwrap()
            .on_success(|event| event.request.transaction().abort().unwrap());
        db.run();
        assert_eq!(txn.status(), TransactionStatus::Aborted);
        assert_eq!(txn.error(), None);
        assert_eq!(db.read_all("items"), vec![(Key::from(1), tagged(1, "kept"))]);
    }

    #[test]
    fn aborted_upgrade_restores_schema() {
        let db = TestEngine::with_store("items", StoreOptions::new().key_path("id"));
        db.put_all("items", vec![tagged(1, "x")]);
        db.conn.close();

        let open = db.engine.open(crate::fixtures::TEST_DATABASE, Some(2)).unwrap();
        open.on_upgrade_needed(|event| {
            let txn = event.transaction.as_ref().unwrap();
            txn.delete_object_store("items").unwrap();
            txn.create_object_store("other", &StoreOptions::new()).unwrap();
            txn.abort().unwrap();
        });
        let err = open.wait().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Abort);

        let info = db.engine.database_info(crate::fixtures::TEST_DATABASE).unwrap();
        assert_eq!(info.version, 1);
        assert_eq!(info.stores.len(), 1);
        assert_eq!(info.stores[0].name, "items");
        assert_eq!(info.stores[0].records, 1);
    }

    #[test]
    fn bootstrapped_database_is_queryable() {
        let engine = Engine::new();
        let definition = DatabaseDefinition::from_json_str(
            r#"{
                "version": 3,
                "stores": [{
                    "name": "items",
                    "keyOptions": { "autoIncrement": true },
                    "indexes": [{ "name": "by_tag", "keyPath": "tag" }],
                    "seedData": [{ "tag": "b" }, { "tag": "a" }, { "tag": "b" }]
                }]
            }"#,
        )
        .unwrap();
        assert!(engine.bootstrap("seeded", &definition).unwrap().is_ready());

        let conn = engine.open("seeded", None).unwrap().wait().unwrap();
        assert_eq!(conn.version(), 3);
        let txn = conn.transaction(&["items"], TransactionMode::ReadOnly).unwrap();
        let count = txn
            .object_store("items")
            .unwrap()
            .index("by_tag")
            .unwrap()
            .count(Key::from("b"))
            .unwrap();
        engine.run_until_idle().unwrap();
        assert_eq!(count.result().unwrap().count(), Some(2));
    }

    #[test]
    fn unique_harness_rejects_conflicting_tags() {
        let mut harness = IntegrationHarness::with_unique_index();
        harness.apply(&RecordOperation::Put { id: 1, tag: "a".into() });
        harness.apply(&RecordOperation::Put { id: 1, tag: "a".into() });
        harness.apply(&RecordOperation::Put { id: 2, tag: "a".into() });
        harness.apply(&RecordOperation::Add { id: 3, tag: "a".into() });
        harness.apply(&RecordOperation::Put { id: 2, tag: "b".into() });
        harness.apply(&RecordOperation::Delete { from: 1, to: 1 });
        harness.apply(&RecordOperation::Put { id: 3, tag: "a".into() });
        harness.verify_all();
        assert_eq!(harness.tracked_count(), 2);
    }

    /// Walks the store with a cursor, applying one mutation per step, and
    /// returns the keys the cursor reported.
    fn walk_while_mutating(
        db: &TestEngine,
        direction: Direction,
        mutations: Vec<(bool, i32)>,
    ) -> Vec<Key> {
        let txn = db.transaction("items", TransactionMode::ReadWrite);
        let handle = txn.object_store("items").unwrap();
        let request = handle.open_cursor(KeyRange::all(), direction).unwrap();
        let mut pending = mutations.into_iter();
        let steps = walk_cursor(&request, move |cursor| {
            match pending.next() {
                Some((true, id)) => {
                    handle.put(tagged(id, "m"), None).unwrap();
                }
                Some((false, id)) => {
                    handle.delete(Key::from(id)).unwrap();
                }
                None => {}
            }
            cursor.continue_().unwrap();
        });
        db.run();
        assert_eq!(txn.status(), TransactionStatus::Committed);
        steps.take().into_iter().map(|s| s.key).collect()
    }

    fn direction_strategy() -> impl Strategy<Value = Direction> {
        prop_oneof![Just(Direction::Next), Just(Direction::Prev)]
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn store_and_index_match_model(ops in operation_sequence_strategy(1, 24)) {
            let mut harness = IntegrationHarness::new();
            for op in &ops {
                harness.apply(op);
            }
            harness.verify_all();
        }

        #[test]
        fn unique_index_matches_model(ops in operation_sequence_strategy(1, 32)) {
            let mut harness = IntegrationHarness::with_unique_index();
            for op in &ops {
                harness.apply(op);
                harness.verify_all();
            }
        }

        #[test]
        fn cursor_keys_stay_monotonic_under_writes(
            initial in prop::collection::btree_set(0i32..40, 0..20),
            mutations in prop::collection::vec((any::<bool>(), 0i32..40), 0..30),
            direction in direction_strategy(),
        ) {
            let db = TestEngine::with_store("items", StoreOptions::new().key_path("id"));
            db.put_all("items", initial.iter().map(|&id| tagged(id, "x")).collect());

            let keys = walk_while_mutating(&db, direction, mutations);
            let ordered = keys.windows(2).all(|pair| match direction {
                Direction::Prev => pair[0] > pair[1],
                _ => pair[0] < pair[1],
            });
            prop_assert!(ordered, "cursor went back: {:?}", keys);
        }
    }
}
