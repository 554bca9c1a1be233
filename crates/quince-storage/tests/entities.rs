//! Create, find, write and delete through the entity facade.

mod common;

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use common::*;
use quince_core::{Schema, Value};
use quince_storage::{RowId, Store, StoreError};

#[test]
fn create_multiples_and_find_by_id() {
    let schema = test_class();
    let store = store_with(&[schema.clone()]);

    let created: Vec<_> = (1..=9)
        .map(|n| {
            store
                .create(&schema, &[("foo", n.into()), ("bar", format!("argh{n}").into())])
                .unwrap()
        })
        .collect();

    for (n, row) in (1..=9).zip(&created) {
        assert_eq!(row.get_as::<i64>("foo").unwrap(), n);
        let found = store.find(&schema, RowId(n)).unwrap().unwrap();
        assert_eq!(found.get_as::<i64>("foo").unwrap(), n);
        assert_eq!(found.get_as::<String>("bar").unwrap(), format!("argh{n}"));
        assert_eq!(store.count(&schema).unwrap(), 9);
    }
    assert!(store.find(&schema, RowId(10)).unwrap().is_none());
}

#[test]
fn count_tracks_inserts() {
    let schema = test_class();
    let store = store_with(&[schema.clone()]);
    assert_eq!(store.count(&schema).unwrap(), 0);
    for n in 1..=9 {
        store.create(&schema, &[("foo", n.into())]).unwrap();
        assert_eq!(store.count(&schema).unwrap(), n);
    }
}

#[test]
fn find_by_and_find_first_by() {
    let schema = test_class();
    let store = store_with(&[schema.clone()]);
    store
        .create(&schema, &[("foo", 2.into()), ("bar", "argh".into())])
        .unwrap();

    let by_foo = store.find_by(&schema, &[("foo", 2.into())]).unwrap();
    assert_eq!(by_foo.len(), 1);
    assert_eq!(by_foo[0].get("bar").unwrap(), Value::Text("argh".into()));

    let by_bar = store.find_first_by(&schema, &[("bar", "argh".into())]).unwrap().unwrap();
    assert_eq!(by_bar.get("foo").unwrap(), Value::Integer(2));

    assert!(store.find_first_by(&schema, &[("bar", "nope".into())]).unwrap().is_none());
    assert_eq!(store.find_by(&schema, &[]).unwrap().len(), 1);

    // Columns of another entity type are not filters here.
    assert!(matches!(
        store.find_by(&schema, &[("fred", 1.into())]),
        Err(StoreError::UnknownColumn { .. })
    ));
}

#[test]
fn boolean_find_by() {
    let schema = parity_test();
    let store = store_with(&[schema.clone()]);
    let parity = |n: u32| n.count_ones() % 2 == 0;

    for n in 0..512u32 {
        store
            .create(&schema, &[("number", n.into()), ("parity", parity(n).into())])
            .unwrap();
    }

    let even = store.find_by(&schema, &[("parity", true.into())]).unwrap();
    let odd = store.find_by(&schema, &[("parity", false.into())]).unwrap();
    assert_eq!(even.len() + odd.len(), 512);

    let mut seen = HashSet::new();
    for (rows, expected) in [(&even, true), (&odd, false)] {
        for row in rows {
            let number = row.get_as::<i64>("number").unwrap();
            assert_eq!(row.get_as::<bool>("parity").unwrap(), expected);
            assert_eq!(parity(number as u32), expected);
            seen.insert(number);
        }
    }
    assert_eq!(seen.len(), 512);
}

#[test]
fn writes_are_visible_through_every_handle() {
    let schema = test_class();
    let store = store_with(&[schema.clone()]);
    store
        .create(&schema, &[("foo", 1.into()), ("bar", "argh".into())])
        .unwrap();

    let fresh = store.find(&schema, RowId(1)).unwrap().unwrap();
    let tc = store.find(&schema, RowId(1)).unwrap().unwrap();
    tc.set("foo", 2).unwrap();

    assert_eq!(fresh.get("foo").unwrap(), Value::Integer(2));
    assert!(!fresh.is_stale().unwrap());

    // The write reached storage, not just the shared entry.
    drop((fresh, tc));
    assert_eq!(store.cached_rows(), 0);
    let reloaded = store.find(&schema, RowId(1)).unwrap().unwrap();
    assert_eq!(reloaded.get("foo").unwrap(), Value::Integer(2));
}

#[test]
fn equality_follows_table_and_row_id() {
    let schema = test_class();
    let store = store_with(&[schema.clone()]);
    let tc1 = store.create(&schema, &[("foo", 1.into()), ("bar", "hello".into())]).unwrap();
    let tc2 = store.create(&schema, &[("foo", 1.into()), ("bar", "hello".into())]).unwrap();
    let tc3 = store.create(&schema, &[("foo", 2.into()), ("bar", "goodbye".into())]).unwrap();
    let tc1p = store.find(&schema, tc1.row_id()).unwrap().unwrap();

    assert_eq!(tc1, tc1p);
    assert_eq!(tc1p, tc1);
    assert_ne!(tc1, tc2);
    assert_ne!(tc2, tc1p);
    assert_ne!(tc1, tc3);
    assert_ne!(tc3, tc2);

    let set: HashSet<_> = [tc1.clone(), tc1p.clone(), tc2.clone()].into_iter().collect();
    assert_eq!(set.len(), 2);
    assert!(set.contains(&tc1p));

    // Same row id in another table is a different entity.
    let other = Schema::builder("Other").build().unwrap();
    store.create_table(&other).unwrap();
    let o1 = store.create(&other, &[]).unwrap();
    assert_eq!(o1.row_id(), tc1.row_id());
    assert_ne!(o1, tc1);
}

#[test]
fn delete_reaches_every_handle() {
    let schema = test_class();
    let store = store_with(&[schema.clone()]);
    store
        .create(&schema, &[("foo", 42.into()), ("bar", "Wait, what was the question?".into())])
        .unwrap();
    let tc1 = store.find_first_by(&schema, &[("foo", 42.into())]).unwrap().unwrap();
    let tc2 = store.find_first_by(&schema, &[("foo", 42.into())]).unwrap().unwrap();
    assert!(!tc1.is_stale().unwrap());
    assert_eq!(tc1.to_mapping().unwrap(), tc2.to_mapping().unwrap());

    tc1.delete().unwrap();

    assert!(store.find_by(&schema, &[("foo", 42.into())]).unwrap().is_empty());
    assert!(store.find_first_by(&schema, &[("foo", 42.into())]).unwrap().is_none());
    assert!(store.find(&schema, tc1.row_id()).unwrap().is_none());
    for row in [&tc1, &tc2] {
        assert!(row.is_deleted().unwrap());
        for column in ["foo", "bar", "row_id"] {
            assert_eq!(row.get(column).unwrap(), Value::Null);
        }
    }
    // Deleted handles stay equal to each other.
    assert_eq!(tc1, tc2);
    assert!(matches!(tc2.set("foo", 1), Err(StoreError::Deleted { .. })));
    tc2.delete().unwrap();
}

#[test]
fn delete_one_of_many() {
    let schema = test_class();
    let store = store_with(&[schema.clone()]);
    for n in 1..=9 {
        store.create(&schema, &[("foo", n.into())]).unwrap();
    }
    store.find(&schema, RowId(2)).unwrap().unwrap().delete().unwrap();
    assert_eq!(store.count(&schema).unwrap(), 8);
}

#[test]
fn delete_where_removes_exactly_the_matches() {
    let schema = test_class();
    let store = store_with(&[schema.clone()]);
    for foo in 0..=10 {
        for bar in ["A", "B", "C", "D", "E", "F", "G"] {
            store.create(&schema, &[("foo", foo.into()), ("bar", bar.into())]).unwrap();
        }
    }
    let held = store.find_first_by(&schema, &[("bar", "C".into())]).unwrap().unwrap();
    let old_count = store.count(&schema).unwrap();

    assert_eq!(store.delete_where(&schema, &[("foo", 1.into()), ("bar", "B".into())]).unwrap(), 1);
    assert_eq!(store.count(&schema).unwrap(), old_count - 1);
    assert!(store.find_by(&schema, &[("foo", 1.into()), ("bar", "B".into())]).unwrap().is_empty());

    assert_eq!(store.delete_where(&schema, &[("bar", "C".into())]).unwrap(), 11);
    assert_eq!(store.count(&schema).unwrap(), old_count - 12);
    assert!(store.find_by(&schema, &[("bar", "C".into())]).unwrap().is_empty());
    assert!(held.is_deleted().unwrap());

    assert_eq!(store.delete_where(&schema, &[("bar", "Z".into())]).unwrap(), 0);
}

#[test]
fn delete_all_empties_the_table() {
    let schema = test_class();
    let store = store_with(&[schema.clone()]);
    for n in 0..20 {
        store.create(&schema, &[("foo", n.into())]).unwrap();
    }
    assert_eq!(store.delete_all(&schema).unwrap(), 20);
    assert!(store.find_all(&schema).unwrap().is_empty());
}

#[test]
fn mapping_matches_accessors() {
    let schema = test_class();
    let store = store_with(&[schema.clone()]);
    for foo in 0..=5 {
        for bar in ["A", "B", "C"] {
            store.create(&schema, &[("foo", foo.into()), ("bar", bar.into())]).unwrap();
        }
    }
    for row in store.find_all(&schema).unwrap() {
        let mapping = row.to_mapping().unwrap();
        for column in ["foo", "bar", "created", "updated"] {
            assert_eq!(mapping[column], row.get(column).unwrap());
        }
    }
}

#[test]
fn check_constraints_reject_bad_rows() {
    let schema = tc3();
    let store = store_with(&[schema.clone()]);
    let when = Utc.with_ymd_and_hms(2009, 7, 1, 8, 0, 0).unwrap();

    let ok = store
        .create(&schema, &[("ugh", when.into()), ("yikes", 0.into())])
        .unwrap();
    let err = store.create(&schema, &[("yikes", (-1).into())]).unwrap_err();
    assert!(matches!(err, StoreError::ConstraintViolation { .. }));
    assert_eq!(store.count(&schema).unwrap(), 1);

    let again = store.find_first_by(&schema, &[("ugh", when.into())]).unwrap().unwrap();
    assert_eq!(again, ok);
    assert_eq!(again.get("ugh").unwrap(), Value::DateTime(when));
}

#[test]
fn tables_without_columns_still_hold_rows() {
    let schema = no_columns_test_table();
    let store = store_with(&[schema.clone()]);
    let row = store.create(&schema, &[]).unwrap();
    assert_eq!(store.count(&schema).unwrap(), 1);
    row.delete().unwrap();
    assert_eq!(store.count(&schema).unwrap(), 0);
}

#[test]
fn reserved_words_work_as_names() {
    let create = Schema::builder("Create")
        .column("name", quince_core::ColumnType::String)
        .build()
        .unwrap();
    let group = Schema::builder("Group")
        .reference(
            "other",
            quince_core::Reference::to(&create).on_delete(quince_core::DeletePolicy::Cascade),
        )
        .build()
        .unwrap();
    let order = Schema::builder("Order")
        .column("group", quince_core::ColumnType::Integer)
        .build()
        .unwrap();
    let store = store_with(&[create.clone(), group.clone(), order.clone()]);

    store.create(&create, &[("name", "bar".into())]).unwrap();
    let c = store.find_first_by(&create, &[("name", "bar".into())]).unwrap().unwrap();
    c.set("name", "blah").unwrap();
    c.set("name", "bar").unwrap();
    assert_eq!(c.get_as::<String>("name").unwrap(), "bar");
    c.delete().unwrap();

    store.create(&order, &[("group", 42.into())]).unwrap();
    let o = store.find_first_by(&order, &[("group", 42.into())]).unwrap().unwrap();
    o.set("group", 37).unwrap();
    assert_eq!(o.get_as::<i64>("group").unwrap(), 37);

    let blah = store.create(&create, &[("name", "blah".into())]).unwrap();
    store.create(&group, &[("other", (&blah).into())]).unwrap();
    let first = &store.find_all(&group).unwrap()[0];
    let other = first.get_ref("other").unwrap().unwrap();
    assert_eq!(other.get_as::<String>("name").unwrap(), "blah");
}

#[test]
fn stale_entries_pick_up_changes_from_another_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let path = path.to_string_lossy();
    let schema = test_class();

    let ours = Store::open_path(&path).unwrap();
    ours.create_table(&schema).unwrap();
    let theirs = Store::open_path(&path).unwrap();
    theirs.create_table(&schema).unwrap();

    let row = ours.create(&schema, &[("foo", 1.into())]).unwrap();
    let remote = theirs.find(&schema, row.row_id()).unwrap().unwrap();
    remote.set("foo", 2).unwrap();

    // Nothing told our cache about the change yet.
    assert_eq!(row.get("foo").unwrap(), Value::Integer(1));
    ours.mark_stale(&row).unwrap();
    assert!(row.is_stale().unwrap());
    assert_eq!(row.get("foo").unwrap(), Value::Integer(2));
    assert!(!row.is_stale().unwrap());

    remote.delete().unwrap();
    ours.mark_stale(&row).unwrap();
    assert!(row.is_deleted().unwrap());
    assert!(ours.find(&schema, row.row_id()).unwrap().is_none());
}

#[test]
fn queries_racing_a_write_never_roll_it_back() {
    let schema = test_class();
    let store = store_with(&[schema.clone()]);
    for n in 0..2000 {
        store
            .create(&schema, &[("foo", 0.into()), ("bar", format!("filler {n}").into())])
            .unwrap();
    }
    // Last in row_id order, so the scan reaches it after the write lands.
    let row = store.create(&schema, &[("foo", 0.into())]).unwrap();

    for round in 1..=20i64 {
        thread::scope(|s| {
            let reader = s.spawn(|| store.find_all(&schema).unwrap().len());
            thread::sleep(Duration::from_micros(300));
            row.set("foo", round).unwrap();
            assert_eq!(reader.join().unwrap(), 2001);
        });
        assert_eq!(row.get("foo").unwrap(), Value::Integer(round));
        let stored = stored_column(&store, schema.table_name(), "foo");
        assert_eq!(stored[&row.row_id().0].as_i64(), Some(round));
        let found = store.find(&schema, row.row_id()).unwrap().unwrap();
        assert_eq!(found.get("foo").unwrap(), Value::Integer(round));
    }
}

#[test]
fn file_backed_rows_survive_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.db");
    let path = path.to_string_lossy();
    let schema = test_class();

    {
        let store = Store::open_path(&path).unwrap();
        store.create_table(&schema).unwrap();
        store
            .create(&schema, &[("foo", 7.into()), ("bar", "kept".into())])
            .unwrap();
        store.close().unwrap();
    }

    let store = Store::open_path(&path).unwrap();
    store.create_table(&schema).unwrap();
    let row = store.find_first_by(&schema, &[("bar", "kept".into())]).unwrap().unwrap();
    assert_eq!(row.get("foo").unwrap(), Value::Integer(7));
    assert_eq!(store.catalog().unwrap()[0].rows, 1);
}
