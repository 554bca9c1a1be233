//! Blob, zblob and object columns.

mod common;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use common::*;
use quince_core::{codec, Value};
use quince_storage::RowId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Customer {
    name: String,
    address: String,
}

#[test]
fn blob_columns_store_bytes_verbatim() {
    let schema = blob_test_table();
    let store = store_with(&[schema.clone()]);
    let text = filler_text(301).into_bytes();
    let compressed = codec::compress(&text).unwrap();

    let row = store.create(&schema, &[("info", text.clone().into())]).unwrap();
    let crow = store.create(&schema, &[("info", compressed.clone().into())]).unwrap();
    drop((row, crow));

    let plain = store.find(&schema, RowId(1)).unwrap().unwrap();
    let packed = store.find(&schema, RowId(2)).unwrap().unwrap();
    assert_eq!(plain.get_as::<Vec<u8>>("info").unwrap(), text);
    assert_eq!(packed.get_as::<Vec<u8>>("info").unwrap(), compressed);
    assert_eq!(
        codec::decompress(&packed.get_as::<Vec<u8>>("info").unwrap()).unwrap(),
        text
    );
}

#[test]
fn zblob_columns_are_transparent() {
    let schema = zblob_test_table();
    let store = store_with(&[schema.clone()]);
    let text = filler_text(301).into_bytes();
    let compressed = codec::compress(&text).unwrap();

    let row = store.create(&schema, &[("info", text.clone().into())]).unwrap();
    let crow = store.create(&schema, &[("info", compressed.clone().into())]).unwrap();
    let (row_id, crow_id) = (row.row_id(), crow.row_id());
    drop((row, crow));

    let plain = store.find(&schema, row_id).unwrap().unwrap();
    let packed = store.find(&schema, crow_id).unwrap().unwrap();
    assert_eq!(plain.get_as::<Vec<u8>>("info").unwrap(), text);
    // Already-compressed input comes back exactly as given.
    let back = packed.get_as::<Vec<u8>>("info").unwrap();
    assert_eq!(back, compressed);
    assert_eq!(codec::decompress(&back).unwrap(), text);

    // On disk the zblob is smaller than the text it holds.
    let dumped = store.dump_table(schema.table_name(), None).unwrap();
    let stored_hex = dumped[0]["info"].as_str().unwrap().len();
    assert!(stored_hex / 2 < text.len());
}

#[test]
fn object_columns_round_trip() {
    let schema = object_test_table();
    let store = store_with(&[schema.clone()]);

    let big: serde_json::Value = serde_json::from_str(BIG_POWER).unwrap();
    let now: DateTime<Utc> = Utc::now();
    let set: BTreeSet<&str> = ["foo", "bar", "blah"].into_iter().collect();
    let customer = Customer {
        name: "Barney Rubble".into(),
        address: "303 Cobblestone Way".into(),
    };

    let things: Vec<(&str, Value)> = vec![
        ("String", json!("foo").into()),
        ("Hash", json!({"foo": "bar"}).into()),
        ("Array", json!(["a", "b", "c", "d"]).into()),
        ("Array", json!([1]).into()),
        ("Hash", json!({"augh": 1, "blaugh": "quux"}).into()),
        ("Array", json!([]).into()),
        ("Hash", json!({}).into()),
        ("Integer", json!(49).into()),
        (
            "Hash",
            json!({"blah": {"foo": "bar"}, "argh": 123, "yuck": [1, 1, 2, 3, 5, [8]]}).into(),
        ),
        ("Float", json!(0.618).into()),
        ("Bignum", big.into()),
        ("Array", json!([1, [2, [3, 4, [5, 6, [7, [8, 9, 10, [11, 12, [13]]]]]]]]).into()),
        (
            "Hash",
            json!({"a": {"b": {"c": {"d": {"e": ["f", "g", "h", "i", {"j": ["k", "l", {"m": "n"}]}]}}}}})
                .into(),
        ),
        ("Time", Value::object(&now).unwrap()),
        ("Set", Value::object(&set).unwrap()),
        ("Customer", Value::object(&customer).unwrap()),
        ("Regexp", Value::object(&"[1-3]+[A-Z]").unwrap()),
    ];

    for (otype, obj) in &things {
        store
            .create(&schema, &[("otype", (*otype).into()), ("obj", obj.clone())])
            .unwrap();
    }
    // Nothing is cached, so every value below is decoded from storage.
    assert_eq!(store.cached_rows(), 0);

    let rows = store.find_all(&schema).unwrap();
    assert_eq!(rows.len(), things.len());
    for ((otype, obj), row) in things.iter().zip(&rows) {
        assert_eq!(row.get_as::<String>("otype").unwrap(), *otype);
        assert_eq!(&row.get("obj").unwrap(), obj);
    }

    let by_type = |otype: &str| {
        rows.iter()
            .find(|row| row.get_as::<String>("otype").unwrap() == otype)
            .unwrap()
    };
    assert_eq!(by_type("Time").get_object::<DateTime<Utc>>("obj").unwrap(), now);
    assert_eq!(by_type("Set").get_object::<BTreeSet<String>>("obj").unwrap().len(), 3);
    assert_eq!(by_type("Customer").get_object::<Customer>("obj").unwrap(), customer);
    assert_eq!(
        by_type("Bignum").get("obj").unwrap().to_json().to_string(),
        BIG_POWER
    );
}

/// 99 to the 99th power.
const BIG_POWER: &str = "369729637649726772657187905628805440595668764281741102430259972423552570455277523421410650010128232727940978889548326540119429996769494359451621570193644014418071060667659301384999779999159200499899";

#[test]
fn mutated_objects_persist() {
    let schema = object_test_table();
    let store = store_with(&[schema.clone()]);
    let words: Vec<&str> = "It is a truth universally acknowledged that a single man in possession \
                            of a good fortune must be in want of a wife"
        .split(' ')
        .collect();

    let mut things: Vec<Vec<&str>> = (0..100)
        .map(|i| {
            let mut thing = words.clone();
            thing.rotate_left(i % words.len());
            thing
        })
        .collect();
    for thing in &things {
        store
            .create(&schema, &[("otype", "Array".into()), ("obj", Value::object(thing).unwrap())])
            .unwrap();
    }

    let rows = store.find_all(&schema).unwrap();
    assert_eq!(rows.len(), things.len());
    for (thing, row) in things.iter_mut().zip(&rows) {
        let mut obj: Vec<String> = row.get_object("obj").unwrap();
        obj.reverse();
        row.set("obj", Value::object(&obj).unwrap()).unwrap();
        assert_eq!(row.get_object::<Vec<String>>("obj").unwrap(), obj);

        store.mark_stale(row).unwrap();
        assert_eq!(row.get_object::<Vec<String>>("obj").unwrap(), obj);
        thing.reverse();
    }

    for (thing, row) in things.iter().zip(&rows) {
        assert_eq!(row.get_object::<Vec<String>>("obj").unwrap(), *thing);
    }
}
