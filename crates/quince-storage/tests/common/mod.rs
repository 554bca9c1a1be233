//! Entity declarations shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use quince_core::{Column, ColumnType, DeletePolicy, Reference, Schema};
use quince_storage::Store;

pub fn test_class() -> Arc<Schema> {
    Schema::builder("TestClass")
        .column("foo", ColumnType::Integer)
        .column("bar", ColumnType::String)
        .build()
        .unwrap()
}

pub fn test_class2() -> Arc<Schema> {
    Schema::builder("TestClass2")
        .column("fred", ColumnType::Integer)
        .column("barney", ColumnType::String)
        .index_on("fred")
        .build()
        .unwrap()
}

pub fn tc3() -> Arc<Schema> {
    Schema::builder("TC3")
        .column("ugh", ColumnType::DateTime)
        .column("yikes", ColumnType::Integer)
        .constraint("yikes_pos", "yikes >= 0")
        .build()
        .unwrap()
}

pub fn tc4(t1: &Arc<Schema>, t2: &Arc<Schema>) -> Arc<Schema> {
    Schema::builder("TC4")
        .reference("t1", Reference::to(t1))
        .reference("t2", Reference::to(t2))
        .column_with(Column::new("enabled", ColumnType::Boolean).default_value(true))
        .build()
        .unwrap()
}

pub fn self_ref() -> Arc<Schema> {
    Schema::builder("SelfRef")
        .reference("one", Reference::named("SelfRef"))
        .build()
        .unwrap()
}

pub fn custom_query_table() -> Arc<Schema> {
    Schema::builder("CustomQueryTable")
        .column("one", ColumnType::Integer)
        .column("two", ColumnType::Integer)
        .query("ltcols", "one < two")
        .query("ltvars", "one < ? and two < ?")
        .custom_query("cltvars", "select * from __TABLE__ where one < ? and two < ?")
        .custom_query("ones_only", "select row_id, one from __TABLE__ where one = :one")
        .build()
        .unwrap()
}

pub fn to_ref() -> Arc<Schema> {
    Schema::builder("ToRef")
        .column("foo", ColumnType::String)
        .build()
        .unwrap()
}

pub fn from_ref(target: &Arc<Schema>) -> Arc<Schema> {
    Schema::builder("FromRef")
        .reference("t", Reference::to(target).on_delete(DeletePolicy::Cascade))
        .query("to_is", "t = ?")
        .query("to_is_hash", "t = :t")
        .build()
        .unwrap()
}

pub fn fresh_test_table() -> Arc<Schema> {
    let mut builder = Schema::builder("FreshTestTable");
    for name in ["fee", "fie", "foe", "fum", "foo", "bar"] {
        builder = builder.column(name, ColumnType::Integer);
    }
    builder.build().unwrap()
}

pub fn blob_test_table() -> Arc<Schema> {
    Schema::builder("BlobTestTable")
        .column("info", ColumnType::Blob)
        .build()
        .unwrap()
}

pub fn zblob_test_table() -> Arc<Schema> {
    Schema::builder("ZBlobTestTable")
        .column("info", ColumnType::ZBlob)
        .build()
        .unwrap()
}

pub fn object_test_table() -> Arc<Schema> {
    Schema::builder("ObjectTestTable")
        .column("otype", ColumnType::String)
        .column("obj", ColumnType::Object)
        .build()
        .unwrap()
}

pub fn no_columns_test_table() -> Arc<Schema> {
    Schema::builder("NoColumnsTestTable").build().unwrap()
}

pub fn parity_test() -> Arc<Schema> {
    Schema::builder("ParityTest")
        .column("number", ColumnType::Integer)
        .column("parity", ColumnType::Boolean)
        .build()
        .unwrap()
}

/// A fresh in-memory store with `schemas` created.
pub fn store_with(schemas: &[Arc<Schema>]) -> Store {
    let store = Store::open_in_memory().unwrap();
    store.create_tables(schemas).unwrap();
    store
}

/// One column of `table` as stored, keyed by row id, read past the cache.
pub fn stored_column(store: &Store, table: &str, column: &str) -> HashMap<i64, serde_json::Value> {
    store
        .dump_table(table, None)
        .unwrap()
        .into_iter()
        .map(|row| (row["row_id"].as_i64().unwrap(), row[column].clone()))
        .collect()
}

/// Deterministic filler text built from a fixed word list.
pub fn filler_text(words: usize) -> String {
    const WORDS: [&str; 24] = [
        "the", "quick", "brown", "fox", "jumps", "over", "a", "lazy", "dog", "now", "is", "time",
        "for", "all", "good", "men", "to", "come", "aid", "party", "jackdaws", "love", "my",
        "sphinx",
    ];
    let mut text = String::new();
    for i in 0..words {
        text.push_str(WORDS[(i * 7 + i / 3) % WORDS.len()]);
        text.push(' ');
    }
    text
}
