//! Read-side views over the CRUD cache.
//!
//! `find` joins a collection's id list against `by_id` so consumers get
//! materialized records; `find_by_id` exposes one entry. Both return an
//! in-flight sentinel when the cache has no matching entry yet, so a view
//! rendered before the first dispatch still sees a well-formed shape.

use super::MIXIN_NAME;
use crate::action::Params;
use crate::reducer::{ModelState, StateSlice};
use crate::selectors::Selector;
use serde_json::{Value, json};
use std::sync::Arc;

use super::reducer::{Collection, CrudState, RecordEntry, id_key};

fn crud_state(state: &ModelState) -> Option<&CrudState> {
    match state.get(MIXIN_NAME) {
        Some(StateSlice::Crud(crud)) => Some(crud),
        _ => None,
    }
}

fn record_value(entry: &RecordEntry) -> Value {
    entry.record.clone().unwrap_or_else(|| json!({}))
}

fn collection_view(crud: &CrudState, collection: &Collection) -> Value {
    let result: Vec<Value> = collection
        .ids
        .iter()
        .filter_map(|id| crud.by_id.get(id))
        .map(record_value)
        .collect();

    match serde_json::to_value(collection) {
        Ok(Value::Object(mut fields)) => {
            fields.remove("ids");
            fields.insert("result".into(), Value::Array(result));
            Value::Object(fields)
        },
        _ => json!({ "result": result }),
    }
}

fn entry_view(entry: &RecordEntry) -> Value {
    match serde_json::to_value(entry) {
        Ok(view) => view,
        Err(_) => Value::Null,
    }
}

fn find_sentinel() -> Value {
    json!({
        "result": [],
        "requesting": true,
        "requested": false,
    })
}

fn find_by_id_sentinel() -> Value {
    json!({
        "record": {},
        "requesting": true,
        "requested": false,
    })
}

/// View over one cached query: the collection entry with `ids` joined into
/// full records under `result`.
#[must_use]
pub fn find_selector() -> Selector {
    Arc::new(|state: &ModelState, params: &Params| {
        let Some(crud) = crud_state(state) else {
            return find_sentinel();
        };
        match crud.collection(params) {
            Some(collection) => collection_view(crud, collection),
            None => find_sentinel(),
        }
    })
}

/// View over one entity: the `by_id` entry for `params.id`.
#[must_use]
pub fn find_by_id_selector() -> Selector {
    Arc::new(|state: &ModelState, params: &Params| {
        let Some(crud) = crud_state(state) else {
            return find_by_id_sentinel();
        };
        let entry = params
            .get("id")
            .and_then(id_key)
            .and_then(|id| crud.by_id.get(&id));
        match entry {
            Some(entry) => entry_view(entry),
            None => find_by_id_sentinel(),
        }
    })
}

/// The mixin's contributed selector table.
#[must_use]
pub fn crud_selectors() -> Vec<(String, Selector)> {
    vec![
        ("find".to_string(), find_selector()),
        ("find_by_id".to_string(), find_by_id_selector()),
    ]
}
