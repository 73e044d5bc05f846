//! The normalized CRUD cache.
//!
//! Two sub-tables: `by_id` maps entity id to its last known snapshot plus
//! lifecycle flags, and `collections` caches the id list of each distinct
//! `find` query, matched by structural params equality (first match wins).
//! A `fetch_time` of `None` on a collection is the stale sentinel: a mutation
//! happened since the list was fetched and a consumer should re-fetch.

use super::CrudTypes;
use crate::action::{Action, Params};
use crate::reducer::{SliceReducer, StateSlice};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Cached snapshot and lifecycle of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecordEntry {
    /// Last known entity snapshot; `None` means not yet loaded.
    pub record: Option<Value>,
    /// A fetch or mutation for this id is in flight.
    pub requesting: bool,
    /// At least one attempt for this id has completed.
    pub requested: bool,
    /// When the snapshot was fetched; `None` means stale.
    pub fetch_time: Option<DateTime<Utc>>,
    /// Rejection reason of the last failed attempt.
    pub error: Option<Value>,
}

/// Cached id list for one distinct `find` query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    /// The query params this collection answers, compared structurally.
    pub params: Params,
    /// Ids returned by the query, in response order.
    pub ids: Vec<String>,
    /// The query is in flight.
    pub requesting: bool,
    /// The query completed at least once.
    pub requested: bool,
    /// When the list was fetched; `None` means stale.
    pub fetch_time: Option<DateTime<Utc>>,
    /// Rejection reason of the last failed attempt.
    pub error: Option<Value>,
}

impl Collection {
    fn in_flight(params: Params) -> Self {
        Self {
            params,
            ids: Vec::new(),
            requesting: true,
            requested: false,
            fetch_time: None,
            error: None,
        }
    }
}

/// The CRUD mixin's state slice.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CrudState {
    /// Entity table keyed by id.
    pub by_id: BTreeMap<String, RecordEntry>,
    /// Ordered query caches; lookup is a first-match linear scan.
    pub collections: Vec<Collection>,
}

impl CrudState {
    /// Locate the collection for an exact query-params value.
    #[must_use]
    pub fn collection(&self, params: &Params) -> Option<&Collection> {
        self.collections.iter().find(|c| &c.params == params)
    }
}

/// Render an id value (string or number) as the table key.
pub(crate) fn id_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Id an action refers to: the `id` param if present, else the payload's.
fn action_id(action: &Action) -> Option<String> {
    action
        .meta
        .params
        .get("id")
        .and_then(id_key)
        .or_else(|| action.payload.as_ref()?.get("id").and_then(id_key))
}

/// Reducer owning the CRUD cache of one model.
pub struct CrudReducer {
    types: CrudTypes,
}

impl CrudReducer {
    /// Build the reducer for a model's derived CRUD action types.
    #[must_use]
    pub const fn new(types: CrudTypes) -> Self {
        Self { types }
    }

    fn reduce_state(&self, state: &mut CrudState, action: &Action) {
        let t = &self.types;
        let kind = action.kind.as_str();

        if kind == t.find.intent || kind == t.find.success || kind == t.find.error {
            Self::reduce_collections(state, action);
            if kind == t.find.success {
                Self::upsert_found_records(state, action);
            }
            return;
        }

        if kind == t.find_by_id.intent || kind == t.update_by_id.intent {
            if let Some(id) = action_id(action) {
                state.by_id.entry(id).or_default().requesting = true;
            }
            return;
        }

        if kind == t.create.success {
            Self::upsert_one(state, action);
            Self::invalidate_collections(state);
            return;
        }

        if kind == t.find_by_id.success || kind == t.update_by_id.success {
            Self::upsert_one(state, action);
            return;
        }

        if kind == t.find_by_id.error || kind == t.update_by_id.error {
            if let Some(id) = action_id(action) {
                let entry = state.by_id.entry(id).or_default();
                entry.requesting = false;
                entry.fetch_time = action.meta.fetch_time;
                entry.error = action.payload.clone();
            }
            return;
        }

        if kind == t.delete_by_id.success {
            // Both tables move in this one transition so no reader observes a
            // dangling id between deletion and invalidation.
            if let Some(id) = action_id(action) {
                state.by_id.remove(&id);
            }
            Self::invalidate_collections(state);
        }
    }

    fn reduce_collections(state: &mut CrudState, action: &Action) {
        let t_params = &action.meta.params;
        let index = state.collections.iter().position(|c| &c.params == t_params);
        let entry = match index {
            Some(i) => &mut state.collections[i],
            None => {
                // Insert eagerly on intent so a selector invoked before
                // completion already reports `requesting`.
                state.collections.push(Collection::in_flight(t_params.clone()));
                let last = state.collections.len() - 1;
                &mut state.collections[last]
            },
        };

        if action.error {
            entry.requesting = false;
            entry.error = action.payload.clone();
            entry.fetch_time = action.meta.fetch_time;
        } else if let Some(Value::Array(records)) = &action.payload {
            entry.requesting = false;
            entry.requested = true;
            entry.error = None;
            entry.fetch_time = action.meta.fetch_time;
            entry.ids = records
                .iter()
                .filter_map(|record| record.get("id").and_then(id_key))
                .collect();
        } else {
            // Intent: mark in flight, clear the stale marker and last error.
            entry.requesting = true;
            entry.error = None;
            entry.fetch_time = None;
        }
    }

    fn upsert_found_records(state: &mut CrudState, action: &Action) {
        let Some(Value::Array(records)) = &action.payload else {
            return;
        };
        for record in records {
            if let Some(id) = record.get("id").and_then(id_key) {
                state.by_id.insert(
                    id,
                    RecordEntry {
                        record: Some(record.clone()),
                        requesting: false,
                        requested: true,
                        fetch_time: action.meta.fetch_time,
                        error: None,
                    },
                );
            }
        }
    }

    fn upsert_one(state: &mut CrudState, action: &Action) {
        let Some(id) = action_id(action) else {
            return;
        };
        let entry = state.by_id.entry(id).or_default();
        entry.requesting = false;
        entry.requested = true;
        entry.record = action.payload.clone();
        entry.fetch_time = action.meta.fetch_time;
        entry.error = None;
    }

    fn invalidate_collections(state: &mut CrudState) {
        for collection in &mut state.collections {
            collection.fetch_time = None;
        }
    }
}

impl SliceReducer for CrudReducer {
    fn initial(&self) -> StateSlice {
        StateSlice::Crud(CrudState::default())
    }

    fn reduce(&self, slice: &mut StateSlice, action: &Action) {
        if let StateSlice::Crud(state) = slice {
            self.reduce_state(state, action);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::action::{Completion, TerminalTypes};
    use serde_json::json;

    fn reducer() -> CrudReducer {
        CrudReducer::new(CrudTypes::for_model("user"))
    }

    fn crud(slice: &StateSlice) -> &CrudState {
        match slice {
            StateSlice::Crud(state) => state,
            _ => panic!("expected crud slice"),
        }
    }

    fn intent(kind: &str, params: Value) -> Action {
        let (completion, _rx) = Completion::channel();
        Action::intent(
            kind,
            params,
            TerminalTypes {
                success: format!("{kind}_SUCCESS"),
                error: format!("{kind}_ERROR"),
            },
            completion,
        )
    }

    fn success(kind: &str, payload: Value, params: Value) -> Action {
        Action::success(kind, payload, params, Utc::now())
    }

    #[test]
    fn find_intent_inserts_collection_eagerly() {
        let r = reducer();
        let types = CrudTypes::for_model("user");
        let mut slice = r.initial();
        let query = json!({"where": {"email": "a@x.com"}});

        r.reduce(&mut slice, &intent(&types.find.intent, query.clone()));

        let collection = crud(&slice).collection(&query).unwrap();
        assert!(collection.requesting);
        assert!(!collection.requested);
        assert!(collection.ids.is_empty());
    }

    #[test]
    fn find_success_replaces_ids_and_upserts_records() {
        let r = reducer();
        let types = CrudTypes::for_model("user");
        let mut slice = r.initial();
        let query = json!({"order": "created DESC"});
        let records = json!([
            {"id": "u1", "email": "a@x.com"},
            {"id": "u2", "email": "b@x.com"},
        ]);

        r.reduce(&mut slice, &intent(&types.find.intent, query.clone()));
        r.reduce(&mut slice, &success(&types.find.success, records, query.clone()));

        let state = crud(&slice);
        let collection = state.collection(&query).unwrap();
        assert_eq!(collection.ids, vec!["u1", "u2"]);
        assert!(collection.requested);
        assert!(!collection.requesting);
        assert!(collection.fetch_time.is_some());
        assert_eq!(
            state.by_id["u2"].record,
            Some(json!({"id": "u2", "email": "b@x.com"}))
        );
        assert!(state.by_id["u1"].requested);
    }

    #[test]
    fn create_success_upserts_and_marks_collections_stale() {
        let r = reducer();
        let types = CrudTypes::for_model("user");
        let mut slice = r.initial();
        let query = json!({"limit": 10});

        r.reduce(&mut slice, &intent(&types.find.intent, query.clone()));
        r.reduce(&mut slice, &success(&types.find.success, json!([{"id": "u1"}]), query.clone()));
        assert!(crud(&slice).collection(&query).unwrap().fetch_time.is_some());

        r.reduce(
            &mut slice,
            &success(&types.create.success, json!({"id": "u5", "email": "e@x.com"}), json!({"email": "e@x.com"})),
        );

        let state = crud(&slice);
        assert_eq!(state.by_id["u5"].record, Some(json!({"id": "u5", "email": "e@x.com"})));
        let collection = state.collection(&query).unwrap();
        assert_eq!(collection.fetch_time, None, "stale sentinel set");
        assert_eq!(collection.ids, vec!["u1"], "ids untouched");
        assert_eq!(collection.params, query, "params untouched");
    }

    #[test]
    fn delete_success_removes_entity_and_invalidates_in_one_transition() {
        let r = reducer();
        let types = CrudTypes::for_model("user");
        let mut slice = r.initial();
        let query = json!({});

        r.reduce(&mut slice, &intent(&types.find.intent, query.clone()));
        r.reduce(
            &mut slice,
            &success(&types.find.success, json!([{"id": "u1"}, {"id": "u2"}]), query.clone()),
        );

        r.reduce(
            &mut slice,
            &success(&types.delete_by_id.success, json!({"id": "u2"}), json!({"id": "u2"})),
        );

        let state = crud(&slice);
        assert!(!state.by_id.contains_key("u2"));
        assert!(state.by_id.contains_key("u1"));
        assert_eq!(state.collection(&query).unwrap().fetch_time, None);
    }

    #[test]
    fn find_by_id_intent_marks_only_that_entry() {
        let r = reducer();
        let types = CrudTypes::for_model("user");
        let mut slice = r.initial();

        r.reduce(
            &mut slice,
            &success(&types.find_by_id.success, json!({"id": "u1"}), json!({"id": "u1"})),
        );
        r.reduce(&mut slice, &intent(&types.find_by_id.intent, json!({"id": "u2"})));

        let state = crud(&slice);
        assert!(state.by_id["u2"].requesting);
        assert!(state.by_id["u2"].record.is_none());
        assert!(!state.by_id["u1"].requesting, "unrelated entry untouched");
    }

    #[test]
    fn update_by_id_success_replaces_snapshot() {
        let r = reducer();
        let types = CrudTypes::for_model("user");
        let mut slice = r.initial();

        r.reduce(&mut slice, &intent(&types.update_by_id.intent, json!({"id": "u1", "email": "new@x.com"})));
        assert!(crud(&slice).by_id["u1"].requesting);

        r.reduce(
            &mut slice,
            &success(
                &types.update_by_id.success,
                json!({"id": "u1", "email": "new@x.com"}),
                json!({"id": "u1", "email": "new@x.com"}),
            ),
        );

        let entry = &crud(&slice).by_id["u1"];
        assert!(!entry.requesting);
        assert!(entry.requested);
        assert_eq!(entry.record, Some(json!({"id": "u1", "email": "new@x.com"})));
    }

    #[test]
    fn find_by_id_error_records_reason_without_touching_record() {
        let r = reducer();
        let types = CrudTypes::for_model("user");
        let mut slice = r.initial();

        r.reduce(
            &mut slice,
            &success(&types.find_by_id.success, json!({"id": "u1", "v": 1}), json!({"id": "u1"})),
        );
        r.reduce(&mut slice, &intent(&types.find_by_id.intent, json!({"id": "u1"})));
        r.reduce(
            &mut slice,
            &Action::failure(
                types.find_by_id.error.clone(),
                json!({"error": "not found"}),
                json!({"id": "u1"}),
                Utc::now(),
            ),
        );

        let entry = &crud(&slice).by_id["u1"];
        assert!(!entry.requesting);
        assert_eq!(entry.error, Some(json!({"error": "not found"})));
        assert_eq!(entry.record, Some(json!({"id": "u1", "v": 1})));
    }

    #[test]
    fn update_by_id_error_clears_requesting_and_keeps_the_snapshot() {
        let r = reducer();
        let types = CrudTypes::for_model("user");
        let mut slice = r.initial();

        r.reduce(
            &mut slice,
            &success(&types.find_by_id.success, json!({"id": "u1", "v": 1}), json!({"id": "u1"})),
        );
        r.reduce(
            &mut slice,
            &intent(&types.update_by_id.intent, json!({"id": "u1", "v": 2})),
        );
        r.reduce(
            &mut slice,
            &Action::failure(
                types.update_by_id.error.clone(),
                json!({"error": "conflict"}),
                json!({"id": "u1", "v": 2}),
                Utc::now(),
            ),
        );

        let entry = &crud(&slice).by_id["u1"];
        assert!(!entry.requesting, "failed update must not stay in flight");
        assert_eq!(entry.error, Some(json!({"error": "conflict"})));
        assert_eq!(entry.record, Some(json!({"id": "u1", "v": 1})));
    }

    #[test]
    fn find_error_keeps_prior_ids() {
        let r = reducer();
        let types = CrudTypes::for_model("user");
        let mut slice = r.initial();
        let query = json!({"q": 1});

        r.reduce(&mut slice, &intent(&types.find.intent, query.clone()));
        r.reduce(&mut slice, &success(&types.find.success, json!([{"id": "u1"}]), query.clone()));
        r.reduce(&mut slice, &intent(&types.find.intent, query.clone()));
        r.reduce(
            &mut slice,
            &Action::failure(types.find.error.clone(), json!("down"), query.clone(), Utc::now()),
        );

        let collection = crud(&slice).collection(&query).unwrap();
        assert_eq!(collection.ids, vec!["u1"]);
        assert_eq!(collection.error, Some(json!("down")));
        assert!(!collection.requesting);
    }

    #[test]
    fn numeric_ids_are_keyed_as_strings() {
        let r = reducer();
        let types = CrudTypes::for_model("user");
        let mut slice = r.initial();

        r.reduce(
            &mut slice,
            &success(&types.find_by_id.success, json!({"id": 7}), json!({"id": 7})),
        );
        assert!(crud(&slice).by_id.contains_key("7"));
    }
}
