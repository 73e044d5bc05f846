//! End-to-end flows of a model's declared methods through a live store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use saga_models_core::environment::Clock;
use saga_models_core::error::{CallError, MethodError};
use saga_models_core::model::{ModelConfig, Models};
use saga_models_core::store::StoreHandle;
use saga_models_runtime::{Store, bind};
use saga_models_testing::{init_tracing, test_clock};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

fn compose(config: ModelConfig) -> (Models, Arc<Store>) {
    let models = Models::compose(vec![config], &[]);
    let store = Store::new(models.reducer());
    let _watchers = bind(&models, &store);
    (models, store)
}

#[tokio::test]
async fn call_resolves_with_the_method_result_and_caches_it() {
    init_tracing();
    let clock = test_clock();
    let config = ModelConfig::new("session")
        .clock(Arc::new(clock.clone()))
        .method("login", |params| async move {
            Ok(json!({"token": "t-1", "email": params["email"]}))
        });
    let (models, _store) = compose(config);
    let session = models.model("session").unwrap();

    let params = json!({"email": "a@x.com"});
    let result = session.call("login", params.clone()).await.unwrap();
    assert_eq!(result, json!({"token": "t-1", "email": "a@x.com"}));

    let view = session.select("login", &params).unwrap();
    assert_eq!(view["result"], result);
    assert_eq!(view["requesting"], json!(false));
    assert_eq!(view["requested"], json!(true));
    assert_eq!(view["error"], Value::Null);
}

#[tokio::test]
async fn rejection_settles_the_call_and_keeps_the_prior_result() {
    init_tracing();
    let attempts = Arc::new(AtomicUsize::new(0));
    let config = ModelConfig::new("session").method("login", {
        let attempts = Arc::clone(&attempts);
        move |_params| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Ok(json!({"token": "t-1"}))
                } else {
                    Err(MethodError::rejected(json!({"code": 401})))
                }
            }
        }
    });
    let (models, _store) = compose(config);
    let session = models.model("session").unwrap();
    let params = json!({"email": "a@x.com"});

    session.call("login", params.clone()).await.unwrap();
    let rejected = session.call("login", params.clone()).await;
    match rejected {
        Err(CallError::Rejected(reason)) => assert_eq!(reason, json!({"code": 401})),
        other => panic!("unexpected outcome: {other:?}"),
    }

    // The stale-while-revalidate cache keeps the last good result next to
    // the new error.
    let view = session.select("login", &params).unwrap();
    assert_eq!(view["result"], json!({"token": "t-1"}));
    assert_eq!(view["error"], json!({"code": 401}));
    assert_eq!(view["requesting"], json!(false));
}

#[tokio::test]
async fn concurrent_calls_with_distinct_params_settle_independently() {
    init_tracing();
    let release_slow = Arc::new(Notify::new());
    let config = ModelConfig::new("user").method("find", {
        let release_slow = Arc::clone(&release_slow);
        move |params| {
            let release_slow = Arc::clone(&release_slow);
            async move {
                if params["speed"] == json!("slow") {
                    release_slow.notified().await;
                }
                Ok(json!([{"id": "for", "query": params}]))
            }
        }
    });
    let (models, _store) = compose(config);
    let user = models.model("user").unwrap();

    let slow_params = json!({"speed": "slow"});
    let fast_params = json!({"speed": "fast"});
    let slow = tokio::spawn({
        let user = Arc::clone(user);
        let slow_params = slow_params.clone();
        async move { user.call("find", slow_params).await }
    });

    // The fast call completes while the slow one is parked.
    let fast = user.call("find", fast_params.clone()).await.unwrap();
    assert_eq!(fast[0]["query"], fast_params);

    let slow_view = user.select("find", &slow_params).unwrap();
    assert_eq!(slow_view["requesting"], json!(true));
    assert_eq!(slow_view["requested"], json!(false));

    release_slow.notify_one();
    let slow = slow.await.unwrap().unwrap();
    assert_eq!(slow[0]["query"], slow_params);

    // Each entry settled against its own params; neither clobbered the other.
    let fast_view = user.select("find", &fast_params).unwrap();
    let slow_view = user.select("find", &slow_params).unwrap();
    assert_eq!(fast_view["result"][0]["query"], fast_params);
    assert_eq!(slow_view["result"][0]["query"], slow_params);
    assert_eq!(slow_view["requesting"], json!(false));
}

#[tokio::test]
async fn marker_methods_dispatch_synchronously_and_cache_the_payload() {
    init_tracing();
    let config = ModelConfig::new("session").marker("set_locale");
    let (models, store) = compose(config);
    let session = models.model("session").unwrap();

    let result = session.call("set_locale", json!({"locale": "fr"})).await.unwrap();
    assert_eq!(result, Value::Null);

    // No saga involved; the payload is readable immediately.
    let view = session.select("set_locale", &json!({"locale": "fr"})).unwrap();
    assert_eq!(view, json!({"locale": "fr"}));
    store.with_state(|state| assert!(state.contains_key("session")));
}

#[tokio::test]
async fn faulting_method_closes_the_call_without_a_terminal_action() {
    init_tracing();
    let config = ModelConfig::new("session")
        .method("login", |_params| async { Err(MethodError::fault("backend handle dropped")) });
    let (models, _store) = compose(config);
    let session = models.model("session").unwrap();

    let params = json!({"email": "a@x.com"});
    let outcome = session.call("login", params.clone()).await;
    assert!(matches!(outcome, Err(CallError::TaskTerminated)));

    // The cache still shows the intent in flight: faults are not domain data.
    let view = session.select("login", &params).unwrap();
    assert_eq!(view["requesting"], json!(true));
    assert_eq!(view["error"], Value::Null);
}

#[tokio::test]
async fn terminal_actions_carry_the_injected_clock_time() {
    init_tracing();
    let clock = test_clock();
    let stamped = clock.now();
    let config = ModelConfig::new("session")
        .clock(Arc::new(clock))
        .method("login", |_params| async { Ok(json!({"token": "t"})) });
    let (models, store) = compose(config);
    let session = models.model("session").unwrap();

    let mut actions = store.subscribe();
    session.call("login", json!({})).await.unwrap();

    loop {
        let action = actions.recv().await.unwrap();
        if action.kind == "@@saga-models/SESSION/LOGIN_SUCCESS" {
            assert_eq!(action.meta.fetch_time, Some(stamped));
            break;
        }
    }
}
