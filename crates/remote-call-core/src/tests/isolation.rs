//! Correlation IDs are scoped to their session.

use super::harness::{add_peer, registry_with_peer};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn same_id_on_two_sessions_does_not_interfere() {
    let (registry, alpha, _alpha_channel) = registry_with_peer();
    let (beta, _beta_channel) = add_peer(&registry);

    let (on_alpha, on_beta) = tokio::join!(
        registry.issue_call(&alpha, "call-1", "echo", json!({"from": "alpha"})),
        registry.issue_call(&beta, "call-1", "echo", json!({"from": "beta"})),
    );
    let on_alpha = on_alpha.unwrap();
    let on_beta = on_beta.unwrap();
    assert_eq!(registry.pending_count(), 2);

    assert!(registry.resolve_call(&alpha, "call-1", json!("alpha result")));

    // Beta's call is untouched by alpha's response.
    assert!(registry.is_pending(&beta, "call-1"));
    assert!(!registry.is_pending(&alpha, "call-1"));

    assert!(registry.resolve_call(&beta, "call-1", json!("beta result")));

    assert_eq!(
        on_alpha.wait(Duration::from_secs(1)).await.unwrap(),
        json!("alpha result")
    );
    assert_eq!(
        on_beta.wait(Duration::from_secs(1)).await.unwrap(),
        json!("beta result")
    );
}

#[tokio::test]
async fn concurrent_calls_across_sessions() {
    let (registry, alpha, _alpha_channel) = registry_with_peer();
    let (beta, _beta_channel) = add_peer(&registry);

    let mut tasks = Vec::new();
    for session_id in [alpha, beta] {
        for i in 0..10 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let id = format!("call-{}", i);
                let call = registry
                    .issue_call(&session_id, &id, "echo", json!({ "i": i }))
                    .await
                    .unwrap();
                registry.resolve_call(&session_id, &id, json!({ "session": session_id, "i": i }));
                call.wait(Duration::from_secs(2)).await.map(|v| (session_id, i, v))
            }));
        }
    }

    for task in tasks {
        let (session_id, i, value) = task.await.unwrap().unwrap();
        assert_eq!(value, json!({ "session": session_id, "i": i }));
    }
    assert_eq!(registry.pending_count(), 0);
}
