mod common;

use common::{CountingTokenStore, ORIGIN, ScriptedTransport, client, profile, user};
use ledger_client::api::Credentials;
use ledger_client::{
    CacheKey, Client, ClientConfig, FileTokenStore, MemoryTokenStore, SessionEvent, SessionState,
    SignOutReason,
};
use reqwest::Method;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn record_events(client: &Client) -> Arc<Mutex<Vec<SessionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    client
        .session()
        .subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

fn authorization(transport: &ScriptedTransport, index: usize) -> Option<String> {
    transport.requests()[index]
        .header("Authorization")
        .map(str::to_string)
}

#[tokio::test]
async fn test_bearer_token_only_when_signed_in() {
    let transport = ScriptedTransport::new();
    transport.data(Method::GET, "users", json!([]));
    let store = Arc::new(MemoryTokenStore::new());
    let client = client(&transport, store);

    assert_eq!(client.initialize().await, SessionState::Anonymous);
    client.users().await.unwrap();
    assert_eq!(authorization(&transport, 0), None);

    client.session().login("t1").await.unwrap();
    client.refresh_users().await.unwrap();
    assert_eq!(authorization(&transport, 1).as_deref(), Some("Bearer t1"));
}

#[tokio::test]
async fn test_unauthorized_response_tears_down_session() {
    let transport = ScriptedTransport::new();
    transport.data(Method::GET, "groups", json!([]));
    transport.respond(
        Method::GET,
        "users/profile",
        401,
        json!({ "message": "Token expired" }),
    );
    let store = CountingTokenStore::with_token("t1");
    let client = client(&transport, store.clone());
    client.initialize().await;
    let events = record_events(&client);

    client.groups().await.unwrap();
    assert_eq!(client.cache().len(), 1);

    let err = client.profile().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(client.session().state(), SessionState::Anonymous);
    assert_eq!(store.removes(), 1);
    assert!(client.cache().is_empty());
    assert_eq!(
        *events.lock().unwrap(),
        vec![SessionEvent::SignedOut {
            reason: SignOutReason::Unauthorized
        }]
    );

    // an anonymous 401 does not sign anyone out again
    assert!(client.profile().await.unwrap_err().is_unauthorized());
    assert_eq!(store.removes(), 1);
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_simultaneous_unauthorized_responses_sign_out_once() {
    let transport = ScriptedTransport::new();
    for path in ["groups", "expenses", "users/profile"] {
        transport.respond(Method::GET, path, 401, json!({ "message": "Token expired" }));
    }
    transport.hold();
    let store = CountingTokenStore::with_token("t1");
    let client = client(&transport, store.clone());
    client.initialize().await;
    let events = record_events(&client);

    let (groups, expenses, profile, ()) = tokio::join!(
        client.groups(),
        client.expenses(),
        client.profile(),
        async {
            transport.wait_for_requests(3).await;
            transport.release(3);
        }
    );

    assert!(groups.unwrap_err().is_unauthorized());
    assert!(expenses.unwrap_err().is_unauthorized());
    assert!(profile.unwrap_err().is_unauthorized());
    assert_eq!(transport.requests().len(), 3);
    assert_eq!(client.session().state(), SessionState::Anonymous);
    assert_eq!(store.removes(), 1);
    assert_eq!(client.cache().generation(), 1);
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_logouts_run_once() {
    let transport = ScriptedTransport::new();
    transport.data(Method::GET, "users/profile", profile(3.0));
    let store = CountingTokenStore::with_token("t1");
    let client = client(&transport, store.clone());
    client.initialize().await;
    client.profile().await.unwrap();
    let events = record_events(&client);

    let results = futures::future::join_all((0..5).map(|_| client.logout())).await;

    let performed = results
        .into_iter()
        .map(Result::unwrap)
        .filter(|performed| *performed)
        .count();
    assert_eq!(performed, 1);
    assert_eq!(store.removes(), 1);
    assert_eq!(client.cache().generation(), 1);
    assert_eq!(events.lock().unwrap().len(), 1);
    assert!(client.cache().is_empty());
}

#[tokio::test]
async fn test_fetch_finishing_after_logout_is_discarded() {
    let transport = ScriptedTransport::new();
    transport.data(Method::GET, "users/profile", profile(7.0));
    transport.hold();
    let client = client(&transport, CountingTokenStore::with_token("t1"));
    client.initialize().await;

    let (late, ()) = tokio::join!(client.profile(), async {
        transport.wait_for_requests(1).await;
        client.logout().await.unwrap();
        transport.release(1);
    });

    // the caller that asked still gets its answer
    assert_eq!(late.unwrap().details.balance, 7.0);
    assert!(client.cache().is_empty());
    assert!(
        client
            .cache()
            .peek::<serde_json::Value>(&CacheKey::user_info())
            .is_none()
    );
}

#[tokio::test]
async fn test_token_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport.respond(
        Method::POST,
        "users/login",
        200,
        json!({ "status": "success", "data": user("u1", "Ana"), "token": "abc" }),
    );
    transport.data(Method::GET, "users/profile", profile(0.0));

    let first = client(&transport, Arc::new(FileTokenStore::new(dir.path())));
    assert_eq!(first.initialize().await, SessionState::Anonymous);
    let signed_in = first
        .login(&Credentials {
            email: "u1@example.com".to_string(),
            password: "hunter2".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(signed_in.name, "Ana");

    let second = client(&transport, Arc::new(FileTokenStore::new(dir.path())));
    assert_eq!(
        second.initialize().await,
        SessionState::Authenticated("abc".to_string())
    );
    second.profile().await.unwrap();
    let last = transport.requests().len() - 1;
    assert_eq!(authorization(&transport, last).as_deref(), Some("Bearer abc"));

    assert!(second.logout().await.unwrap());
    let third = Client::new(
        &ClientConfig::new(ORIGIN),
        transport.clone(),
        Arc::new(FileTokenStore::new(dir.path())),
    );
    assert_eq!(third.initialize().await, SessionState::Anonymous);
}

#[tokio::test]
async fn test_signing_in_as_someone_else_drops_cache() {
    let transport = ScriptedTransport::new();
    transport.data(Method::GET, "users/profile", profile(1.0));
    let client = client(&transport, CountingTokenStore::with_token("t1"));
    client.initialize().await;
    client.profile().await.unwrap();

    client.session().login("t1").await.unwrap();
    assert_eq!(client.cache().len(), 1);

    client.session().login("t2").await.unwrap();
    assert!(client.cache().is_empty());
    assert_eq!(client.session().token().as_deref(), Some("t2"));
}
