mod common;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use std::sync::Arc;

use common::{api_url, Harness, UNREACHABLE};
use splitsync::api::{ApiError, SessionEvent};
use splitsync::offline::{Mutation, QUEUE_KEY};
use splitsync::store::{DurableStore, MemoryStore};

#[tokio::test]
async fn test_transport_failure_queues_mutation_while_monitor_online() {
  let harness = Harness::new(UNREACHABLE, true);

  let response = harness
    .client
    .put("/groups/g1", json!({"name": "Trip"}))
    .await
    .unwrap();

  assert!(response.is_queued());
  assert_eq!(harness.queue_size(), 1);
}

#[tokio::test]
async fn test_uncached_read_propagates_network_error() {
  let harness = Harness::new(UNREACHABLE, true);

  let err = harness.client.get("/groups/my").await.unwrap_err();
  assert!(err.is_network());

  harness.connectivity.set_online(false);
  let err = harness.client.get("/groups/my").await.unwrap_err();
  assert!(matches!(err, ApiError::NetworkUnavailable(_)));
}

#[tokio::test]
async fn test_unauthorized_clears_token_and_requests_login() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/api/users/me"))
    .and(header("Authorization", "Bearer stale"))
    .respond_with(ResponseTemplate::new(401))
    .expect(1)
    .mount(&server)
    .await;

  let harness = Harness::new(&api_url(&server), true);
  let session = harness.client.session();
  session.login("stale");
  session.set_route("/dashboard");
  let mut events = session.subscribe();

  let err = harness.client.get("/users/me").await.unwrap_err();

  assert!(matches!(err, ApiError::AuthExpired));
  assert_eq!(session.token(), None);
  assert_eq!(
    events.try_recv().unwrap(),
    SessionEvent::LoginRequired {
      location: "/login?redirect=%2Fdashboard".to_string()
    }
  );
}

#[tokio::test]
async fn test_network_failure_keeps_session() {
  let harness = Harness::new(UNREACHABLE, true);
  harness.client.session().login("abc");
  let mut events = harness.client.session().subscribe();

  harness.client.get("/users/me").await.unwrap_err();
  harness
    .client
    .post("/expenses/add", json!({"amount": 1}))
    .await
    .unwrap();

  assert_eq!(harness.client.session().token().as_deref(), Some("abc"));
  assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_live_http_errors_are_surfaced_not_queued() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/expenses/add"))
    .respond_with(ResponseTemplate::new(422).set_body_json(json!({"detail": "amount must be positive"})))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/api/groups/my"))
    .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
    .mount(&server)
    .await;

  let harness = Harness::new(&api_url(&server), true);

  let err = harness
    .client
    .post("/expenses/add", json!({"amount": -1}))
    .await
    .unwrap_err();
  match err {
    ApiError::PermanentClientError { status, body } => {
      assert_eq!(status, 422);
      assert_eq!(body["detail"], "amount must be positive");
    }
    other => panic!("unexpected error: {other:?}"),
  }

  let err = harness.client.get("/groups/my").await.unwrap_err();
  assert!(matches!(
    err,
    ApiError::TransientServerError {
      status: Some(500),
      ..
    }
  ));

  assert_eq!(harness.queue_size(), 0);
  assert!(harness.store.is_empty());
}

#[tokio::test]
async fn test_replay_discards_rejected_and_retains_unavailable() {
  let server = MockServer::start().await;
  Mock::given(method("DELETE"))
    .and(path("/api/expenses/gone"))
    .respond_with(ResponseTemplate::new(404))
    .expect(1)
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/api/settle"))
    .respond_with(ResponseTemplate::new(503))
    .expect(2)
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/api/expenses/add"))
    .respond_with(ResponseTemplate::new(200))
    .expect(1)
    .mount(&server)
    .await;

  let harness = Harness::new(&api_url(&server), false);
  harness.client.delete("/expenses/gone").await.unwrap();
  harness.client.post("/settle", json!({"group": "g1"})).await.unwrap();
  harness
    .client
    .post("/expenses/add", json!({"amount": 3}))
    .await
    .unwrap();

  harness.connectivity.set_online(true);

  let report = harness.client.sync().await.unwrap();
  assert_eq!(report.discarded, 1);
  assert_eq!(report.retained, 1);
  assert_eq!(report.replayed, 1);

  let pending = harness.client.offline().pending();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].request, Mutation::post("/settle", json!({"group": "g1"})));

  // Only the retained item is attempted again.
  let report = harness.client.sync().await.unwrap();
  assert_eq!(report.retained, 1);
  assert_eq!(report.replayed + report.discarded, 0);
}

#[tokio::test]
async fn test_replay_network_failure_does_not_duplicate() {
  let harness = Harness::new(UNREACHABLE, false);
  harness
    .client
    .post("/expenses/add", json!({"amount": 3}))
    .await
    .unwrap();

  harness.connectivity.set_online(true);
  let report = harness.client.sync().await.unwrap();

  assert_eq!(report.retained, 1);
  assert_eq!(harness.queue_size(), 1);
}

#[tokio::test]
async fn test_unpersisted_mutation_is_not_reported_as_queued() {
  let store = Arc::new(MemoryStore::with_quota(200));
  let harness = Harness::with_store(store, UNREACHABLE, false);

  let err = harness
    .client
    .post("/expenses/add", json!({"note": "x".repeat(300)}))
    .await
    .unwrap_err();

  assert!(matches!(err, ApiError::NetworkUnavailable(_)));
  assert_eq!(harness.queue_size(), 0);
  assert_eq!(harness.store.get(QUEUE_KEY), None);
}

#[tokio::test]
async fn test_replay_that_cannot_be_built_stays_queued() {
  let harness = Harness::new(UNREACHABLE, false);
  let mutation = Mutation::delete("/expenses/e1").with_header("X-Note", "bad\nvalue");
  harness.client.send(mutation.clone().into()).await.unwrap();

  harness.connectivity.set_online(true);
  let report = harness.client.sync().await.unwrap();

  assert_eq!(report.retained, 1);
  assert_eq!(report.discarded, 0);
  let pending = harness.client.offline().pending();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].request, mutation);
}
