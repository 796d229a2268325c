//! Active hunter against a mock API server.

use std::sync::Arc;
use std::time::Duration;

use kubehunt_events::{Category, EventBus, EventKind, EventPayload};
use kubehunt_hunters::api::CLUSTER_ROLES_PATH;
use kubehunt_hunters::{
    ActiveAuthorization, ApiClient, ApiServerActiveHunter, ClientConfig, DEFAULT_NAMESPACE_PREFIX,
    HuntError, register_passive_hunters,
};
use kubehunt_test::{
    MockApiServer, RecordingSubscriber, created_body, deleted_body, finished_event, seed_event,
    wait_for_kind,
};
use serde_json::json;

const SETTLE: Duration = Duration::from_secs(10);
const DELETION_TIMESTAMP: &str = "2019-02-26T11:40:58Z";

fn client() -> ApiClient {
    ApiClient::new(&ClientConfig::default().with_timeout(Duration::from_secs(5))).unwrap()
}

fn recording_bus() -> (EventBus, RecordingSubscriber) {
    let recorder = RecordingSubscriber::new("recorder");
    let mut builder = EventBus::builder();
    recorder.subscribe_to(&mut builder, EventKind::DERIVED);
    (builder.build().unwrap(), recorder)
}

fn hunter(
    server: &MockApiServer,
    credential: Option<&str>,
    namespaces: &[&str],
) -> ApiServerActiveHunter {
    let finished = Arc::new(finished_event(server.target(), credential, namespaces));
    ApiServerActiveHunter::new(
        finished,
        client(),
        &ActiveAuthorization::grant("integration test"),
        DEFAULT_NAMESPACE_PREFIX,
    )
    .unwrap()
}

async fn mount_namespace_lifecycle(server: &MockApiServer) {
    server
        .mock_json("POST", "/api/v1/namespaces", 200, created_body("abcde"))
        .await;
    server
        .mock_json(
            "DELETE",
            "/api/v1/namespaces/abcde",
            200,
            deleted_body("abcde", DELETION_TIMESTAMP),
        )
        .await;
}

#[tokio::test]
async fn test_active_hunt_reports_mutations() {
    let server = MockApiServer::start().await;
    mount_namespace_lifecycle(&server).await;
    server.mock_json("POST", CLUSTER_ROLES_PATH, 200, json!({})).await;
    server
        .mock_json(
            "POST",
            "/api/v1/namespaces/hello-namespace/pods",
            200,
            json!({}),
        )
        .await;
    server
        .mock_json(
            "POST",
            "/apis/rbac.authorization.k8s.io/v1/namespaces/hello-namespace/roles",
            200,
            json!({}),
        )
        .await;
    let (bus, recorder) = recording_bus();

    hunter(&server, None, &["hello-namespace"])
        .execute(&bus)
        .await
        .unwrap();
    assert!(bus.wait_idle(SETTLE).await);

    let created = recorder.of_kind(EventKind::NamespaceCreated);
    assert_eq!(created.len(), 1);
    assert!(created[0].evidence().contains("abcde"));

    let deleted = recorder.of_kind(EventKind::NamespaceDeleted);
    assert_eq!(deleted.len(), 1);
    match &deleted[0].payload {
        EventPayload::NamespaceDeleted {
            name,
            deletion_timestamp,
        } => {
            assert_eq!(name, "abcde");
            assert!(deletion_timestamp.starts_with("2019-02-26"));
        },
        other => panic!("unexpected payload {other:?}"),
    }

    assert_eq!(recorder.count_of(EventKind::ClusterRoleCreated), 1);
    assert_eq!(recorder.count_of(EventKind::RoleCreated), 1);

    let pods = recorder.of_kind(EventKind::PodCreated);
    assert_eq!(pods.len(), 2);
    assert_eq!(
        pods.iter()
            .filter(|e| e.classification() == Some(Category::PrivilegeEscalation))
            .count(),
        1
    );

    for event in recorder.events() {
        assert!(event.classification().is_some());
        assert!(event.name().contains("anonymous"));
    }
    assert_eq!(recorder.count(), 6);
}

#[tokio::test]
async fn test_namespace_is_deleted_when_every_probe_fails() {
    let server = MockApiServer::start().await;
    mount_namespace_lifecycle(&server).await;
    let (bus, recorder) = recording_bus();

    hunter(&server, None, &["hello-namespace"])
        .execute(&bus)
        .await
        .unwrap();
    assert!(bus.wait_idle(SETTLE).await);

    assert_eq!(
        recorder.kinds(),
        vec![EventKind::NamespaceCreated, EventKind::NamespaceDeleted]
    );
    assert_eq!(
        server
            .requests_to("DELETE", "/api/v1/namespaces/abcde")
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn test_accepted_namespace_with_unreadable_body_is_still_deleted() {
    let server = MockApiServer::start().await;
    server
        .mock_text("POST", "/api/v1/namespaces", 201, "created")
        .await;
    server
        .mock_json_matching("DELETE", r"^/api/v1/namespaces/[^/]+$", 200, json!({}))
        .await;
    let (bus, recorder) = recording_bus();

    hunter(&server, None, &[]).execute(&bus).await.unwrap();
    assert!(wait_for_kind(&recorder, EventKind::NamespaceDeleted, 1, SETTLE).await);
    assert!(bus.wait_idle(SETTLE).await);

    assert_eq!(
        recorder.kinds(),
        vec![EventKind::NamespaceCreated, EventKind::NamespaceDeleted]
    );
    let EventPayload::NamespaceCreated { name } = &recorder.events()[0].payload else {
        panic!("unexpected payload");
    };
    assert!(name.starts_with(DEFAULT_NAMESPACE_PREFIX));

    let deletes: Vec<String> = server
        .requests()
        .await
        .iter()
        .filter(|r| r.method.as_str() == "DELETE")
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(deletes, vec![format!("/api/v1/namespaces/{name}")]);
}

#[tokio::test]
async fn test_accepted_cluster_role_with_unreadable_body_is_still_deleted() {
    let server = MockApiServer::start().await;
    mount_namespace_lifecycle(&server).await;
    server
        .mock_text("POST", CLUSTER_ROLES_PATH, 201, "<html>created</html>")
        .await;
    server
        .mock_json_matching(
            "DELETE",
            r"^/apis/rbac.authorization.k8s.io/v1/clusterroles/[^/]+$",
            200,
            json!({}),
        )
        .await;
    let (bus, recorder) = recording_bus();

    hunter(&server, None, &[]).execute(&bus).await.unwrap();
    assert!(bus.wait_idle(SETTLE).await);

    assert_eq!(recorder.count_of(EventKind::ClusterRoleCreated), 1);
    assert_eq!(recorder.count_of(EventKind::ClusterRoleDeleted), 1);
    assert_eq!(recorder.count_of(EventKind::NamespaceDeleted), 1);
}

#[tokio::test]
async fn test_missing_deletion_timestamp_falls_back_to_now() {
    let server = MockApiServer::start().await;
    server
        .mock_json("POST", "/api/v1/namespaces", 200, created_body("abcde"))
        .await;
    server
        .mock_json("DELETE", "/api/v1/namespaces/abcde", 200, json!({}))
        .await;
    let (bus, recorder) = recording_bus();

    hunter(&server, None, &[]).execute(&bus).await.unwrap();
    assert!(bus.wait_idle(SETTLE).await);

    let deleted = recorder.of_kind(EventKind::NamespaceDeleted);
    assert_eq!(deleted.len(), 1);
    let EventPayload::NamespaceDeleted {
        deletion_timestamp, ..
    } = &deleted[0].payload
    else {
        panic!("unexpected payload");
    };
    assert!(chrono::DateTime::parse_from_rfc3339(deletion_timestamp).is_ok());
}

#[tokio::test]
async fn test_failed_cleanup_is_reported() {
    let server = MockApiServer::start().await;
    server
        .mock_json("POST", "/api/v1/namespaces", 200, created_body("abcde"))
        .await;
    server
        .mock_status("DELETE", "/api/v1/namespaces/abcde", 500)
        .await;
    let (bus, recorder) = recording_bus();

    let result = hunter(&server, None, &[]).execute(&bus).await;
    assert!(matches!(
        result,
        Err(HuntError::Cleanup { ref namespace, .. }) if namespace == "abcde"
    ));
    assert!(bus.wait_idle(SETTLE).await);
    assert_eq!(recorder.kinds(), vec![EventKind::NamespaceCreated]);
}

#[tokio::test]
async fn test_nothing_succeeds_returns_error() {
    let server = MockApiServer::start().await;
    server
        .mock_status("POST", "/api/v1/namespaces", 403)
        .await;
    let (bus, recorder) = recording_bus();

    let result = hunter(&server, None, &["hello-namespace"])
        .execute(&bus)
        .await;
    assert!(matches!(result, Err(HuntError::Status { status: 403, .. })));
    assert!(bus.wait_idle(SETTLE).await);
    assert_eq!(recorder.count(), 0);
    assert!(server.requests_to("DELETE", "/api/v1/namespaces/abcde").await.is_empty());
}

#[tokio::test]
async fn test_probes_continue_without_created_namespace() {
    let server = MockApiServer::start().await;
    server
        .mock_status("POST", "/api/v1/namespaces", 403)
        .await;
    server
        .mock_json(
            "POST",
            "/apis/rbac.authorization.k8s.io/v1/namespaces/hello-namespace/roles",
            201,
            json!({}),
        )
        .await;
    let (bus, recorder) = recording_bus();

    hunter(&server, None, &["hello-namespace"])
        .execute(&bus)
        .await
        .unwrap();
    assert!(bus.wait_idle(SETTLE).await);
    assert_eq!(recorder.kinds(), vec![EventKind::RoleCreated]);
}

#[tokio::test]
async fn test_active_hunt_uses_aggregate_credential() {
    let server = MockApiServer::start().await;
    mount_namespace_lifecycle(&server).await;
    let (bus, recorder) = recording_bus();

    hunter(&server, Some("so-secret"), &[])
        .execute(&bus)
        .await
        .unwrap();
    assert!(bus.wait_idle(SETTLE).await);

    assert_eq!(recorder.count(), 2);
    for event in recorder.events() {
        assert_eq!(event.credential(), Some("so-secret"));
        assert!(event.name().contains("token"));
    }
    let headers = server.authorization_values().await;
    assert!(!headers.is_empty());
    assert!(headers.iter().all(|h| h == "Bearer so-secret"));
}

#[tokio::test]
async fn test_constructed_hunter_does_nothing_until_executed() {
    let server = MockApiServer::start().await;
    mount_namespace_lifecycle(&server).await;
    let (bus, recorder) = recording_bus();

    let _hunter = hunter(&server, Some("so-secret"), &["hello-namespace"]);
    assert!(bus.wait_idle(SETTLE).await);

    assert_eq!(recorder.count(), 0);
    assert!(server.requests().await.is_empty());
}

#[tokio::test]
async fn test_passive_wiring_never_mutates() {
    let server = MockApiServer::start().await;
    server.mount_passive_cluster(&["my-role"]).await;
    mount_namespace_lifecycle(&server).await;

    let recorder = RecordingSubscriber::new("recorder");
    let mut builder = EventBus::builder();
    register_passive_hunters(&mut builder, &client());
    recorder.subscribe_to(&mut builder, EventKind::DERIVED);
    let bus = builder.build().unwrap();

    bus.publish(seed_event(server.target(), Some("so-secret")));
    assert!(bus.wait_idle(SETTLE).await);

    assert_eq!(recorder.count_of(EventKind::PassiveHuntFinished), 2);
    assert!(
        recorder
            .events()
            .iter()
            .all(|e| !e.kind().is_mutation())
    );
    assert!(
        server
            .requests()
            .await
            .iter()
            .all(|r| r.method.as_str() == "GET")
    );
}
