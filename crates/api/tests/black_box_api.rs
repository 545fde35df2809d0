use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use mailroom_api::app::services::AppServices;
use mailroom_auth::{JwtClaims, PrincipalId, Role};
use mailroom_core::DocumentId;
use mailroom_dispatch::doubles::{
    InMemoryDocumentStore, RecordingAuditLog, ScriptedMailer, StaticSettings,
};
use mailroom_dispatch::{DispatchSettings, DocumentMeta};
use mailroom_infra::{DispatchEngine, InMemoryDispatchStore};
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    documents: Arc<InMemoryDocumentStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        let documents = Arc::new(InMemoryDocumentStore::new());
        let settings = DispatchSettings {
            enabled: true,
            account: Some("dispatch@backoffice.test".to_string()),
            target_address: Some("intake@insurer.test".to_string()),
            max_attachments: 2,
            ..DispatchSettings::default()
        };
        let engine = DispatchEngine::new(
            Arc::new(InMemoryDispatchStore::new()),
            documents.clone(),
            Arc::new(ScriptedMailer::new()),
            Arc::new(RecordingAuditLog::new()),
            Arc::new(StaticSettings(settings)),
        );

        // Same router as prod, but bound to an ephemeral port.
        let app = mailroom_api::app::build_app(
            jwt_secret.to_string(),
            Arc::new(AppServices::new(engine)),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            documents,
            handle,
        }
    }

    fn seed_document(&self, filename: &str, size: usize) -> DocumentId {
        let id = DocumentId::new();
        self.documents.insert(
            id,
            DocumentMeta {
                locator: format!("archive/{filename}"),
                filename: filename.to_string(),
                size_bytes: size as u64,
                collection: "outbox".to_string(),
            },
            vec![b'x'; size],
        );
        id
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: PrincipalId::new(),
        roles,
        iat: now.timestamp(),
        exp: (now + ChronoDuration::minutes(10)).timestamp(),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn("test-secret").await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn principal_is_derived_from_token() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let token = mint_jwt(jwt_secret, vec![Role::new("clerk")]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "clerk"));
}

#[tokio::test]
async fn role_without_dispatch_permissions_is_forbidden() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let token = mint_jwt(jwt_secret, vec![Role::new("visitor")]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/dispatch/jobs", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn dispatch_lifecycle_create_inspect_list() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let ids: Vec<String> = (0..3)
        .map(|i| srv.seed_document(&format!("claim-{i}.pdf"), 64).to_string())
        .collect();

    let clerk = mint_jwt(jwt_secret, vec![Role::new("clerk")]);
    let client = reqwest::Client::new();

    // Create: a 3-document batch job with max_attachments=2 finishes inline.
    let res = client
        .post(format!("{}/dispatch/jobs", srv.base_url))
        .bearer_auth(&clerk)
        .json(&json!({ "mode": "batch", "document_ids": ids }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    assert_eq!(created["status"], "sent");
    assert_eq!(created["total"], 3);
    assert_eq!(created["remaining"], 0);
    let job_id = created["job_id"].as_str().unwrap().to_string();

    // Detail: items are sent; the settings snapshot is redacted for clerks.
    let res = client
        .get(format!("{}/dispatch/jobs/{}", srv.base_url, job_id))
        .bearer_auth(&clerk)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let detail: serde_json::Value = res.json().await.unwrap();
    assert_eq!(detail["items"].as_array().unwrap().len(), 3);
    assert!(detail["items"]
        .as_array()
        .unwrap()
        .iter()
        .all(|i| i["status"] == "sent"));
    assert_eq!(detail["emails"].as_array().unwrap().len(), 2);
    assert!(detail.get("settings").is_none());

    // Admins see the snapshot.
    let admin = mint_jwt(jwt_secret, vec![Role::new("admin")]);
    let res = client
        .get(format!("{}/dispatch/jobs/{}", srv.base_url, job_id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let detail: serde_json::Value = res.json().await.unwrap();
    assert_eq!(
        detail["settings"]["account"].as_str().unwrap(),
        "dispatch@backoffice.test"
    );

    // List: the clerk sees their own job.
    let res = client
        .get(format!("{}/dispatch/jobs", srv.base_url))
        .bearer_auth(&clerk)
        .send()
        .await
        .unwrap();
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 1);

    // A different clerk sees nothing (and the detail 404s).
    let other = mint_jwt(jwt_secret, vec![Role::new("clerk")]);
    let res = client
        .get(format!("{}/dispatch/jobs", srv.base_url))
        .bearer_auth(&other)
        .send()
        .await
        .unwrap();
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 0);

    let res = client
        .get(format!("{}/dispatch/jobs/{}", srv.base_url, job_id))
        .bearer_auth(&other)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn idempotency_key_replays_existing_job() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let id = srv.seed_document("policy.pdf", 64).to_string();
    let clerk = mint_jwt(jwt_secret, vec![Role::new("clerk")]);
    let client = reqwest::Client::new();

    let body = json!({
        "mode": "single",
        "document_ids": [id],
        "idempotency_key": "retry-safe-1"
    });

    let first: serde_json::Value = client
        .post(format!("{}/dispatch/jobs", srv.base_url))
        .bearer_auth(&clerk)
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["idempotent"], false);

    let res = client
        .post(format!("{}/dispatch/jobs", srv.base_url))
        .bearer_auth(&clerk)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let second: serde_json::Value = res.json().await.unwrap();
    assert_eq!(second["idempotent"], true);
    assert_eq!(second["job_id"], first["job_id"]);
}

#[tokio::test]
async fn large_job_is_driven_to_completion_in_chunks() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let ids: Vec<String> = (0..15)
        .map(|i| srv.seed_document(&format!("doc-{i:02}.pdf"), 64).to_string())
        .collect();

    let clerk = mint_jwt(jwt_secret, vec![Role::new("clerk")]);
    let client = reqwest::Client::new();

    let created: serde_json::Value = client
        .post(format!("{}/dispatch/jobs", srv.base_url))
        .bearer_auth(&clerk)
        .json(&json!({ "mode": "single", "document_ids": ids }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["status"], "processing");
    assert_eq!(created["remaining"], 5);
    let job_id = created["job_id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/dispatch/jobs/{}/process", srv.base_url, job_id))
        .bearer_auth(&clerk)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let chunk: serde_json::Value = res.json().await.unwrap();
    assert_eq!(chunk["status"], "sent");
    assert_eq!(chunk["remaining"], 0);

    // Driving a finished job again is rejected.
    let res = client
        .post(format!("{}/dispatch/jobs/{}/process", srv.base_url, job_id))
        .bearer_auth(&clerk)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_requests_are_rejected_up_front() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let clerk = mint_jwt(jwt_secret, vec![Role::new("clerk")]);
    let client = reqwest::Client::new();

    // Unknown mode.
    let res = client
        .post(format!("{}/dispatch/jobs", srv.base_url))
        .bearer_auth(&clerk)
        .json(&json!({ "mode": "broadcast", "collection": "outbox" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Both source selectors at once.
    let res = client
        .post(format!("{}/dispatch/jobs", srv.base_url))
        .bearer_auth(&clerk)
        .json(&json!({ "mode": "single", "collection": "outbox", "document_ids": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Empty resolved set.
    let res = client
        .post(format!("{}/dispatch/jobs", srv.base_url))
        .bearer_auth(&clerk)
        .json(&json!({ "mode": "single", "collection": "no-such-tray" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
