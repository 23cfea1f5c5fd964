//! HTTP surface over the in-memory store

use axum::{
    body::{to_bytes, Body},
    http::{header::AUTHORIZATION, Method, Request, StatusCode},
    Router,
};
use quill_core::config::Config;
use quill_core::core_access::Timestamp;
use quill_core::core_store::{AccessStore, MemoryAccessStore};
use quill_core::shutdown::ShutdownCoordinator;
use quill_core::test_utils::{seed_user, RecordingMailer, StaticIdentity};
use quill_server::state::StateParts;
use quill_server::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct Harness {
    router: Router,
    store: Arc<MemoryAccessStore>,
    identity: Arc<StaticIdentity>,
    mailer: Arc<RecordingMailer>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryAccessStore::new());
    let identity = Arc::new(StaticIdentity::new());
    let mailer = Arc::new(RecordingMailer::new());
    let state = AppState::new(
        StateParts {
            store: store.clone(),
            verifier: identity.clone(),
            issuer: identity.clone(),
            mailer: mailer.clone(),
            shutdown: Arc::new(ShutdownCoordinator::new(Duration::ZERO)),
        },
        &Config::default(),
    );
    Harness {
        router: build_router(Arc::new(state)),
        store,
        identity,
        mailer,
    }
}

impl Harness {
    async fn login(&self, email: &str) -> (quill_core::core_access::User, String) {
        let user = seed_user(self.store.as_ref(), email).await.unwrap();
        let token = format!("token-{}", user.id);
        self.identity.grant(token.clone(), user.email.clone());
        (user, format!("Bearer {}", token))
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            request = request.header(AUTHORIZATION, auth);
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

#[tokio::test]
async fn test_requires_authentication() {
    let h = harness();
    let (status, body) = h.call(Method::GET, "/documents", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = h
        .call(Method::GET, "/documents", Some("Bearer nope"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_share_and_transfer_over_http() {
    let h = harness();
    let (_owner, owner_auth) = h.login("owner@example.com").await;
    let (friend, friend_auth) = h.login("friend@example.com").await;

    let (status, doc) = h
        .call(
            Method::POST,
            "/documents",
            Some(&owner_auth),
            Some(json!({ "title": "Roadmap", "content": "<p>v1</p>" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let doc_id = doc["id"].as_str().unwrap().to_string();

    let (status, invite) = h
        .call(
            Method::POST,
            "/invites",
            Some(&owner_auth),
            Some(json!({ "documentId": doc_id, "email": "friend@example.com", "role": "editor" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(invite["sent"], true);
    assert!(invite["invite"].get("token").is_none());

    let mail = &h.mailer.sent_with_template("invite")[0];
    let link = mail.data["inviteLink"].as_str().unwrap();
    let token = link.rsplit('/').next().unwrap();

    let (status, accepted) = h
        .call(Method::POST, &format!("/invites/{}/accept", token), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["next"]["step"], "signIn");

    let (status, _) = h
        .call(
            Method::POST,
            &format!("/documents/{}/transfer/{}", doc_id, friend.id),
            Some(&friend_auth),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h
        .call(
            Method::POST,
            &format!("/documents/{}/transfer/{}", doc_id, friend.id),
            Some(&owner_auth),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, owned) = h
        .call(Method::GET, "/documents/owned", Some(&friend_auth), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(owned.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_register_exported_media() {
    let h = harness();
    let (_owner, owner_auth) = h.login("owner@example.com").await;
    let (_other, other_auth) = h.login("other@example.com").await;

    let (_, doc) = h
        .call(
            Method::POST,
            "/documents",
            Some(&owner_auth),
            Some(json!({ "title": "Roadmap" })),
        )
        .await;
    let uri = format!("/documents/{}/media", doc["id"].as_str().unwrap());
    let body = json!({
        "publicId": "exports/roadmap.pdf",
        "secureUrl": "https://cdn.example.com/exports/roadmap.pdf"
    });

    let (status, media) = h
        .call(Method::POST, &uri, Some(&owner_auth), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(media["format"], "pdf");
    assert_eq!(media["locator"]["publicId"], "exports/roadmap.pdf");

    let (status, _) = h.call(Method::POST, &uri, Some(&other_auth), Some(body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let stored = h
        .store
        .list_media_created_before(Timestamp::from_millis(u64::MAX))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_invalid_path_values_are_bad_requests() {
    let h = harness();
    let (_user, auth) = h.login("user@example.com").await;

    let (status, _) = h
        .call(Method::GET, "/documents/not-a-uuid", Some(&auth), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .call(
            Method::PATCH,
            &format!("/access/{}/role/owner", uuid_like()),
            Some(&auth),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn uuid_like() -> String {
    quill_core::core_access::AccessId::generate().to_string()
}
