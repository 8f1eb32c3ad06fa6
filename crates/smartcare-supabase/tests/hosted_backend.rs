//! Adapter behaviour against a mocked hosted backend.

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use smartcare_session::{
    IdentityClient, IdentityError, ProfileStore, SessionConfig, SessionManager, SignUpRequest,
    StoreError,
};
use smartcare_supabase::{
    connect, AccessTokenSource, AuthSession, GoTrueIdentityClient, PostgrestProfileStore,
    SupabaseConfig, SupabaseError,
};
use smartcare_types::{
    Identity, IdentityId, NewProfile, ProfileFields, SessionStatus, SignUpMetadata,
};
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANON: &str = "anon-key";

fn config(server: &MockServer) -> SupabaseConfig {
    SupabaseConfig::new(server.uri(), ANON)
}

fn token_body(user_id: &str, email: &str, access: &str) -> Value {
    json!({
        "access_token": access,
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": format!("refresh-{access}"),
        "user": { "id": user_id, "email": email, "user_metadata": {} }
    })
}

fn doctor_row(user_id: &str) -> Value {
    json!({
        "id": "p-1",
        "user_id": user_id,
        "full_name": "Jane Doe",
        "specialty": "Cardiology",
        "license_number": "L123",
        "phone": "555-0100",
        "email": "a@b.com",
        "created_at": "2024-03-01T10:00:00.000000+00:00"
    })
}

fn jane_fields() -> ProfileFields {
    ProfileFields {
        full_name: "Jane Doe".into(),
        specialty: "Cardiology".into(),
        license_number: "L123".into(),
        phone: "555-0100".into(),
    }
}

async fn mount_password_grant(server: &MockServer, user_id: &str, access: &str) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", ANON))
        .and(body_json(json!({ "email": "a@b.com", "password": "secret1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
            user_id, "a@b.com", access,
        )))
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn unconfigured_backend_is_reported() {
    let err = connect(&SupabaseConfig::default()).err().unwrap();
    assert!(matches!(err, SupabaseError::NotConfigured("url")));
    assert!(err.to_string().contains("not configured"));
}

// ---------------------------------------------------------------------------
// Identity client
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sign_in_caches_session_and_broadcasts() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "u-1", "access-1").await;

    let client = GoTrueIdentityClient::new(&config(&server)).unwrap();
    let mut changes = client.session_changes();

    let identity = client.sign_in("a@b.com", "secret1").await.unwrap();
    assert_eq!(identity, Identity::new("u-1", "a@b.com"));
    assert_eq!(client.access_token().as_deref(), Some("access-1"));
    assert_eq!(client.get_session().await.unwrap(), Some(identity.clone()));
    assert_eq!(changes.try_recv().unwrap(), Some(identity));
}

#[tokio::test]
async fn wrong_password_maps_to_invalid_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 400,
            "error_code": "invalid_credentials",
            "msg": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let client = GoTrueIdentityClient::new(&config(&server)).unwrap();
    let err = client.sign_in("a@b.com", "nope").await.unwrap_err();
    assert_eq!(err, IdentityError::InvalidCredentials);
    assert!(client.current_session().is_none());
}

#[tokio::test]
async fn provider_outage_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = GoTrueIdentityClient::new(&config(&server)).unwrap();
    let err = client.sign_in("a@b.com", "secret1").await.unwrap_err();
    assert!(matches!(err, IdentityError::Unavailable(_)));
}

#[tokio::test]
async fn sign_up_sends_full_name_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .and(body_json(json!({
            "email": "a@b.com",
            "password": "secret1",
            "data": { "full_name": "Jane Doe" }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_body("u-9", "a@b.com", "access-9")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = GoTrueIdentityClient::new(&config(&server)).unwrap();
    let metadata = SignUpMetadata {
        full_name: "Jane Doe".into(),
    };
    let identity = client.sign_up("a@b.com", "secret1", metadata).await.unwrap();
    assert_eq!(identity.id, IdentityId::new("u-9"));
    assert_eq!(client.access_token().as_deref(), Some("access-9"));
}

#[tokio::test]
async fn sign_up_pending_confirmation_has_no_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u-9",
            "email": "a@b.com",
            "confirmation_sent_at": "2024-03-01T10:00:00Z"
        })))
        .mount(&server)
        .await;

    let client = GoTrueIdentityClient::new(&config(&server)).unwrap();
    let metadata = SignUpMetadata {
        full_name: "Jane Doe".into(),
    };
    let identity = client.sign_up("a@b.com", "secret1", metadata).await.unwrap();
    assert_eq!(identity, Identity::new("u-9", "a@b.com"));
    assert!(client.current_session().is_none());
}

#[tokio::test]
async fn duplicate_sign_up_is_already_registered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "code": 422,
            "error_code": "user_already_exists",
            "msg": "User already registered"
        })))
        .mount(&server)
        .await;

    let client = GoTrueIdentityClient::new(&config(&server)).unwrap();
    let metadata = SignUpMetadata {
        full_name: "Jane Doe".into(),
    };
    let err = client.sign_up("a@b.com", "secret1", metadata).await.unwrap_err();
    assert_eq!(err, IdentityError::AlreadyRegistered("a@b.com".into()));
}

#[tokio::test]
async fn sign_out_revokes_with_user_token() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "u-1", "access-1").await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = GoTrueIdentityClient::new(&config(&server)).unwrap();
    client.sign_in("a@b.com", "secret1").await.unwrap();
    let mut changes = client.session_changes();

    client.sign_out().await.unwrap();
    assert!(client.current_session().is_none());
    assert_eq!(client.get_session().await.unwrap(), None);
    assert_eq!(changes.try_recv().unwrap(), None);

    // Nothing left to revoke; no second request.
    client.sign_out().await.unwrap();
}

#[tokio::test]
async fn sign_out_failure_still_drops_local_session() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "u-1", "access-1").await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = GoTrueIdentityClient::new(&config(&server)).unwrap();
    client.sign_in("a@b.com", "secret1").await.unwrap();

    let err = client.sign_out().await.unwrap_err();
    assert!(matches!(err, IdentityError::Unavailable(_)));
    assert!(client.current_session().is_none());
}

#[tokio::test]
async fn expired_session_is_refreshed_and_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({ "refresh_token": "stale-refresh" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_body("u-1", "a@b.com", "access-2")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("session.json");
    let stale = AuthSession {
        access_token: "access-1".into(),
        refresh_token: "stale-refresh".into(),
        expires_at: Utc::now() - Duration::minutes(5),
        user: Identity::new("u-1", "a@b.com"),
    };
    std::fs::write(&file, serde_json::to_vec(&stale).unwrap()).unwrap();

    let mut cfg = config(&server);
    cfg.session_file = Some(file.clone());
    let client = GoTrueIdentityClient::new(&cfg).unwrap();

    let identity = client.get_session().await.unwrap();
    assert_eq!(identity, Some(Identity::new("u-1", "a@b.com")));
    assert_eq!(client.access_token().as_deref(), Some("access-2"));

    let persisted: AuthSession =
        serde_json::from_slice(&std::fs::read(&file).unwrap()).unwrap();
    assert_eq!(persisted.access_token, "access-2");
}

#[tokio::test]
async fn rejected_refresh_drops_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid Refresh Token: Already Used"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("session.json");
    let stale = AuthSession {
        access_token: "access-1".into(),
        refresh_token: "used".into(),
        expires_at: Utc::now() - Duration::minutes(5),
        user: Identity::new("u-1", "a@b.com"),
    };
    std::fs::write(&file, serde_json::to_vec(&stale).unwrap()).unwrap();

    let mut cfg = config(&server);
    cfg.session_file = Some(file.clone());
    let client = GoTrueIdentityClient::new(&cfg).unwrap();
    let mut changes = client.session_changes();

    assert_eq!(client.get_session().await.unwrap(), None);
    assert!(!file.exists());
    assert_eq!(changes.try_recv().unwrap(), None);
}

// ---------------------------------------------------------------------------
// Profile store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lookup_filters_by_owner_with_user_token() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "u-1", "access-1").await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("user_id", "eq.u-1"))
        .and(query_param("select", "*"))
        .and(query_param("limit", "1"))
        .and(header("apikey", ANON))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([doctor_row("u-1")])))
        .expect(1)
        .mount(&server)
        .await;

    let (identity, profiles) = connect(&config(&server)).unwrap();
    identity.sign_in("a@b.com", "secret1").await.unwrap();

    let profile = profiles
        .find_profile_by_identity(&IdentityId::new("u-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.identity_id, IdentityId::new("u-1"));
    assert_eq!(profile.full_name, "Jane Doe");
    assert_eq!(profile.license_number, "L123");
}

#[tokio::test]
async fn lookup_without_row_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(header("authorization", format!("Bearer {ANON}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let profiles = PostgrestProfileStore::new(&config(&server)).unwrap();
    let found = profiles
        .find_profile_by_identity(&IdentityId::new("u-1"))
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn insert_asks_for_representation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/doctors"))
        .and(header("prefer", "return=representation"))
        .and(body_partial_json(json!({
            "user_id": "u-1",
            "full_name": "Jane Doe",
            "specialty": "Cardiology",
            "license_number": "L123",
            "phone": "555-0100",
            "email": "a@b.com"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([doctor_row("u-1")])))
        .expect(1)
        .mount(&server)
        .await;

    let profiles = PostgrestProfileStore::new(&config(&server)).unwrap();
    let record = NewProfile::new(IdentityId::new("u-1"), "a@b.com", jane_fields());
    let profile = profiles.insert_profile(record).await.unwrap();
    assert_eq!(profile.identity_id, IdentityId::new("u-1"));
}

#[tokio::test]
async fn duplicate_insert_is_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "details": "Key (user_id)=(u-1) already exists.",
            "hint": null,
            "message": "duplicate key value violates unique constraint \"doctors_user_id_key\""
        })))
        .mount(&server)
        .await;

    let profiles = PostgrestProfileStore::new(&config(&server)).unwrap();
    let record = NewProfile::new(IdentityId::new("u-1"), "a@b.com", jane_fields());
    let err = profiles.insert_profile(record).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn custom_profile_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/clinicians"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.profile_table = "clinicians".into();
    let profiles = PostgrestProfileStore::new(&cfg).unwrap();
    profiles
        .find_profile_by_identity(&IdentityId::new("u-1"))
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Session manager over the adapters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manager_sign_up_over_hosted_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_body("u-1", "a@b.com", "access-1")),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/doctors"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([doctor_row("u-1")])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([doctor_row("u-1")])))
        .mount(&server)
        .await;

    let (identity, profiles) = connect(&config(&server)).unwrap();
    let manager = SessionManager::start(identity, profiles, SessionConfig::default()).await;
    assert_eq!(manager.status(), SessionStatus::Unauthenticated);

    let request = SignUpRequest {
        email: "a@b.com".into(),
        password: "secret1".into(),
        confirm_password: "secret1".into(),
        profile: jane_fields(),
    };
    let profile = manager.sign_up(request).await.unwrap();
    assert_eq!(profile.identity_id, IdentityId::new("u-1"));
    assert_eq!(manager.status(), SessionStatus::Authenticated);

    manager.shutdown().await;
}
