mod common;

use std::sync::Arc;

use bookshelf_client::api::{ApiError, Transport};
use bookshelf_client::auth::{AuthEvent, AuthService, CredentialStore, MemoryBackend, Session};
use bookshelf_client::{GuardDecision, RouteGuard};
use common::{ada, service_with_session, RefreshMode, ScriptedBackend, GOOD_PASSWORD};

#[tokio::test]
async fn test_login_stores_session_and_announces_user() {
    let backend = Arc::new(ScriptedBackend::new("unused", "unused"));
    let service = service_with_session(&backend, None, None);
    let mut events = service.subscribe();

    let user = service
        .login("  ada@example.com ", GOOD_PASSWORD)
        .await
        .expect("login succeeds");
    assert_eq!(user, ada());

    let store = service.store();
    assert_eq!(store.access_token().as_deref(), Some("access-login"));
    assert_eq!(store.refresh_token().as_deref(), Some("refresh-login"));
    assert_eq!(store.user(), Some(ada()));
    assert_eq!(events.recv().await.expect("event"), AuthEvent::SignedIn(ada()));

    // Credentials go out without a bearer token and with a trimmed email
    let sent = backend.requests_to("/auth/login");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].bearer(), None);
    let body = sent[0].body.as_ref().expect("login body");
    assert_eq!(body["email"], "ada@example.com");
}

#[tokio::test]
async fn test_bad_credentials_surface_backend_message() {
    let backend = Arc::new(ScriptedBackend::new("unused", "unused"));
    let service = service_with_session(&backend, None, None);

    let err = service
        .login("ada@example.com", "wrong")
        .await
        .expect_err("login fails");
    assert_eq!(
        err,
        ApiError::AuthenticationFailed("Invalid email or password".to_string())
    );
    assert_eq!(err.to_string(), "Invalid email or password");
    assert_eq!(backend.refresh_calls(), 0);
    assert_eq!(service.store().snapshot(), Session::default());
}

#[tokio::test]
async fn test_login_validates_before_sending() {
    let backend = Arc::new(ScriptedBackend::new("unused", "unused"));
    let service = service_with_session(&backend, None, None);

    assert!(matches!(
        service.login("", GOOD_PASSWORD).await,
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        service.login("ada@example.com", "").await,
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        service.register("Ada", "ada@example.com", "123").await,
        Err(ApiError::Validation(_))
    ));
    assert!(backend.requests_to("/auth/login").is_empty());
    assert!(backend.requests_to("/auth/register").is_empty());
}

#[tokio::test]
async fn test_logout_clears_locally_when_server_call_fails() {
    let backend = Arc::new(ScriptedBackend::new("access-0", "refresh-0").logout_fails());
    let service = service_with_session(&backend, Some("access-0"), Some("refresh-0"));
    let mut events = service.subscribe();

    service.logout().await;

    assert_eq!(service.store().snapshot(), Session::default());
    assert_eq!(events.recv().await.expect("event"), AuthEvent::SignedOut);

    let sent = backend.requests_to("/auth/logout");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].bearer(), Some("access-0"));
    assert_eq!(sent[0].body.as_ref().expect("logout body")["refreshToken"], "refresh-0");

    // Logging out twice is harmless and makes no further server call
    service.logout().await;
    assert_eq!(backend.requests_to("/auth/logout").len(), 1);
}

#[tokio::test]
async fn test_logout_with_expired_token_does_not_refresh() {
    let backend = Arc::new(ScriptedBackend::new("fresh", "refresh-0"));
    let service = service_with_session(&backend, Some("stale"), Some("refresh-0"));

    service.logout().await;

    assert_eq!(backend.refresh_calls(), 0);
    assert_eq!(service.store().snapshot(), Session::default());
}

#[tokio::test]
async fn test_hydrate_renews_session_held_only_by_refresh_token() {
    let backend = Arc::new(ScriptedBackend::new("fresh", "refresh-0"));
    let persisted = Session {
        access_token: None,
        refresh_token: Some("refresh-0".to_string()),
        user: None,
    };
    let store = Arc::new(
        CredentialStore::open(Box::new(MemoryBackend::with_session(persisted)))
            .expect("open store"),
    );
    let transport: Arc<dyn Transport> = Arc::clone(&backend) as Arc<dyn Transport>;
    let service = AuthService::new(transport, store, "/login");

    assert!(service.state().is_loading);
    let state = service.hydrate().await;

    assert!(!state.is_loading);
    assert!(state.is_authenticated);
    assert_eq!(state.user, Some(ada()));
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(service.store().access_token().as_deref(), Some("access-1"));
}

#[tokio::test]
async fn test_hydrate_keeps_cached_session_when_offline() {
    let backend = Arc::new(
        ScriptedBackend::new("fresh", "refresh-0").refresh_mode(RefreshMode::NetworkDown),
    );
    let service = service_with_session(&backend, Some("stale"), Some("refresh-0"));

    let state = service.hydrate().await;
    assert!(!state.is_loading);
    assert!(state.is_authenticated);
    assert_eq!(state.user, Some(ada()));
}

#[tokio::test]
async fn test_guard_follows_session_lifecycle() {
    let backend =
        Arc::new(ScriptedBackend::new("fresh", "refresh-0").refresh_mode(RefreshMode::Reject));
    let service = service_with_session(&backend, None, None);
    let guard = RouteGuard::new();

    // Before hydration: loader, no redirect
    assert_eq!(guard.evaluate_state(&service.state(), "/favorites"), GuardDecision::Loading);

    let state = service.hydrate().await;
    assert_eq!(
        guard.evaluate_state(&state, "/favorites"),
        GuardDecision::Redirect {
            to: "/login".to_string(),
            from: "/favorites".to_string(),
        }
    );

    service.login("ada@example.com", GOOD_PASSWORD).await.expect("login");
    assert_eq!(guard.evaluate_state(&service.state(), "/favorites"), GuardDecision::Render);
    assert_eq!(guard.post_login_destination(Some("/favorites")), "/favorites");

    // Token expires and the refresh token is rejected: back to the login page
    let expired = service
        .client()
        .execute(bookshelf_client::api::ApiRequest::get("/favorites"))
        .await;
    assert!(expired.is_ok(), "access-login is still valid");

    service
        .store()
        .set_session("stale", "refresh-login", Some(ada()))
        .expect("set session");
    let expired = service
        .client()
        .execute(bookshelf_client::api::ApiRequest::get("/favorites"))
        .await;
    assert_eq!(expired.unwrap_err(), ApiError::SessionExpired);
    assert!(matches!(
        guard.evaluate_state(&service.state(), "/favorites"),
        GuardDecision::Redirect { .. }
    ));
}

#[tokio::test]
async fn test_refresh_profile_updates_cache() {
    let backend = Arc::new(ScriptedBackend::new("access-0", "refresh-0"));
    let store_user = bookshelf_client::models::UserProfile {
        name: "Old Name".to_string(),
        ..ada()
    };
    let service = service_with_session(&backend, Some("access-0"), Some("refresh-0"));
    service.store().update_user(store_user).expect("update user");

    let user = service.refresh_profile().await.expect("profile");
    assert_eq!(user, ada());
    assert_eq!(service.store().user(), Some(ada()));
}
