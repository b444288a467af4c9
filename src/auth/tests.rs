// End-to-end flows through AuthService against the in-memory store

use chrono::Duration;
use proptest::prelude::*;

use crate::auth::{
    error::AuthError,
    repository::{AccountRepository, RefreshTokenRepository},
    test_support::{register_request, test_config, test_service, test_service_with, VALID_PASSWORD},
};
use crate::clock::Clock;

#[tokio::test]
async fn test_register_lockout_and_refresh_scenario() {
    let (service, store, clock) = test_service().await;

    // Register
    let registered = service
        .register(&register_request("alice", "alice@x.com"))
        .await
        .unwrap();
    assert!(!registered.access_token.is_empty());
    assert_eq!(registered.refresh_token, "");
    assert_eq!(registered.user.roles, vec!["User"]);
    let claims = service
        .token_service()
        .validate_access_token(&registered.access_token)
        .unwrap();
    assert!(claims.has_role("User"));

    // Duplicate username
    let duplicate = service
        .register(&register_request("alice", "other@x.com"))
        .await;
    assert!(matches!(duplicate, Err(AuthError::UsernameConflict)));

    // A successful login opens a refresh-capable session
    let session = service
        .login("alice", VALID_PASSWORD, "10.0.0.1")
        .await
        .unwrap();
    assert!(!session.refresh_token.is_empty());

    // Four wrong secrets, then the fifth locks the account
    for _ in 0..4 {
        let result = service.login("alice", "Wr0ng!Pass", "10.0.0.1").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }
    let locked_at = clock.now();
    match service.login("alice", "Wr0ng!Pass", "10.0.0.1").await {
        Err(AuthError::LockedOut { until }) => {
            assert_eq!(until, locked_at + Duration::minutes(30))
        }
        other => panic!("expected LockedOut, got {:?}", other.map(|r| r.user)),
    }

    // The correct secret does not bypass the lockout
    let correct = service.login("alice", VALID_PASSWORD, "10.0.0.1").await;
    assert!(matches!(correct, Err(AuthError::LockedOut { .. })));

    // Refresh works once with the original token, never twice
    let rotated = service
        .refresh_session(&session.refresh_token, "10.0.0.1")
        .await
        .unwrap();
    assert_ne!(rotated.refresh_token, session.refresh_token);

    let replay = service
        .refresh_session(&session.refresh_token, "10.0.0.1")
        .await;
    assert!(matches!(replay, Err(AuthError::InvalidRefreshToken)));

    let account = store
        .find_by_login(&crate::auth::LoginIdentifier::new("alice"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.failed_login_attempts, 5);
}

#[tokio::test]
async fn test_register_reports_each_conflict_separately() {
    let (service, _, _) = test_service().await;
    service
        .register(&register_request("alice", "alice@x.com"))
        .await
        .unwrap();

    let by_name = service
        .register(&register_request("alice", "new@x.com"))
        .await;
    let by_email = service
        .register(&register_request("alice2", "alice@x.com"))
        .await;

    assert!(matches!(by_name, Err(AuthError::UsernameConflict)));
    assert!(matches!(by_email, Err(AuthError::EmailConflict)));
}

#[tokio::test]
async fn test_registered_account_starts_active_and_unconfirmed() {
    let (service, store, clock) = test_service().await;
    let response = service
        .register(&register_request("alice", "alice@x.com"))
        .await
        .unwrap();

    let account = store.find_by_id(response.user.id).await.unwrap().unwrap();
    assert!(account.is_active);
    assert!(!account.is_email_confirmed);
    assert_eq!(account.failed_login_attempts, 0);
    assert!(account.password_hash.starts_with("$argon2id$"));
    assert_eq!(account.phone_number.as_deref(), Some("+15551234567"));

    assert_eq!(response.user.permissions, vec!["users.read"]);
    assert_eq!(response.expires_at, clock.now() + Duration::minutes(15));

    // Registration never stores a refresh token
    assert!(store.refresh_tokens_for(account.id).await.is_empty());
}

#[tokio::test]
async fn test_register_refuses_ambiguous_default_roles() {
    let (service, store, _) = test_service().await;
    let mut admin = store.role_by_name("Administrator").await.unwrap();
    admin.is_default = true;
    store.update_role(admin).await;

    let result = service
        .register(&register_request("alice", "alice@x.com"))
        .await;

    assert!(matches!(result, Err(AuthError::ConfigError(_))));
    assert!(!store.username_exists("alice").await.unwrap());
}

#[tokio::test]
async fn test_register_without_default_role_has_no_claims() {
    let (service, store, _) = test_service().await;
    let mut user = store.role_by_name("User").await.unwrap();
    user.is_default = false;
    store.update_role(user).await;

    let response = service
        .register(&register_request("alice", "alice@x.com"))
        .await
        .unwrap();

    assert!(response.user.roles.is_empty());
    assert!(response.user.permissions.is_empty());
}

#[tokio::test]
async fn test_unknown_identifier_looks_like_wrong_password() {
    let (service, _, _) = test_service().await;
    service
        .register(&register_request("alice", "alice@x.com"))
        .await
        .unwrap();

    let unknown = service
        .login("nobody", VALID_PASSWORD, "10.0.0.1")
        .await
        .unwrap_err();
    let wrong = service
        .login("alice", "Wr0ng!Pass", "10.0.0.1")
        .await
        .unwrap_err();

    assert!(matches!(unknown, AuthError::InvalidCredentials));
    assert!(matches!(wrong, AuthError::InvalidCredentials));
    assert_eq!(unknown.error_message(), wrong.error_message());
    assert_eq!(unknown.status_code(), wrong.status_code());
}

#[tokio::test]
async fn test_login_by_email_records_origin_and_last_login() {
    let (service, store, clock) = test_service().await;
    service
        .register(&register_request("alice", "alice@x.com"))
        .await
        .unwrap();

    let session = service
        .login("alice@x.com", VALID_PASSWORD, "203.0.113.7")
        .await
        .unwrap();

    assert_eq!(session.user.last_login_at, Some(clock.now()));
    let stored = store
        .find_by_token(&session.refresh_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.created_by_ip, "203.0.113.7");
    assert_eq!(stored.account_id, session.user.id);
    assert_eq!(stored.expires_at, clock.now() + Duration::days(7));
}

#[tokio::test]
async fn test_logout_revokes_every_session() {
    let (service, store, clock) = test_service().await;
    service
        .register(&register_request("alice", "alice@x.com"))
        .await
        .unwrap();
    let first = service.login("alice", VALID_PASSWORD, "10.0.0.1").await.unwrap();
    let second = service.login("alice", VALID_PASSWORD, "10.0.0.2").await.unwrap();

    let revoked = service.logout(first.user.id).await.unwrap();
    assert_eq!(revoked, 2);
    assert!(store
        .find_active_by_account(first.user.id, clock.now())
        .await
        .unwrap()
        .is_empty());

    for token in [&first.refresh_token, &second.refresh_token] {
        let result = service.refresh_session(token, "10.0.0.1").await;
        assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
    }
}

#[tokio::test]
async fn test_explicit_revoke_then_refresh_fails() {
    let (service, _, _) = test_service().await;
    service
        .register(&register_request("alice", "alice@x.com"))
        .await
        .unwrap();
    let session = service.login("alice", VALID_PASSWORD, "10.0.0.1").await.unwrap();
    let owner = session.user.id;

    service
        .revoke_token(owner, &session.refresh_token, "10.0.0.1")
        .await
        .unwrap();

    let refresh = service.refresh_session(&session.refresh_token, "10.0.0.1").await;
    assert!(matches!(refresh, Err(AuthError::InvalidRefreshToken)));
    let again = service
        .revoke_token(owner, &session.refresh_token, "10.0.0.1")
        .await;
    assert!(matches!(again, Err(AuthError::InvalidRefreshToken)));
}

#[tokio::test]
async fn test_revoke_rejects_tokens_held_by_another_account() {
    let (service, store, clock) = test_service().await;
    service
        .register(&register_request("alice", "alice@x.com"))
        .await
        .unwrap();
    service
        .register(&register_request("bob", "bob@x.com"))
        .await
        .unwrap();
    let alice = service.login("alice", VALID_PASSWORD, "10.0.0.1").await.unwrap();
    let bob = service.login("bob", VALID_PASSWORD, "10.0.0.2").await.unwrap();

    let result = service
        .revoke_token(bob.user.id, &alice.refresh_token, "10.0.0.2")
        .await;
    assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));

    let stored = store
        .find_by_token(&alice.refresh_token)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.is_active(clock.now()));
}

#[tokio::test]
async fn test_refresh_picks_up_current_claims() {
    let (service, store, _) = test_service().await;
    let registered = service
        .register(&register_request("alice", "alice@x.com"))
        .await
        .unwrap();
    let session = service.login("alice", VALID_PASSWORD, "10.0.0.1").await.unwrap();

    let admin = store.role_by_name("Administrator").await.unwrap();
    crate::auth::repository::RoleRepository::assign_role(&*store, registered.user.id, admin.id)
        .await
        .unwrap();

    let rotated = service
        .refresh_session(&session.refresh_token, "10.0.0.1")
        .await
        .unwrap();
    assert_eq!(rotated.user.roles, vec!["Administrator", "User"]);
    assert_eq!(
        rotated.user.permissions,
        vec!["users.delete", "users.read", "users.write"]
    );
}

#[tokio::test]
async fn test_current_user_and_token_validation() {
    let (service, store, clock) = test_service().await;
    let registered = service
        .register(&register_request("alice", "alice@x.com"))
        .await
        .unwrap();

    assert!(service.validate_token(&registered.access_token));
    assert!(!service.validate_token("not-a-token"));

    let me = service.current_user(registered.user.id).await.unwrap();
    assert_eq!(me, registered.user);

    let mut account = store.find_by_id(registered.user.id).await.unwrap().unwrap();
    account.is_active = false;
    store.save(&account).await.unwrap();
    let inactive = service.current_user(registered.user.id).await;
    assert!(matches!(inactive, Err(AuthError::InvalidToken)));

    clock.advance(Duration::minutes(21));
    assert!(!service.validate_token(&registered.access_token));
}

#[tokio::test]
async fn test_chain_revocation_follows_configuration() {
    let mut config = test_config();
    config.revoke_token_chain_on_reuse = true;
    let (service, store, clock) = test_service_with(config).await;
    service
        .register(&register_request("alice", "alice@x.com"))
        .await
        .unwrap();
    let session = service.login("alice", VALID_PASSWORD, "10.0.0.1").await.unwrap();
    let rotated = service
        .refresh_session(&session.refresh_token, "10.0.0.1")
        .await
        .unwrap();

    let replay = service
        .refresh_session(&session.refresh_token, "198.51.100.9")
        .await;
    assert!(matches!(replay, Err(AuthError::InvalidRefreshToken)));

    let descendant = store
        .find_by_token(&rotated.refresh_token)
        .await
        .unwrap()
        .unwrap();
    assert!(!descendant.is_active(clock.now()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_failures_below_threshold_never_lock(failures in 0i32..5) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (counter, locked) = rt.block_on(async {
            let (service, store, clock) = test_service().await;
            let registered = service
                .register(&register_request("alice", "alice@x.com"))
                .await
                .unwrap();
            for _ in 0..failures {
                let _ = service.login("alice", "Wr0ng!Pass", "10.0.0.1").await;
            }
            let account = store.find_by_id(registered.user.id).await.unwrap().unwrap();
            (account.failed_login_attempts, account.is_locked_out(clock.now()))
        });

        prop_assert_eq!(counter, failures);
        prop_assert!(!locked);
    }
}
