//! Tests for LoginService.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::{LoginError, LoginPolicy, LoginRequest, LoginScope, LoginService};
use crate::auth::jwt::TokenService;
use crate::auth::login_tracker::LoginAttemptTracker;
use crate::storage::{Role, ServerDatabase};
use crate::test_helpers::{seeded_db, user_with_password};

const IP: &str = "1.2.3.4";
const OTP_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

fn service(db: &ServerDatabase, max_retries: u32, lock: Duration) -> LoginService {
    LoginService::new(
        db.clone(),
        Arc::new(TokenService::new(b"login-test-secret", 3600)),
        Arc::new(LoginAttemptTracker::new()),
        LoginPolicy {
            max_retries,
            lock_duration: lock,
            trusted_ips: HashSet::from(["10.0.0.1".to_string()]),
        },
    )
}

fn creds(username: &str, password: &str) -> LoginRequest {
    LoginRequest {
        username: username.into(),
        password: password.into(),
        otp_code: None,
    }
}

#[tokio::test]
async fn successful_login_returns_token_and_role() {
    let db = seeded_db().await;
    user_with_password(&db, "alice", "pw", Role::Tenant).await;
    let svc = service(&db, 5, Duration::from_secs(300));

    svc.login(IP, &creds("alice", "nope"), LoginScope::Any).await.unwrap_err();
    assert_eq!(svc.tracker().get(IP).await, Some(1));

    let resp = svc.login(IP, &creds("alice", "pw"), LoginScope::Any).await.unwrap();
    assert_eq!(resp.role, Role::Tenant);
    assert!(!resp.token.is_empty());
    assert_eq!(svc.tracker().get(IP).await, None);
}

#[tokio::test]
async fn unknown_user_and_wrong_password_are_indistinguishable() {
    let db = seeded_db().await;
    user_with_password(&db, "alice", "pw", Role::General).await;
    let svc = service(&db, 5, Duration::from_secs(300));

    let unknown = svc.login(IP, &creds("bob", "pw"), LoginScope::Any).await.unwrap_err();
    let wrong = svc.login(IP, &creds("alice", "x"), LoginScope::Any).await.unwrap_err();
    assert!(matches!(unknown, LoginError::BadCredentials));
    assert_eq!(unknown.to_string(), wrong.to_string());
    assert_eq!(svc.tracker().get(IP).await, Some(2));
}

#[tokio::test]
async fn lockout_after_max_failures_even_with_correct_password() {
    let db = seeded_db().await;
    user_with_password(&db, "alice", "pw", Role::Tenant).await;
    let svc = service(&db, 3, Duration::from_secs(3));

    for _ in 0..3 {
        let err = svc.login(IP, &creds("alice", "bad"), LoginScope::Any).await.unwrap_err();
        assert!(matches!(err, LoginError::BadCredentials));
    }
    let err = svc.login(IP, &creds("alice", "pw"), LoginScope::Any).await.unwrap_err();
    assert!(matches!(err, LoginError::RateLimited));

    // Another address is unaffected.
    assert!(svc.login("5.6.7.8", &creds("alice", "pw"), LoginScope::Any).await.is_ok());

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert!(svc.login(IP, &creds("alice", "pw"), LoginScope::Any).await.is_ok());
}

#[tokio::test]
async fn trusted_ip_bypasses_counter() {
    let db = seeded_db().await;
    user_with_password(&db, "alice", "pw", Role::Tenant).await;
    let svc = service(&db, 2, Duration::from_secs(300));

    for _ in 0..5 {
        let err = svc
            .login("10.0.0.1", &creds("alice", "bad"), LoginScope::Any)
            .await
            .unwrap_err();
        assert!(matches!(err, LoginError::BadCredentials));
    }
    assert_eq!(svc.tracker().get("10.0.0.1").await, None);
    assert!(svc.login("10.0.0.1", &creds("alice", "pw"), LoginScope::Any).await.is_ok());
}

#[tokio::test]
async fn otp_is_required_when_configured() {
    let db = seeded_db().await;
    let user = user_with_password(&db, "alice", "pw", Role::Tenant).await;
    db.set_user_otp_secret(user.id, Some(OTP_SECRET)).await.unwrap();
    let svc = service(&db, 5, Duration::from_secs(300));

    let err = svc.login(IP, &creds("alice", "pw"), LoginScope::Any).await.unwrap_err();
    assert!(matches!(err, LoginError::InvalidOtp));
    assert_eq!(svc.tracker().get(IP).await, Some(1));

    let code = crate::auth::otp::current_code(OTP_SECRET);
    let mut req = creds("alice", "pw");
    req.otp_code = Some(code);
    assert!(svc.login(IP, &req, LoginScope::Any).await.is_ok());
}

#[tokio::test]
async fn disabled_user_is_forbidden_without_counting() {
    let db = seeded_db().await;
    let user = user_with_password(&db, "alice", "pw", Role::Tenant).await;
    db.update_user_fields(user.id, None, Some(true), None).await.unwrap();
    let svc = service(&db, 5, Duration::from_secs(300));

    let err = svc.login(IP, &creds("alice", "pw"), LoginScope::Any).await.unwrap_err();
    assert!(matches!(err, LoginError::Forbidden(_)));
    assert_eq!(svc.tracker().get(IP).await, None);
}

#[tokio::test]
async fn tenant_scope_rejects_other_roles() {
    let db = seeded_db().await;
    user_with_password(&db, "gen", "pw", Role::General).await;
    user_with_password(&db, "ten", "pw", Role::Tenant).await;
    let svc = service(&db, 5, Duration::from_secs(300));

    let err = svc
        .login(IP, &creds("gen", "pw"), LoginScope::TenantOnly)
        .await
        .unwrap_err();
    assert!(matches!(err, LoginError::Forbidden(_)));
    assert_eq!(svc.tracker().get(IP).await, Some(1));

    let ok = svc.login(IP, &creds("ten", "pw"), LoginScope::TenantOnly).await.unwrap();
    assert_eq!(ok.role, Role::Tenant);
}

#[tokio::test]
async fn guest_account_cannot_log_in() {
    let db = seeded_db().await;
    let guest = db.get_first_user_with_role(Role::Guest).await.unwrap();
    db.update_user_fields(guest.id, None, Some(false), None).await.unwrap();
    let svc = service(&db, 5, Duration::from_secs(300));

    let err = svc.login(IP, &creds("guest", "unused"), LoginScope::Any).await.unwrap_err();
    assert!(matches!(err, LoginError::BadCredentials));
}
