//! Storage layer tests for the `CertGate` server.

use super::db::{DatabaseError, ServerDatabase};
use super::models::{
    CertificateRequest, CertificateStatus, CertificateType, Guarded, NewCertificate, Role, User,
};
use certgate_core::PageRequest;
use certgate_core::db::unix_timestamp;

async fn test_db() -> ServerDatabase {
    ServerDatabase::open_in_memory().await.unwrap()
}

async fn tenant(db: &ServerDatabase, name: &str) -> User {
    db.create_user(name, "hash", Role::Tenant, false).await.unwrap()
}

fn new_cert(owner: &User, expiration_date: i64) -> NewCertificate {
    NewCertificate {
        name: format!("{}-user", owner.username),
        cert_type: CertificateType::User,
        owner: owner.username.clone(),
        owner_id: owner.id,
        content: "payload".into(),
        issued_date: unix_timestamp(),
        expiration_date,
    }
}

async fn open_request(db: &ServerDatabase, user: &User) -> CertificateRequest {
    match db
        .create_request_guarded(user.id, &user.username, CertificateType::User, "x")
        .await
        .unwrap()
    {
        Guarded::Applied(req) => req,
        other => panic!("expected applied, got {other:?}"),
    }
}

// === User tests ===

#[tokio::test]
async fn create_and_get_user() {
    let db = test_db().await;
    let user = db
        .create_user("alice", "hash123", Role::General, false)
        .await
        .unwrap();

    assert_eq!(user.username, "alice");
    assert_eq!(user.role, Role::General);
    assert!(!user.disabled);
    assert!(user.pwd_ts > 0);

    let by_name = db.get_user_by_username("alice").await.unwrap();
    assert_eq!(by_name.id, user.id);
    assert!(matches!(
        db.get_user_by_username("bob").await,
        Err(DatabaseError::NotFound(_))
    ));
}

#[tokio::test]
async fn duplicate_username_is_a_constraint_error() {
    let db = test_db().await;
    db.create_user("alice", "h", Role::General, false)
        .await
        .unwrap();
    let err = db
        .create_user("alice", "h", Role::Tenant, false)
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Constraint(_)));
}

#[tokio::test]
async fn ensure_user_is_idempotent() {
    let db = test_db().await;
    let (first, created) = db.ensure_user("guest", "h", Role::Guest, true).await.unwrap();
    assert!(created);
    let (second, created) = db.ensure_user("guest", "other", Role::Guest, true).await.unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);
    assert_eq!(second.password_hash, "h");
}

#[tokio::test]
async fn first_user_with_role() {
    let db = test_db().await;
    assert!(db.get_first_user_with_role(Role::Admin).await.is_err());
    let admin = db.create_user("admin", "h", Role::Admin, false).await.unwrap();
    db.create_user("admin2", "h", Role::Admin, false).await.unwrap();
    assert_eq!(db.get_first_user_with_role(Role::Admin).await.unwrap().id, admin.id);
}

#[tokio::test]
async fn password_change_always_advances_epoch() {
    let db = test_db().await;
    let user = tenant(&db, "t").await;
    let once = db.set_user_password(user.id, "h2").await.unwrap();
    let twice = db.set_user_password(user.id, "h3").await.unwrap();

    assert!(once.pwd_ts > user.pwd_ts);
    assert!(twice.pwd_ts > once.pwd_ts);
    assert_eq!(twice.password_hash, "h3");
}

#[tokio::test]
async fn update_missing_user_is_not_found() {
    let db = test_db().await;
    assert!(matches!(
        db.update_user_fields(99, Some(Role::Admin), Some(true), None).await,
        Err(DatabaseError::NotFound(_))
    ));
    assert!(matches!(
        db.set_user_otp_secret(99, None).await,
        Err(DatabaseError::NotFound(_))
    ));
}

#[tokio::test]
async fn user_fields_change_together() {
    let db = test_db().await;
    let user = db.create_user("t", "h", Role::General, false).await.unwrap();

    let updated = db
        .update_user_fields(user.id, Some(Role::Tenant), Some(true), Some("h2"))
        .await
        .unwrap();
    assert_eq!(updated.role, Role::Tenant);
    assert!(updated.disabled);
    assert_eq!(updated.password_hash, "h2");
    assert!(updated.pwd_ts > user.pwd_ts);

    let untouched = db.update_user_fields(user.id, None, None, None).await.unwrap();
    assert_eq!(untouched.pwd_ts, updated.pwd_ts);
    assert_eq!(untouched.role, Role::Tenant);
}

#[tokio::test]
async fn delete_user_takes_their_records_along() {
    let db = test_db().await;
    let gone = tenant(&db, "gone").await;
    let kept = tenant(&db, "kept").await;
    open_request(&db, &gone).await;
    open_request(&db, &kept).await;
    db.create_certificate_guarded(&new_cert(&gone, unix_timestamp() + 3600))
        .await
        .unwrap();

    assert!(db.delete_user(gone.id).await.unwrap());
    assert!(!db.delete_user(gone.id).await.unwrap());
    assert!(matches!(
        db.get_user(gone.id).await,
        Err(DatabaseError::NotFound(_))
    ));

    let (certs, _) = db.list_certificates(PageRequest::new(1, 10)).await.unwrap();
    assert!(certs.is_empty());
    let (requests, total) = db
        .list_certificate_requests(PageRequest::new(1, 10))
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(requests[0].user_id, kept.id);
}

#[tokio::test]
async fn list_users_is_paginated_newest_first() {
    let db = test_db().await;
    for i in 0..5 {
        tenant(&db, &format!("t{i}")).await;
    }

    let (page, total) = db.list_users(PageRequest::new(1, 2)).await.unwrap();
    assert_eq!(total, 5);
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].username, "t4");

    let (last, _) = db.list_users(PageRequest::new(3, 2)).await.unwrap();
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].username, "t0");
}

// === Certificate tests ===

#[tokio::test]
async fn guarded_create_refuses_second_active_certificate() {
    let db = test_db().await;
    let owner = tenant(&db, "t").await;
    let exp = unix_timestamp() + 3600;

    let first = db.create_certificate_guarded(&new_cert(&owner, exp)).await.unwrap();
    let Guarded::Applied(cert) = first else {
        panic!("expected applied");
    };
    assert_eq!(cert.status, CertificateStatus::Valid);

    let second = db.create_certificate_guarded(&new_cert(&owner, exp)).await.unwrap();
    assert!(matches!(second, Guarded::ActiveCertificateExists));

    db.revoke_certificate(cert.id).await.unwrap();
    let third = db.create_certificate_guarded(&new_cert(&owner, exp)).await.unwrap();
    assert!(matches!(third, Guarded::Applied(_)));
}

#[tokio::test]
async fn guarded_create_for_unknown_owner_is_missing() {
    let db = test_db().await;
    let mut ghost = tenant(&db, "t").await;
    ghost.id = 999;
    let outcome = db
        .create_certificate_guarded(&new_cert(&ghost, unix_timestamp() + 10))
        .await
        .unwrap();
    assert!(matches!(outcome, Guarded::Missing));
}

#[tokio::test]
async fn usable_certificate_respects_status_and_expiry() {
    let db = test_db().await;
    let owner = tenant(&db, "t").await;
    let now = unix_timestamp();

    assert!(db.get_usable_certificate_for_owner(owner.id, now).await.unwrap().is_none());

    let Guarded::Applied(cert) = db
        .create_certificate_guarded(&new_cert(&owner, now + 100))
        .await
        .unwrap()
    else {
        panic!("expected applied");
    };
    assert!(db.get_usable_certificate_for_owner(owner.id, now).await.unwrap().is_some());
    // Past the expiration date the stored status alone is not enough.
    assert!(db.get_usable_certificate_for_owner(owner.id, now + 200).await.unwrap().is_none());

    db.revoke_certificate(cert.id).await.unwrap();
    assert!(db.get_usable_certificate_for_owner(owner.id, now).await.unwrap().is_none());

    let latest = db.get_latest_certificate_for_owner(owner.id).await.unwrap().unwrap();
    assert_eq!(latest.status, CertificateStatus::Revoked);
}

#[tokio::test]
async fn update_details_leaves_status_alone() {
    let db = test_db().await;
    let owner = tenant(&db, "t").await;
    let Guarded::Applied(cert) = db
        .create_certificate_guarded(&new_cert(&owner, unix_timestamp() + 100))
        .await
        .unwrap()
    else {
        panic!("expected applied");
    };
    db.revoke_certificate(cert.id).await.unwrap();

    let updated = db.update_certificate_details(cert.id, "renamed", 42).await.unwrap();
    assert_eq!(updated.name, "renamed");
    assert_eq!(updated.expiration_date, 42);
    assert_eq!(updated.status, CertificateStatus::Revoked);

    assert!(matches!(
        db.update_certificate_details(999, "x", 1).await,
        Err(DatabaseError::NotFound(_))
    ));
}

#[tokio::test]
async fn soft_deleted_certificate_is_invisible() {
    let db = test_db().await;
    let owner = tenant(&db, "t").await;
    let Guarded::Applied(cert) = db
        .create_certificate_guarded(&new_cert(&owner, unix_timestamp() + 100))
        .await
        .unwrap()
    else {
        panic!("expected applied");
    };

    assert!(db.delete_certificate(cert.id).await.unwrap());
    assert!(!db.delete_certificate(cert.id).await.unwrap());
    assert!(db.get_certificate(cert.id).await.is_err());
    assert!(!db.revoke_certificate(cert.id).await.unwrap());

    let (certs, total) = db.list_certificates(PageRequest::new(1, 10)).await.unwrap();
    assert!(certs.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn mark_expiring_only_touches_valid_within_horizon() {
    let db = test_db().await;
    let now = unix_timestamp();
    let soon = tenant(&db, "soon").await;
    let later = tenant(&db, "later").await;

    db.create_certificate_guarded(&new_cert(&soon, now + 10)).await.unwrap();
    db.create_certificate_guarded(&new_cert(&later, now + 10_000)).await.unwrap();

    assert_eq!(db.mark_expiring(now + 100).await.unwrap(), 1);
    // Already expiring rows are not counted again.
    assert_eq!(db.mark_expiring(now + 100).await.unwrap(), 0);

    let cert = db.get_latest_certificate_for_owner(soon.id).await.unwrap().unwrap();
    assert_eq!(cert.status, CertificateStatus::Expiring);
    let cert = db.get_latest_certificate_for_owner(later.id).await.unwrap().unwrap();
    assert_eq!(cert.status, CertificateStatus::Valid);
}

// === Certificate request tests ===

#[tokio::test]
async fn second_pending_request_is_refused() {
    let db = test_db().await;
    let user = tenant(&db, "t").await;
    let req = open_request(&db, &user).await;
    assert_eq!(req.status, CertificateStatus::Pending);
    assert_eq!(req.user_id, user.id);

    let again = db
        .create_request_guarded(user.id, &user.username, CertificateType::Node, "y")
        .await
        .unwrap();
    assert!(matches!(again, Guarded::PendingRequestExists));
}

#[tokio::test]
async fn pending_index_backs_the_invariant() {
    let db = test_db().await;
    let user = tenant(&db, "t").await;
    open_request(&db, &user).await;

    let now = unix_timestamp();
    let err = sqlx::query(
        "INSERT INTO certificate_requests (user_name, user_id, cert_type, status, reason, created_at, updated_at) VALUES (?, ?, 'user', 'pending', '', ?, ?)",
    )
    .bind(&user.username)
    .bind(user.id)
    .bind(now)
    .bind(now)
    .execute(db.pool())
    .await
    .map_err(DatabaseError::from)
    .unwrap_err();
    assert!(matches!(err, DatabaseError::Constraint(_)));
}

#[tokio::test]
async fn approve_issues_certificate_in_same_transaction() {
    let db = test_db().await;
    let user = tenant(&db, "t").await;
    let req = open_request(&db, &user).await;

    let outcome = db
        .approve_request_guarded(req.id, "admin", |r| NewCertificate {
            name: "c".into(),
            cert_type: r.cert_type,
            owner: r.user_name.clone(),
            owner_id: r.user_id,
            content: "p".into(),
            issued_date: 1,
            expiration_date: unix_timestamp() + 100,
        })
        .await
        .unwrap();
    let Guarded::Applied((approved, cert)) = outcome else {
        panic!("expected applied");
    };
    assert_eq!(approved.status, CertificateStatus::Valid);
    assert_eq!(approved.approved_by.as_deref(), Some("admin"));
    assert!(approved.approved_at.is_some());
    assert_eq!(cert.owner_id, user.id);
    assert_eq!(cert.status, CertificateStatus::Valid);

    let again = db
        .approve_request_guarded(req.id, "admin", |_| unreachable!())
        .await
        .unwrap();
    assert!(matches!(again, Guarded::NotPending(CertificateStatus::Valid)));
}

#[tokio::test]
async fn failed_issue_rolls_back_approval() {
    let db = test_db().await;
    let user = tenant(&db, "t").await;
    let req = open_request(&db, &user).await;

    // An owner id that violates the foreign key makes the insert fail.
    let err = db
        .approve_request_guarded(req.id, "admin", |r| NewCertificate {
            name: "c".into(),
            cert_type: r.cert_type,
            owner: r.user_name.clone(),
            owner_id: 9999,
            content: "p".into(),
            issued_date: 1,
            expiration_date: 2,
        })
        .await;
    assert!(err.is_err());

    let still = db.get_certificate_request(req.id).await.unwrap();
    assert_eq!(still.status, CertificateStatus::Pending);
    assert!(still.approved_by.is_none());
    let (certs, _) = db.list_certificates(PageRequest::new(1, 10)).await.unwrap();
    assert!(certs.is_empty());
}

#[tokio::test]
async fn reject_is_terminal() {
    let db = test_db().await;
    let user = tenant(&db, "t").await;
    let req = open_request(&db, &user).await;

    let Guarded::Applied(rejected) = db
        .reject_request_guarded(req.id, "admin", "no")
        .await
        .unwrap()
    else {
        panic!("expected applied");
    };
    assert_eq!(rejected.status, CertificateStatus::Rejected);
    assert_eq!(rejected.rejected_reason.as_deref(), Some("no"));

    assert!(matches!(
        db.reject_request_guarded(req.id, "admin", "again").await.unwrap(),
        Guarded::NotPending(CertificateStatus::Rejected)
    ));
    assert!(matches!(
        db.approve_request_guarded(req.id, "admin", |_| unreachable!())
            .await
            .unwrap(),
        Guarded::NotPending(CertificateStatus::Rejected)
    ));
    assert!(matches!(
        db.reject_request_guarded(999, "admin", "x").await.unwrap(),
        Guarded::Missing
    ));

    // After a rejection a fresh request can be filed.
    open_request(&db, &user).await;
}

#[tokio::test]
async fn request_lists() {
    let db = test_db().await;
    let a = tenant(&db, "a").await;
    let b = tenant(&db, "b").await;
    let first = open_request(&db, &a).await;
    db.reject_request_guarded(first.id, "admin", "no").await.unwrap();
    let second = open_request(&db, &a).await;
    open_request(&db, &b).await;

    let mine = db.list_requests_for_user(a.id).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].id, second.id);

    let (page, total) = db
        .list_certificate_requests(PageRequest::new(1, 2))
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(page.len(), 2);
    assert!(page[0].id > page[1].id);
}

#[tokio::test]
async fn concurrent_requests_leave_one_pending() {
    let dir = tempfile::tempdir().unwrap();
    let db = ServerDatabase::open(&dir.path().join("race.db")).await.unwrap();
    let user = tenant(&db, "t").await;

    let user_id = user.id;
    let mut handles = Vec::new();
    for _ in 0..8 {
        let db = db.clone();
        let name = user.username.clone();
        handles.push(tokio::spawn(async move {
            db.create_request_guarded(user_id, &name, CertificateType::User, "race")
                .await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if let Ok(Guarded::Applied(_)) = handle.await.unwrap() {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(db.list_requests_for_user(user.id).await.unwrap().len(), 1);
}
