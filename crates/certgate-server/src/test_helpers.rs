//! Shared test helpers for server test modules.

use crate::auth::password::hash_password;
use crate::storage::{Role, ServerDatabase, User};

/// An in-memory database seeded with the `admin` and (disabled) `guest`
/// system accounts.
pub async fn seeded_db() -> ServerDatabase {
    let db = ServerDatabase::open_in_memory().await.unwrap();
    db.create_user("admin", "unused", Role::Admin, false)
        .await
        .unwrap();
    db.create_user("guest", "unused", Role::Guest, true)
        .await
        .unwrap();
    db
}

/// Create a user whose password is `password`.
pub async fn user_with_password(
    db: &ServerDatabase,
    username: &str,
    password: &str,
    role: Role,
) -> User {
    let hash = hash_password(password).unwrap();
    db.create_user(username, &hash, role, false).await.unwrap()
}
