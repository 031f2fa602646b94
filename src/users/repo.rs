use sqlx::PgExecutor;
use uuid::Uuid;

use crate::users::repo_types::{NewUser, User};

/// Insert a new user. Fails with a unique violation when the username is taken.
pub async fn insert<'e, E: PgExecutor<'e>>(db: E, user: &NewUser) -> sqlx::Result<User> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, username, password_hash, password_salt, full_name)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, username, password_hash, password_salt, full_name, is_admin,
                  balance, referral_id, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(&user.password_salt)
    .bind(&user.full_name)
    .fetch_one(db)
    .await
}

/// Find a user by username.
pub async fn find_by_username<'e, E: PgExecutor<'e>>(
    db: E,
    username: &str,
) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password_hash, password_salt, full_name, is_admin,
               balance, referral_id, created_at, updated_at
          FROM users
         WHERE username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(db)
    .await
}

pub async fn find_by_id<'e, E: PgExecutor<'e>>(db: E, id: Uuid) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password_hash, password_salt, full_name, is_admin,
               balance, referral_id, created_at, updated_at
          FROM users
         WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn exists_by_username<'e, E: PgExecutor<'e>>(db: E, username: &str) -> sqlx::Result<bool> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
        .bind(username)
        .fetch_one(db)
        .await
}

/// Atomic increment; never read-modify-write from the caller.
pub async fn add_balance<'e, E: PgExecutor<'e>>(db: E, id: Uuid, delta: i64) -> sqlx::Result<u64> {
    let done = sqlx::query(
        r#"
        UPDATE users
           SET balance = balance + $2, updated_at = now()
         WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(delta)
    .execute(db)
    .await?;
    Ok(done.rows_affected())
}

/// Compare-and-set on `referral_id`: only writes when it is still NULL.
pub async fn set_referral<'e, E: PgExecutor<'e>>(
    db: E,
    id: Uuid,
    referral_id: Uuid,
) -> sqlx::Result<bool> {
    let done = sqlx::query(
        r#"
        UPDATE users
           SET referral_id = $2, updated_at = now()
         WHERE id = $1 AND referral_id IS NULL
        "#,
    )
    .bind(id)
    .bind(referral_id)
    .execute(db)
    .await?;
    Ok(done.rows_affected() == 1)
}
