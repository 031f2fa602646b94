use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::referral::repo_types::Referral;

/// Insert a new active referral with zero usage.
pub async fn insert<'e, E: PgExecutor<'e>>(
    db: E,
    owner_id: Uuid,
    code: &str,
    expire_by: OffsetDateTime,
) -> sqlx::Result<Referral> {
    sqlx::query_as::<_, Referral>(
        r#"
        INSERT INTO referrals (id, owner_id, code, expire_by)
        VALUES ($1, $2, $3, $4)
        RETURNING id, owner_id, code, state, usage_count, created_at, expire_by, expired_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(owner_id)
    .bind(code)
    .bind(expire_by)
    .fetch_one(db)
    .await
}

/// Newest active referral for `(owner, code)`.
pub async fn find_active_by_owner_and_code<'e, E: PgExecutor<'e>>(
    db: E,
    owner_id: Uuid,
    code: &str,
) -> sqlx::Result<Option<Referral>> {
    sqlx::query_as::<_, Referral>(
        r#"
        SELECT id, owner_id, code, state, usage_count, created_at, expire_by, expired_at
          FROM referrals
         WHERE owner_id = $1 AND code = $2 AND state = 'active'
         ORDER BY created_at DESC
         LIMIT 1
        "#,
    )
    .bind(owner_id)
    .bind(code)
    .fetch_optional(db)
    .await
}

pub async fn count_active_by_owner<'e, E: PgExecutor<'e>>(db: E, owner_id: Uuid) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM referrals WHERE owner_id = $1 AND state = 'active'",
    )
    .bind(owner_id)
    .fetch_one(db)
    .await
}

/// Row-locks every active referral of `owner_id` in id order. Returns how
/// many rows are now held.
pub async fn lock_active_by_owner<'e, E: PgExecutor<'e>>(db: E, owner_id: Uuid) -> sqlx::Result<u64> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT id
          FROM referrals
         WHERE owner_id = $1 AND state = 'active'
         ORDER BY id
           FOR UPDATE
        "#,
    )
    .bind(owner_id)
    .fetch_all(db)
    .await?;
    Ok(ids.len() as u64)
}

pub async fn soft_expire_by_owner<'e, E: PgExecutor<'e>>(
    db: E,
    owner_id: Uuid,
    now: OffsetDateTime,
) -> sqlx::Result<u64> {
    let done = sqlx::query(
        r#"
        UPDATE referrals
           SET state = 'expired', expired_at = $2
         WHERE id IN (
                SELECT id FROM referrals
                 WHERE owner_id = $1 AND state = 'active'
                 ORDER BY id
                   FOR UPDATE
               )
        "#,
    )
    .bind(owner_id)
    .bind(now)
    .execute(db)
    .await?;
    Ok(done.rows_affected())
}

/// Bulk expiry of every active referral whose deadline is before `cutoff`.
pub async fn soft_expire_where_expired_before<'e, E: PgExecutor<'e>>(
    db: E,
    cutoff: OffsetDateTime,
) -> sqlx::Result<u64> {
    let done = sqlx::query(
        r#"
        UPDATE referrals
           SET state = 'expired', expired_at = $1
         WHERE id IN (
                SELECT id FROM referrals
                 WHERE state = 'active' AND expire_by < $1
                 ORDER BY id
                   FOR UPDATE
               )
        "#,
    )
    .bind(cutoff)
    .execute(db)
    .await?;
    Ok(done.rows_affected())
}

/// Row-locking increment; `None` when the referral is no longer active.
pub async fn increment_usage<'e, E: PgExecutor<'e>>(db: E, id: Uuid) -> sqlx::Result<Option<i32>> {
    sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE referrals
           SET usage_count = usage_count + 1
         WHERE id = $1 AND state = 'active'
        RETURNING usage_count
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await
}
