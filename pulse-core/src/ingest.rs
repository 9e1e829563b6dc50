//! Storage steps of webhook ingestion.
//!
//! Every function takes the handler's open transaction, so the delivery
//! log, file activity, and member touches commit or roll back together and
//! the ACK only goes out over durable state.

use sqlx::{PgConnection, Row};

use pulse_model::{Member, Workspace, WorkspaceId};

use crate::error::Result;

/// Record the delivery id. Returns false when the id was already seen, in
/// which case the caller must treat the delivery as a duplicate and make no
/// further writes.
pub async fn insert_delivery(
    conn: &mut PgConnection,
    delivery_id: &str,
    repo_id: i64,
    branch: &str,
    commit_hash: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO webhook_deliveries (delivery_id, repo_id, branch, commit_hash)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (delivery_id) DO NOTHING
        "#,
    )
    .bind(delivery_id)
    .bind(repo_id)
    .bind(branch)
    .bind(commit_hash)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Resolve the workspace tracking an upstream repository by its stable
/// numeric id.
pub async fn workspace_by_repo(
    conn: &mut PgConnection,
    repo_id: i64,
) -> Result<Option<Workspace>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, github_repo_id, github_repo_name, dashboard_key,
               activity_window_hours, health_score, created_at, updated_at
        FROM workspaces
        WHERE github_repo_id = $1
        "#,
    )
    .bind(repo_id)
    .fetch_optional(conn)
    .await?;

    row.map(|row| {
        Ok(Workspace {
            id: WorkspaceId(row.try_get("id")?),
            name: row.try_get("name")?,
            github_repo_id: row.try_get("github_repo_id")?,
            github_repo_name: row.try_get("github_repo_name")?,
            dashboard_key: row.try_get("dashboard_key")?,
            activity_window_hours: row.try_get("activity_window_hours")?,
            health_score: row.try_get("health_score")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    })
    .transpose()
}

/// Remove every FileActivity row for a deleted branch.
pub async fn wipe_branch_activity(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    branch: &str,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM file_activity
        WHERE workspace_id = $1
          AND branch = $2
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(branch)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Upsert the pushed files in one multi-row statement, overwriting the
/// commit hash and freshness timestamp on conflict.
pub async fn upsert_file_activity(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    branch: &str,
    commit_hash: &str,
    file_paths: &[String],
) -> Result<u64> {
    if file_paths.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        r#"
        INSERT INTO file_activity (workspace_id, branch, file_path, last_commit_hash, updated_at)
        SELECT $1, $2, t.path, $3, now()
        FROM UNNEST($4::TEXT[]) AS t(path)
        ON CONFLICT (workspace_id, branch, file_path)
        DO UPDATE SET
            last_commit_hash = EXCLUDED.last_commit_hash,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(branch)
    .bind(commit_hash)
    .bind(file_paths)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Refresh `last_active` for members whose canonical username matches a
/// commit author on this push. `usernames` must already be lowercased.
pub async fn touch_members(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    usernames: &[String],
) -> Result<u64> {
    if usernames.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        r#"
        UPDATE members
        SET last_active = now()
        WHERE workspace_id = $1
          AND username = ANY($2)
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(usernames)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Stamp the delivery log row with the observed processing duration.
pub async fn finish_delivery(
    conn: &mut PgConnection,
    delivery_id: &str,
    duration_ms: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET duration_ms = $2
        WHERE delivery_id = $1
        "#,
    )
    .bind(delivery_id)
    .bind(duration_ms)
    .execute(conn)
    .await?;

    Ok(())
}

/// The member row for this `user_uid`, if any. Used to bind a dashboard
/// subscriber to its workspace at connect time.
pub async fn member_by_uid(
    conn: &mut PgConnection,
    user_uid: &str,
) -> Result<Option<Member>> {
    let row = sqlx::query(
        r#"
        SELECT id, workspace_id, user_uid, username, last_active
        FROM members
        WHERE user_uid = $1
        "#,
    )
    .bind(user_uid)
    .fetch_optional(conn)
    .await?;

    row.map(|row| {
        Ok(Member {
            id: row.try_get("id")?,
            workspace_id: WorkspaceId(row.try_get("workspace_id")?),
            user_uid: row.try_get("user_uid")?,
            username: row.try_get("username")?,
            last_active: row.try_get("last_active")?,
        })
    })
    .transpose()
}
