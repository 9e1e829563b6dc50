//! Seed helpers for the `#[sqlx::test]` suites. Each test gets a fresh
//! migrated database, so fixed identifiers are fine.

use sqlx::{PgPool, Row};
use sqlx::types::Uuid;

use pulse_model::{FeatureId, FeatureStatus, WorkspaceId};

use crate::error::Result;

pub(crate) async fn seed_workspace(pool: &PgPool) -> Result<WorkspaceId> {
    let row = sqlx::query(
        r#"
        INSERT INTO workspaces (name, github_repo_id, github_repo_name, dashboard_key)
        VALUES ('acme', 7001, 'acme/app', 'dash-key-1')
        RETURNING id
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(WorkspaceId(row.try_get("id")?))
}

pub(crate) async fn seed_member(
    pool: &PgPool,
    workspace_id: WorkspaceId,
    user_uid: &str,
    username: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO members (workspace_id, user_uid, username)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(user_uid)
    .bind(username)
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn seed_feature(
    pool: &PgPool,
    workspace_id: WorkspaceId,
    name: &str,
    status: FeatureStatus,
    completion: i32,
) -> Result<FeatureId> {
    let row = sqlx::query(
        r#"
        INSERT INTO features (workspace_id, name, status, completion_percentage)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(name)
    .bind(status.as_str())
    .bind(completion)
    .fetch_one(pool)
    .await?;

    Ok(FeatureId(row.try_get("id")?))
}

pub(crate) async fn set_feature_status(
    pool: &PgPool,
    feature_id: FeatureId,
    status: FeatureStatus,
) -> Result<()> {
    sqlx::query(r#"UPDATE features SET status = $2 WHERE id = $1"#)
        .bind(feature_id.to_uuid())
        .bind(status.as_str())
        .execute(pool)
        .await?;

    Ok(())
}

pub(crate) async fn seed_dependency(
    pool: &PgPool,
    feature_id: FeatureId,
    depends_on: FeatureId,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO feature_dependencies (feature_id, depends_on_feature_id)
        VALUES ($1, $2)
        "#,
    )
    .bind(feature_id.to_uuid())
    .bind(depends_on.to_uuid())
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a fresh file touch, as the ingest path would.
pub(crate) async fn touch_file(
    pool: &PgPool,
    workspace_id: WorkspaceId,
    branch: &str,
    file_path: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO file_activity (workspace_id, branch, file_path, last_commit_hash)
        VALUES ($1, $2, $3, 'c0ffee')
        ON CONFLICT (workspace_id, branch, file_path)
        DO UPDATE SET updated_at = now()
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(branch)
    .bind(file_path)
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn seed_open_pr(
    pool: &PgPool,
    workspace_id: WorkspaceId,
    pr_number: i32,
    file_paths: &[&str],
) -> Result<()> {
    let row = sqlx::query(
        r#"
        INSERT INTO pull_requests (workspace_id, pr_number, source_branch, target_branch)
        VALUES ($1, $2, $3, 'main')
        RETURNING id
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(pr_number)
    .bind(format!("pr-{pr_number}"))
    .fetch_one(pool)
    .await?;
    let pr_id: Uuid = row.try_get("id")?;

    for file_path in file_paths {
        sqlx::query(
            r#"INSERT INTO pr_files (pull_request_id, file_path) VALUES ($1, $2)"#,
        )
        .bind(pr_id)
        .bind(file_path)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Unresolved blockers as `(type, reference, severity)`, ordered for
/// stable assertions.
pub(crate) async fn unresolved_blockers(
    pool: &PgPool,
    workspace_id: WorkspaceId,
) -> Result<Vec<(String, String, String)>> {
    let rows = sqlx::query(
        r#"
        SELECT blocker_type, reference_id, severity
        FROM blockers
        WHERE workspace_id = $1
          AND NOT resolved
        ORDER BY blocker_type, reference_id
        "#,
    )
    .bind(workspace_id.to_uuid())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok((
                row.try_get("blocker_type")?,
                row.try_get("reference_id")?,
                row.try_get("severity")?,
            ))
        })
        .collect()
}

/// Current `(status, completion_percentage)` of a feature.
pub(crate) async fn feature_state(
    pool: &PgPool,
    feature_id: FeatureId,
) -> Result<(String, i32)> {
    let row = sqlx::query(
        r#"SELECT status, completion_percentage FROM features WHERE id = $1"#,
    )
    .bind(feature_id.to_uuid())
    .fetch_one(pool)
    .await?;

    Ok((row.try_get("status")?, row.try_get("completion_percentage")?))
}
