//! Blocker store: the only writer of the `blockers` table.
//!
//! Every operation takes the caller's open transaction, so a failing engine
//! run rolls back blocker mutations together with the rest of its writes.
//! Insert-or-update goes through the partial unique index on
//! `(workspace_id, blocker_type, reference_id) WHERE NOT resolved`, which
//! keeps concurrent engine runs race-free without a prior SELECT.

use sqlx::{PgConnection, Row};

use pulse_model::{BlockerType, FeatureId, PullRequestStatus, Severity, WorkspaceId};

use crate::error::Result;

/// What a blocker upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    /// True when the row changed and a broadcast is warranted.
    pub fn changed(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

/// Insert a FILE_CONFLICT_RISK blocker for `file_path`, or update severity
/// and description when an unresolved one exists with different severity.
/// Equal severity is a no-op, which makes back-to-back engine runs silent.
pub async fn upsert_conflict_blocker(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    file_path: &str,
    severity: Severity,
    description: &str,
) -> Result<UpsertOutcome> {
    let row = sqlx::query(
        r#"
        INSERT INTO blockers (workspace_id, blocker_type, reference_id, severity, description)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (workspace_id, blocker_type, reference_id) WHERE NOT resolved
        DO UPDATE SET
            severity = EXCLUDED.severity,
            description = EXCLUDED.description,
            updated_at = now()
        WHERE blockers.severity IS DISTINCT FROM EXCLUDED.severity
        RETURNING (xmax = 0) AS inserted
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(BlockerType::FileConflictRisk.as_str())
    .bind(file_path)
    .bind(severity.as_str())
    .bind(description)
    .fetch_optional(conn)
    .await?;

    Ok(match row {
        None => UpsertOutcome::Unchanged,
        Some(row) if row.try_get::<bool, _>("inserted")? => UpsertOutcome::Inserted,
        Some(_) => UpsertOutcome::Updated,
    })
}

/// Resolve FILE_CONFLICT_RISK blockers whose file left the current conflict
/// set: files with ≥2 distinct live non-trunk branches, union files listed
/// in ≥2 open pull requests. One set-based statement; returns the number of
/// blockers resolved.
pub async fn resolve_stale_blockers(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    window_hours: i32,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE blockers b
        SET resolved = TRUE, updated_at = now()
        WHERE b.workspace_id = $1
          AND b.blocker_type = $2
          AND NOT b.resolved
          AND b.reference_id NOT IN (
              SELECT fa.file_path
              FROM file_activity fa
              WHERE fa.workspace_id = $1
                AND fa.branch <> ALL($3)
                AND fa.updated_at > now() - ($4 * INTERVAL '1 hour')
              GROUP BY fa.file_path
              HAVING COUNT(DISTINCT fa.branch) >= 2
              UNION
              SELECT pf.file_path
              FROM pr_files pf
              JOIN pull_requests pr ON pr.id = pf.pull_request_id
              WHERE pr.workspace_id = $1
                AND pr.status = $5
              GROUP BY pf.file_path
              HAVING COUNT(DISTINCT pr.id) >= 2
          )
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(BlockerType::FileConflictRisk.as_str())
    .bind(trunk_branches())
    .bind(window_hours)
    .bind(PullRequestStatus::Open.as_str())
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Insert a DEPENDENCY_BLOCK blocker for `feature_id`, or refresh its
/// description. Severity is fixed at HIGH: a blocked feature is never a
/// soft signal.
pub async fn upsert_dependency_blocker(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    feature_id: FeatureId,
    description: &str,
) -> Result<UpsertOutcome> {
    let row = sqlx::query(
        r#"
        INSERT INTO blockers (workspace_id, blocker_type, reference_id, severity, description)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (workspace_id, blocker_type, reference_id) WHERE NOT resolved
        DO UPDATE SET
            description = EXCLUDED.description,
            updated_at = now()
        WHERE blockers.description IS DISTINCT FROM EXCLUDED.description
        RETURNING (xmax = 0) AS inserted
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(BlockerType::DependencyBlock.as_str())
    .bind(feature_id.to_uuid().to_string())
    .bind(Severity::High.as_str())
    .bind(description)
    .fetch_optional(conn)
    .await?;

    Ok(match row {
        None => UpsertOutcome::Unchanged,
        Some(row) if row.try_get::<bool, _>("inserted")? => UpsertOutcome::Inserted,
        Some(_) => UpsertOutcome::Updated,
    })
}

/// Mark the unresolved DEPENDENCY_BLOCK blocker for `feature_id` resolved.
pub async fn resolve_dependency_blocker(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    feature_id: FeatureId,
) -> Result<u64> {
    resolve_blocker(
        conn,
        workspace_id,
        BlockerType::DependencyBlock,
        &feature_id.to_uuid().to_string(),
    )
    .await
}

/// Insert or refresh an ALIGNMENT_DRIFT blocker keyed by branch.
pub async fn upsert_alignment_blocker(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    branch: &str,
    severity: Severity,
    description: &str,
) -> Result<UpsertOutcome> {
    let row = sqlx::query(
        r#"
        INSERT INTO blockers (workspace_id, blocker_type, reference_id, severity, description)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (workspace_id, blocker_type, reference_id) WHERE NOT resolved
        DO UPDATE SET
            severity = EXCLUDED.severity,
            description = EXCLUDED.description,
            updated_at = now()
        WHERE blockers.severity IS DISTINCT FROM EXCLUDED.severity
           OR blockers.description IS DISTINCT FROM EXCLUDED.description
        RETURNING (xmax = 0) AS inserted
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(BlockerType::AlignmentDrift.as_str())
    .bind(branch)
    .bind(severity.as_str())
    .bind(description)
    .fetch_optional(conn)
    .await?;

    Ok(match row {
        None => UpsertOutcome::Unchanged,
        Some(row) if row.try_get::<bool, _>("inserted")? => UpsertOutcome::Inserted,
        Some(_) => UpsertOutcome::Updated,
    })
}

/// Mark the unresolved ALIGNMENT_DRIFT blocker for `branch` resolved.
pub async fn resolve_alignment_blocker(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    branch: &str,
) -> Result<u64> {
    resolve_blocker(conn, workspace_id, BlockerType::AlignmentDrift, branch).await
}

async fn resolve_blocker(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    blocker_type: BlockerType,
    reference_id: &str,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE blockers
        SET resolved = TRUE, updated_at = now()
        WHERE workspace_id = $1
          AND blocker_type = $2
          AND reference_id = $3
          AND NOT resolved
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(blocker_type.as_str())
    .bind(reference_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

fn trunk_branches() -> Vec<String> {
    pulse_model::TRUNK_BRANCHES
        .iter()
        .map(|b| b.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Result;
    use sqlx::PgPool;

    use crate::testing;

    #[test]
    fn unchanged_outcome_suppresses_broadcast() {
        assert!(UpsertOutcome::Inserted.changed());
        assert!(UpsertOutcome::Updated.changed());
        assert!(!UpsertOutcome::Unchanged.changed());
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn conflict_upsert_enforces_active_uniqueness(pool: PgPool) -> Result<()> {
        let workspace_id = testing::seed_workspace(&pool).await?;
        let mut conn = pool.acquire().await?;

        let first = upsert_conflict_blocker(
            &mut conn,
            workspace_id,
            "a.js",
            Severity::Medium,
            "a.js is being modified on 2 branches",
        )
        .await?;
        assert_eq!(first, UpsertOutcome::Inserted);

        // Same severity again: silent, no second row.
        let repeat = upsert_conflict_blocker(
            &mut conn,
            workspace_id,
            "a.js",
            Severity::Medium,
            "a.js is being modified on 2 branches",
        )
        .await?;
        assert_eq!(repeat, UpsertOutcome::Unchanged);

        let escalated = upsert_conflict_blocker(
            &mut conn,
            workspace_id,
            "a.js",
            Severity::High,
            "a.js is being modified on 3 branches",
        )
        .await?;
        assert_eq!(escalated, UpsertOutcome::Updated);
        drop(conn);

        let unresolved = testing::unresolved_blockers(&pool, workspace_id).await?;
        assert_eq!(
            unresolved,
            vec![(
                "FILE_CONFLICT_RISK".to_string(),
                "a.js".to_string(),
                "HIGH".to_string()
            )]
        );
        Ok(())
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn stale_resolution_keeps_the_current_conflict_set(pool: PgPool) -> Result<()> {
        let workspace_id = testing::seed_workspace(&pool).await?;

        // a.js is still overlapped by two live feature branches; c.ts is
        // still listed in two open PRs; b.md left the conflict set.
        testing::touch_file(&pool, workspace_id, "feat-1", "a.js").await?;
        testing::touch_file(&pool, workspace_id, "feat-2", "a.js").await?;
        testing::seed_open_pr(&pool, workspace_id, 10, &["c.ts"]).await?;
        testing::seed_open_pr(&pool, workspace_id, 11, &["c.ts"]).await?;

        let mut conn = pool.acquire().await?;
        for file in ["a.js", "b.md", "c.ts"] {
            upsert_conflict_blocker(&mut conn, workspace_id, file, Severity::Medium, "overlap")
                .await?;
        }

        let resolved = resolve_stale_blockers(&mut conn, workspace_id, 72).await?;
        assert_eq!(resolved, 1);
        drop(conn);

        let unresolved = testing::unresolved_blockers(&pool, workspace_id).await?;
        let files: Vec<&str> = unresolved.iter().map(|(_, r, _)| r.as_str()).collect();
        assert_eq!(files, vec!["a.js", "c.ts"]);
        Ok(())
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn dependency_blocker_resolves_and_can_reopen(pool: PgPool) -> Result<()> {
        let workspace_id = testing::seed_workspace(&pool).await?;
        let feature_id = testing::seed_feature(
            &pool,
            workspace_id,
            "checkout",
            pulse_model::FeatureStatus::Active,
            0,
        )
        .await?;

        let mut conn = pool.acquire().await?;
        let first =
            upsert_dependency_blocker(&mut conn, workspace_id, feature_id, "blocked by payments")
                .await?;
        assert_eq!(first, UpsertOutcome::Inserted);

        let resolved = resolve_dependency_blocker(&mut conn, workspace_id, feature_id).await?;
        assert_eq!(resolved, 1);

        // The partial index only guards unresolved rows, so a later block
        // opens a fresh one.
        let reopened =
            upsert_dependency_blocker(&mut conn, workspace_id, feature_id, "blocked again")
                .await?;
        assert_eq!(reopened, UpsertOutcome::Inserted);
        drop(conn);

        let unresolved = testing::unresolved_blockers(&pool, workspace_id).await?;
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].1, feature_id.to_uuid().to_string());
        assert_eq!(unresolved[0].2, "HIGH");
        Ok(())
    }
}
