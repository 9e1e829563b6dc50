//! Feature engine: dependency-driven status reconciliation and progress.
//!
//! Every non-COMPLETE feature in the workspace is evaluated on every push.
//! A feature with any incomplete upstream dependency is BLOCKED and carries
//! a DEPENDENCY_BLOCK blocker; once every upstream dependency completes, it
//! returns to ACTIVE and the blocker resolves. Progress advances by a fixed
//! per-commit delta, capped at 95 so that 100 stays reserved for an explicit
//! merge-to-trunk event.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::{PgConnection, Row};
use tracing::{debug, error, info};

use pulse_model::{
    BusEvent, Feature, FeatureId, FeaturePriority, FeatureStatus, WorkspaceId,
};

use crate::blockers;
use crate::database::Database;
use crate::error::{CoreError, Result};
use crate::events::EventSink;
use crate::health::HealthEngine;

/// Per-commit completion delta.
const COMPLETION_STEP: i32 = 5;
/// Progress cap; 100 is only reachable via merge-to-trunk.
const COMPLETION_CAP: i32 = 95;

pub struct FeatureEngine {
    db: Database,
    sink: Arc<dyn EventSink>,
    health: Arc<HealthEngine>,
}

impl std::fmt::Debug for FeatureEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureEngine").finish_non_exhaustive()
    }
}

impl FeatureEngine {
    pub fn new(db: Database, sink: Arc<dyn EventSink>, health: Arc<HealthEngine>) -> Self {
        Self { db, sink, health }
    }

    /// Reconcile every incomplete feature against its dependencies, then
    /// hand off to the health engine. Errors are logged and swallowed; the
    /// transaction rolls back as a whole.
    pub async fn run(
        &self,
        workspace_id: WorkspaceId,
        _modified_files: &[String],
        commit_hash: &str,
    ) {
        match self.run_inner(workspace_id, commit_hash).await {
            Ok(events) => {
                for event in events {
                    self.sink.publish(workspace_id, event).await;
                }
                self.health.run(workspace_id).await;
            }
            Err(e) => {
                error!(%workspace_id, error = %e, "feature engine run failed, rolled back");
            }
        }
    }

    async fn run_inner(
        &self,
        workspace_id: WorkspaceId,
        commit_hash: &str,
    ) -> Result<Vec<BusEvent>> {
        let mut tx = self.db.pool().begin().await?;

        let features = load_incomplete_features(&mut tx, workspace_id).await?;
        if features.is_empty() {
            tx.commit().await?;
            debug!(%workspace_id, "no incomplete features to evaluate");
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        for feature in &features {
            let blocking = incomplete_dependencies(&mut tx, feature.id).await?;

            let next_status = if blocking.is_empty() {
                FeatureStatus::Active
            } else {
                FeatureStatus::Blocked
            };

            if !blocking.is_empty() {
                let description = format!(
                    "{} is blocked by incomplete features: {}",
                    feature.name,
                    blocking.join(", ")
                );
                let outcome = blockers::upsert_dependency_blocker(
                    &mut tx,
                    workspace_id,
                    feature.id,
                    &description,
                )
                .await?;

                if outcome == blockers::UpsertOutcome::Inserted {
                    events.push(BusEvent::BlockerCreated {
                        feature_id: feature.id,
                        feature_name: feature.name.clone(),
                        blocked_by: blocking.clone(),
                    });
                }
            } else if feature.status == FeatureStatus::Blocked {
                blockers::resolve_dependency_blocker(&mut tx, workspace_id, feature.id)
                    .await?;
            }

            let completion =
                (feature.completion_percentage + COMPLETION_STEP).min(COMPLETION_CAP);

            sqlx::query(
                r#"
                UPDATE features
                SET status = $2, completion_percentage = $3, updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(feature.id.to_uuid())
            .bind(next_status.as_str())
            .bind(completion)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            %workspace_id,
            commit = commit_hash,
            features = features.len(),
            blockers_created = events.len(),
            "feature engine committed"
        );

        Ok(events)
    }
}

async fn load_incomplete_features(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
) -> Result<Vec<Feature>> {
    let rows = sqlx::query(
        r#"
        SELECT id, workspace_id, name, priority, status, completion_percentage,
               owner_uid, created_at, updated_at
        FROM features
        WHERE workspace_id = $1
          AND status <> $2
        ORDER BY created_at
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(FeatureStatus::Complete.as_str())
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|row| {
            let priority: String = row.try_get("priority")?;
            let status: String = row.try_get("status")?;
            Ok(Feature {
                id: FeatureId(row.try_get("id")?),
                workspace_id: WorkspaceId(row.try_get("workspace_id")?),
                name: row.try_get("name")?,
                priority: FeaturePriority::from_str(&priority)
                    .map_err(|e| CoreError::Internal(e.to_string()))?,
                status: FeatureStatus::from_str(&status)
                    .map_err(|e| CoreError::Internal(e.to_string()))?,
                completion_percentage: row.try_get("completion_percentage")?,
                owner_uid: row.try_get("owner_uid")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .collect()
}

/// Names of upstream dependencies that are not COMPLETE.
async fn incomplete_dependencies(
    conn: &mut PgConnection,
    feature_id: FeatureId,
) -> Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT f.name
        FROM feature_dependencies d
        JOIN features f ON f.id = d.depends_on_feature_id
        WHERE d.feature_id = $1
          AND f.status <> $2
        ORDER BY f.name
        "#,
    )
    .bind(feature_id.to_uuid())
    .bind(FeatureStatus::Complete.as_str())
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|row| Ok(row.try_get::<String, _>("name")?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Result;
    use sqlx::PgPool;

    use crate::events::{EventSink, MockEventSink, NullSink};
    use crate::testing;

    fn engine(pool: &PgPool, sink: Arc<dyn EventSink>) -> FeatureEngine {
        let db = Database::from_pool(pool.clone());
        let health = Arc::new(crate::health::HealthEngine::new(db.clone(), sink.clone(), 72));
        FeatureEngine::new(db, sink, health)
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn incomplete_dependency_blocks_then_completion_unblocks(pool: PgPool) -> Result<()> {
        let workspace_id = testing::seed_workspace(&pool).await?;
        let payments =
            testing::seed_feature(&pool, workspace_id, "payments", FeatureStatus::Active, 0)
                .await?;
        let checkout =
            testing::seed_feature(&pool, workspace_id, "checkout", FeatureStatus::Active, 0)
                .await?;
        testing::seed_dependency(&pool, checkout, payments).await?;

        // First push: checkout blocks on payments, health recomputes.
        let mut sink = MockEventSink::new();
        sink.expect_publish()
            .withf(move |_, event| {
                matches!(
                    event,
                    BusEvent::BlockerCreated { feature_id, blocked_by, .. }
                        if *feature_id == checkout
                            && blocked_by.len() == 1
                            && blocked_by[0] == "payments"
                )
            })
            .times(1)
            .return_const(());
        sink.expect_publish()
            .withf(|_, event| matches!(event, BusEvent::HealthUpdate { .. }))
            .times(1)
            .return_const(());

        engine(&pool, Arc::new(sink))
            .run(workspace_id, &["pay.rs".to_string()], "abc123")
            .await;

        let (status, completion) = testing::feature_state(&pool, checkout).await?;
        assert_eq!(status, "BLOCKED");
        assert_eq!(completion, 5);
        assert_eq!(
            testing::unresolved_blockers(&pool, workspace_id).await?[0].1,
            checkout.to_uuid().to_string()
        );

        // Upstream completes: the next run unblocks without a new blocker.
        testing::set_feature_status(&pool, payments, FeatureStatus::Complete).await?;

        let mut sink = MockEventSink::new();
        sink.expect_publish()
            .withf(|_, event| matches!(event, BusEvent::HealthUpdate { .. }))
            .times(1)
            .return_const(());

        engine(&pool, Arc::new(sink))
            .run(workspace_id, &["pay.rs".to_string()], "def456")
            .await;

        let (status, completion) = testing::feature_state(&pool, checkout).await?;
        assert_eq!(status, "ACTIVE");
        assert_eq!(completion, 10);
        assert!(testing::unresolved_blockers(&pool, workspace_id).await?.is_empty());
        Ok(())
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn completion_caps_below_one_hundred(pool: PgPool) -> Result<()> {
        let workspace_id = testing::seed_workspace(&pool).await?;
        let feature =
            testing::seed_feature(&pool, workspace_id, "search", FeatureStatus::Active, 93)
                .await?;

        let runner = engine(&pool, Arc::new(NullSink));
        runner.run(workspace_id, &["s.rs".to_string()], "abc123").await;
        runner.run(workspace_id, &["s.rs".to_string()], "def456").await;

        let (status, completion) = testing::feature_state(&pool, feature).await?;
        assert_eq!(status, "ACTIVE");
        assert_eq!(completion, 95);
        Ok(())
    }
}
