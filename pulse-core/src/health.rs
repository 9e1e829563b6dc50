//! Health engine: folds features, blockers, and member inactivity into one
//! workspace score.

use std::sync::Arc;

use sqlx::Row;
use tracing::{error, info};

use pulse_model::{BusEvent, RiskLevel, WorkspaceId};

use crate::database::Database;
use crate::error::Result;
use crate::events::EventSink;

/// Aggregated inputs for one recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HealthInputs {
    pub feature_completion_avg: f64,
    pub active_blocker_total: i64,
    pub conflict_blocker_count: i64,
    pub inactive_member_count: i64,
}

/// Weighted score, clamped to [0, 100], rounded half-up.
pub fn compute(inputs: HealthInputs) -> (i32, RiskLevel) {
    let raw = 0.4 * inputs.feature_completion_avg
        - 5.0 * inputs.active_blocker_total as f64
        - 3.0 * inputs.conflict_blocker_count as f64
        - 5.0 * inputs.inactive_member_count as f64;

    let score = (raw.round() as i32).clamp(0, 100);
    (score, RiskLevel::from_score(score))
}

pub struct HealthEngine {
    db: Database,
    sink: Arc<dyn EventSink>,
    default_window_hours: i32,
}

impl std::fmt::Debug for HealthEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthEngine")
            .field("default_window_hours", &self.default_window_hours)
            .finish_non_exhaustive()
    }
}

impl HealthEngine {
    pub fn new(db: Database, sink: Arc<dyn EventSink>, default_window_hours: i32) -> Self {
        Self {
            db,
            sink,
            default_window_hours,
        }
    }

    /// Recompute and persist the workspace score, then emit `HEALTH_UPDATE`.
    /// Logs and swallows failures like every engine on the async side of
    /// the ACK.
    pub async fn run(&self, workspace_id: WorkspaceId) {
        match self.run_inner(workspace_id).await {
            Ok(event) => {
                self.sink.publish(workspace_id, event).await;
            }
            Err(e) => {
                error!(%workspace_id, error = %e, "health engine run failed, rolled back");
            }
        }
    }

    async fn run_inner(&self, workspace_id: WorkspaceId) -> Result<BusEvent> {
        let mut tx = self.db.pool().begin().await?;

        let window_row = sqlx::query(
            r#"SELECT activity_window_hours FROM workspaces WHERE id = $1"#,
        )
        .bind(workspace_id.to_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let window_hours = match window_row {
            Some(row) => row.try_get::<i32, _>("activity_window_hours")?,
            None => self.default_window_hours,
        };

        let features = sqlx::query(
            r#"
            SELECT COALESCE(AVG(completion_percentage), 0)::FLOAT8 AS completion_avg
            FROM features
            WHERE workspace_id = $1
            "#,
        )
        .bind(workspace_id.to_uuid())
        .fetch_one(&mut *tx)
        .await?;

        let blockers = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE blocker_type = 'FILE_CONFLICT_RISK') AS conflicts
            FROM blockers
            WHERE workspace_id = $1
              AND NOT resolved
            "#,
        )
        .bind(workspace_id.to_uuid())
        .fetch_one(&mut *tx)
        .await?;

        let members = sqlx::query(
            r#"
            SELECT COUNT(*) AS inactive
            FROM members
            WHERE workspace_id = $1
              AND (last_active IS NULL
                   OR last_active < now() - ($2 * INTERVAL '1 hour'))
            "#,
        )
        .bind(workspace_id.to_uuid())
        .bind(window_hours)
        .fetch_one(&mut *tx)
        .await?;

        let inputs = HealthInputs {
            feature_completion_avg: features.try_get("completion_avg")?,
            active_blocker_total: blockers.try_get("total")?,
            conflict_blocker_count: blockers.try_get("conflicts")?,
            inactive_member_count: members.try_get("inactive")?,
        };
        let (score, risk_level) = compute(inputs);

        sqlx::query(
            r#"UPDATE workspaces SET health_score = $2, updated_at = now() WHERE id = $1"#,
        )
        .bind(workspace_id.to_uuid())
        .bind(score)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(%workspace_id, score, risk = %risk_level, "health recomputed");

        Ok(BusEvent::HealthUpdate { score, risk_level })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Result;
    use sqlx::PgPool;

    use pulse_model::{FeatureStatus, Severity};

    use crate::blockers;
    use crate::events::MockEventSink;
    use crate::testing;

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn score_combines_inputs_and_persists(pool: PgPool) -> Result<()> {
        let workspace_id = testing::seed_workspace(&pool).await?;

        // avg completion 80 -> 32; one conflict blocker -> -5 - 3; one
        // never-active member -> -5; score 19, CRITICAL.
        testing::seed_feature(&pool, workspace_id, "checkout", FeatureStatus::Active, 90)
            .await?;
        testing::seed_feature(&pool, workspace_id, "search", FeatureStatus::Active, 70)
            .await?;
        testing::seed_member(&pool, workspace_id, "u-1", "alice").await?;

        let mut conn = pool.acquire().await?;
        blockers::upsert_conflict_blocker(
            &mut conn,
            workspace_id,
            "a.js",
            Severity::Medium,
            "overlap",
        )
        .await?;
        drop(conn);

        let mut sink = MockEventSink::new();
        sink.expect_publish()
            .withf(|_, event| {
                matches!(
                    event,
                    BusEvent::HealthUpdate {
                        score: 19,
                        risk_level: RiskLevel::Critical,
                    }
                )
            })
            .times(1)
            .return_const(());

        let engine = HealthEngine::new(
            Database::from_pool(pool.clone()),
            std::sync::Arc::new(sink),
            72,
        );
        engine.run(workspace_id).await;

        let row: (i32,) =
            sqlx::query_as(r#"SELECT health_score FROM workspaces WHERE id = $1"#)
                .bind(workspace_id.to_uuid())
                .fetch_one(&pool)
                .await?;
        assert_eq!(row.0, 19);
        Ok(())
    }

    #[test]
    fn negative_raw_clamps_to_zero() {
        // 0.4*20 - 5*7 - 3*5 = -42
        let (score, risk) = compute(HealthInputs {
            feature_completion_avg: 20.0,
            active_blocker_total: 7,
            conflict_blocker_count: 5,
            inactive_member_count: 0,
        });
        assert_eq!(score, 0);
        assert_eq!(risk, RiskLevel::Critical);
    }

    #[test]
    fn raw_above_hundred_clamps_to_hundred() {
        let (score, risk) = compute(HealthInputs {
            feature_completion_avg: 295.0,
            ..HealthInputs::default()
        });
        assert_eq!(score, 100);
        assert_eq!(risk, RiskLevel::Healthy);
    }

    #[test]
    fn rounding_is_half_up() {
        // 0.4 * 76.25 = 30.5 -> 31
        let (score, _) = compute(HealthInputs {
            feature_completion_avg: 76.25,
            ..HealthInputs::default()
        });
        assert_eq!(score, 31);
    }

    #[test]
    fn empty_workspace_scores_zero() {
        let (score, risk) = compute(HealthInputs::default());
        assert_eq!(score, 0);
        assert_eq!(risk, RiskLevel::Critical);
    }

    #[test]
    fn blockers_and_inactivity_drag_the_score() {
        let (score, risk) = compute(HealthInputs {
            feature_completion_avg: 250.0,
            active_blocker_total: 2,
            conflict_blocker_count: 1,
            inactive_member_count: 1,
        });
        // 100 - 10 - 3 - 5
        assert_eq!(score, 82);
        assert_eq!(risk, RiskLevel::Healthy);
    }
}
