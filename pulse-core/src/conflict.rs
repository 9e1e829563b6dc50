//! Conflict engine: cross-branch and cross-PR file overlap detection.
//!
//! One transaction per run. The webhook has already acknowledged the
//! delivery by the time this runs, so errors never propagate upward: the
//! transaction rolls back, the failure is logged, and the next delivery
//! reprocesses the same state.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::{PgConnection, Row};
use tracing::{debug, error, info};

use pulse_model::{BusEvent, PullRequestStatus, TRUNK_BRANCHES, WorkspaceId};

use crate::blockers;
use crate::database::Database;
use crate::error::Result;
use crate::events::EventSink;
use crate::severity::{self, ConflictSignals};

/// Combined overlap signals for one file path.
#[derive(Debug, Clone, Default)]
struct FileSignals {
    branches: Vec<String>,
    touches_main: bool,
    pr_numbers: Vec<i32>,
}

pub struct ConflictEngine {
    db: Database,
    sink: Arc<dyn EventSink>,
    default_window_hours: i32,
}

impl std::fmt::Debug for ConflictEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictEngine")
            .field("default_window_hours", &self.default_window_hours)
            .finish_non_exhaustive()
    }
}

impl ConflictEngine {
    pub fn new(db: Database, sink: Arc<dyn EventSink>, default_window_hours: i32) -> Self {
        Self {
            db,
            sink,
            default_window_hours,
        }
    }

    /// Recompute conflict blockers for the workspace. Logs and swallows
    /// failures; the webhook contract is already satisfied.
    pub async fn run(
        &self,
        workspace_id: WorkspaceId,
        modified_files: &[String],
        trigger_branch: &str,
    ) {
        if modified_files.is_empty() {
            return;
        }

        match self.run_inner(workspace_id, trigger_branch).await {
            Ok(events) => {
                for event in events {
                    self.sink.publish(workspace_id, event).await;
                }
            }
            Err(e) => {
                error!(%workspace_id, error = %e, "conflict engine run failed, rolled back");
            }
        }
    }

    async fn run_inner(
        &self,
        workspace_id: WorkspaceId,
        trigger_branch: &str,
    ) -> Result<Vec<BusEvent>> {
        let mut tx = self.db.pool().begin().await?;

        let window_hours = load_window_hours(&mut tx, workspace_id)
            .await?
            .unwrap_or(self.default_window_hours);

        let mut signals = branch_overlaps(&mut tx, workspace_id, window_hours).await?;
        merge_pr_overlaps(&mut tx, workspace_id, &mut signals).await?;

        let mut events = Vec::new();
        for (file_path, file_signals) in &signals {
            let severity = severity::classify(ConflictSignals {
                branch_count: file_signals.branches.len(),
                pr_count: file_signals.pr_numbers.len(),
                touches_main: file_signals.touches_main,
            });
            let description = describe(file_path, file_signals);

            let outcome = blockers::upsert_conflict_blocker(
                &mut tx,
                workspace_id,
                file_path,
                severity,
                &description,
            )
            .await?;

            if outcome.changed() {
                events.push(BusEvent::ConflictWarning {
                    file: file_path.clone(),
                    branches: file_signals.branches.clone(),
                    severity,
                });
            }
        }

        let resolved =
            blockers::resolve_stale_blockers(&mut tx, workspace_id, window_hours).await?;

        tx.commit().await?;

        if !signals.is_empty() || resolved > 0 {
            info!(
                %workspace_id,
                trigger_branch,
                conflicts = signals.len(),
                resolved,
                "conflict engine committed"
            );
        } else {
            debug!(%workspace_id, trigger_branch, "conflict engine found no overlaps");
        }

        Ok(events)
    }
}

async fn load_window_hours(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
) -> Result<Option<i32>> {
    let row = sqlx::query(
        r#"SELECT activity_window_hours FROM workspaces WHERE id = $1"#,
    )
    .bind(workspace_id.to_uuid())
    .fetch_optional(conn)
    .await?;

    Ok(row
        .map(|r| r.try_get::<i32, _>("activity_window_hours"))
        .transpose()?)
}

/// Files touched by ≥2 distinct non-trunk branches inside the window,
/// plus an auxiliary trunk-touch check on the same files. Trunk rows are
/// excluded from the grouping so trunk churn alone never reads as overlap,
/// but trunk presence on an overlapping file escalates it.
async fn branch_overlaps(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    window_hours: i32,
) -> Result<HashMap<String, FileSignals>> {
    let trunk: Vec<String> = TRUNK_BRANCHES.iter().map(|b| b.to_string()).collect();

    let rows = sqlx::query(
        r#"
        SELECT fa.file_path,
               ARRAY_AGG(DISTINCT fa.branch) AS branches
        FROM file_activity fa
        WHERE fa.workspace_id = $1
          AND fa.branch <> ALL($2)
          AND fa.updated_at > now() - ($3 * INTERVAL '1 hour')
        GROUP BY fa.file_path
        HAVING COUNT(DISTINCT fa.branch) >= 2
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(&trunk)
    .bind(window_hours)
    .fetch_all(&mut *conn)
    .await?;

    let mut signals: HashMap<String, FileSignals> = HashMap::new();
    for row in rows {
        let file_path: String = row.try_get("file_path")?;
        let branches: Vec<String> = row.try_get("branches")?;
        signals.insert(
            file_path,
            FileSignals {
                branches,
                ..FileSignals::default()
            },
        );
    }

    if signals.is_empty() {
        return Ok(signals);
    }

    let overlap_files: Vec<String> = signals.keys().cloned().collect();
    let trunk_rows = sqlx::query(
        r#"
        SELECT DISTINCT fa.file_path
        FROM file_activity fa
        WHERE fa.workspace_id = $1
          AND fa.branch = ANY($2)
          AND fa.updated_at > now() - ($3 * INTERVAL '1 hour')
          AND fa.file_path = ANY($4)
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(&trunk)
    .bind(window_hours)
    .bind(&overlap_files)
    .fetch_all(conn)
    .await?;

    for row in trunk_rows {
        let file_path: String = row.try_get("file_path")?;
        if let Some(entry) = signals.get_mut(&file_path) {
            entry.touches_main = true;
        }
    }

    Ok(signals)
}

/// Files listed in ≥2 open pull requests, merged into the signal map.
async fn merge_pr_overlaps(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    signals: &mut HashMap<String, FileSignals>,
) -> Result<()> {
    let rows = sqlx::query(
        r#"
        SELECT pf.file_path,
               ARRAY_AGG(DISTINCT pr.pr_number) AS pr_numbers
        FROM pr_files pf
        JOIN pull_requests pr ON pr.id = pf.pull_request_id
        WHERE pr.workspace_id = $1
          AND pr.status = $2
        GROUP BY pf.file_path
        HAVING COUNT(DISTINCT pr.id) >= 2
        "#,
    )
    .bind(workspace_id.to_uuid())
    .bind(PullRequestStatus::Open.as_str())
    .fetch_all(conn)
    .await?;

    for row in rows {
        let file_path: String = row.try_get("file_path")?;
        let pr_numbers: Vec<i32> = row.try_get("pr_numbers")?;
        signals.entry(file_path).or_default().pr_numbers = pr_numbers;
    }

    Ok(())
}

fn describe(file_path: &str, signals: &FileSignals) -> String {
    let mut parts = Vec::new();
    if signals.branches.len() >= 2 {
        parts.push(format!(
            "{} branches ({})",
            signals.branches.len(),
            signals.branches.join(", ")
        ));
    }
    if !signals.pr_numbers.is_empty() {
        let numbers: Vec<String> =
            signals.pr_numbers.iter().map(|n| format!("#{n}")).collect();
        parts.push(format!("open PRs {}", numbers.join(", ")));
    }
    if signals.touches_main {
        parts.push("overlaps trunk".to_string());
    }
    format!("{file_path} is being modified on {}", parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Result;
    use sqlx::PgPool;

    use pulse_model::Severity;

    use crate::events::{MockEventSink, NullSink};
    use crate::testing;

    #[test]
    fn description_names_branches_and_prs() {
        let signals = FileSignals {
            branches: vec!["feat-1".into(), "feat-2".into()],
            touches_main: true,
            pr_numbers: vec![10, 11],
        };

        let text = describe("src/core.ts", &signals);
        assert!(text.contains("src/core.ts"));
        assert!(text.contains("feat-1, feat-2"));
        assert!(text.contains("#10, #11"));
        assert!(text.contains("trunk"));
    }

    fn engine(pool: &PgPool, sink: Arc<dyn EventSink>) -> ConflictEngine {
        ConflictEngine::new(Database::from_pool(pool.clone()), sink, 72)
    }

    fn files(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn three_branch_overlap_raises_high_and_broadcasts(pool: PgPool) -> Result<()> {
        let workspace_id = testing::seed_workspace(&pool).await?;
        for branch in ["feat-1", "feat-2", "feat-3"] {
            testing::touch_file(&pool, workspace_id, branch, "a.js").await?;
        }

        let mut sink = MockEventSink::new();
        sink.expect_publish()
            .withf(move |ws, event| {
                *ws == workspace_id
                    && matches!(
                        event,
                        BusEvent::ConflictWarning {
                            file,
                            severity: Severity::High,
                            ..
                        } if file == "a.js"
                    )
            })
            .times(1)
            .return_const(());

        engine(&pool, Arc::new(sink))
            .run(workspace_id, &files(&["a.js"]), "feat-3")
            .await;

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
    async fn pr_overlap_alone_escalates_to_high(pool: PgPool) -> Result<()> {
        let workspace_id = testing::seed_workspace(&pool).await?;
        testing::seed_open_pr(&pool, workspace_id, 10, &["core.ts"]).await?;
        testing::seed_open_pr(&pool, workspace_id, 11, &["core.ts"]).await?;
        testing::touch_file(&pool, workspace_id, "feat-1", "core.ts").await?;

        let mut sink = MockEventSink::new();
        sink.expect_publish()
            .withf(|_, event| {
                matches!(
                    event,
                    BusEvent::ConflictWarning {
                        file,
                        severity: Severity::High,
                        ..
                    } if file == "core.ts"
                )
            })
            .times(1)
            .return_const(());

        engine(&pool, Arc::new(sink))
            .run(workspace_id, &files(&["core.ts"]), "feat-1")
            .await;

        let unresolved = testing::unresolved_blockers(&pool, workspace_id).await?;
        assert_eq!(unresolved[0].2, "HIGH");
        Ok(())
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn rerun_with_unchanged_state_is_silent(pool: PgPool) -> Result<()> {
        let workspace_id = testing::seed_workspace(&pool).await?;
        testing::touch_file(&pool, workspace_id, "feat-1", "a.js").await?;
        testing::touch_file(&pool, workspace_id, "feat-2", "a.js").await?;

        // First pass persists the blocker; the fan-out is not under test.
        engine(&pool, Arc::new(NullSink))
            .run(workspace_id, &files(&["a.js"]), "feat-2")
            .await;

        let before = testing::unresolved_blockers(&pool, workspace_id).await?;
        assert_eq!(before.len(), 1);

        // No expectations registered: any publish on the rerun panics.
        let sink = MockEventSink::new();
        engine(&pool, Arc::new(sink))
            .run(workspace_id, &files(&["a.js"]), "feat-2")
            .await;

        let after = testing::unresolved_blockers(&pool, workspace_id).await?;
        assert_eq!(after, before);
        Ok(())
    }
}
