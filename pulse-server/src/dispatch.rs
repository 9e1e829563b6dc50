//! Post-ACK engine dispatch.
//!
//! One bounded queue and one worker per workspace: a workspace's engine
//! runs never interleave with each other, while distinct workspaces proceed
//! in parallel. The queue is drop-on-full; a dropped job costs nothing but
//! latency because the next delivery reprocesses the same durable state.

use std::sync::Arc;

use dashmap::DashMap;
use sqlx::Row;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use pulse_core::alignment::{AlignmentAnalyzer, AlignmentRequest};
use pulse_core::conflict::ConflictEngine;
use pulse_core::database::Database;
use pulse_core::feature::FeatureEngine;
use pulse_core::ratelimit::SlidingWindowLimiter;
use pulse_core::{Result, blockers};
use pulse_model::{FeatureStatus, Severity, WorkspaceId};

const QUEUE_DEPTH: usize = 64;

/// Work scheduled for a workspace after its push was acknowledged.
#[derive(Debug, Clone)]
pub struct EngineJob {
    pub branch: String,
    pub commit_hash: String,
    pub modified_files: Vec<String>,
}

struct EngineChain {
    conflict: ConflictEngine,
    feature: FeatureEngine,
    alignment: Option<AlignmentPass>,
}

impl EngineChain {
    async fn run(&self, workspace_id: WorkspaceId, job: EngineJob) {
        self.conflict
            .run(workspace_id, &job.modified_files, &job.branch)
            .await;
        self.feature
            .run(workspace_id, &job.modified_files, &job.commit_hash)
            .await;

        if let Some(alignment) = &self.alignment {
            alignment.run(workspace_id, &job).await;
        }
    }
}

pub struct EngineDispatcher {
    chain: Arc<EngineChain>,
    queues: DashMap<WorkspaceId, mpsc::Sender<EngineJob>>,
}

impl std::fmt::Debug for EngineDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineDispatcher")
            .field("active_workspaces", &self.queues.len())
            .finish_non_exhaustive()
    }
}

impl EngineDispatcher {
    pub fn new(
        conflict: ConflictEngine,
        feature: FeatureEngine,
        alignment: Option<AlignmentPass>,
    ) -> Self {
        Self {
            chain: Arc::new(EngineChain {
                conflict,
                feature,
                alignment,
            }),
            queues: DashMap::new(),
        }
    }

    /// Queue an engine chain run for the workspace. Fire-and-forget: the
    /// webhook response must never wait on this.
    pub fn dispatch(&self, workspace_id: WorkspaceId, job: EngineJob) {
        let sender = self
            .queues
            .entry(workspace_id)
            .or_insert_with(|| self.spawn_worker(workspace_id))
            .clone();

        if let Err(e) = sender.try_send(job) {
            warn!(%workspace_id, error = %e, "engine queue rejected job");
        }
    }

    fn spawn_worker(&self, workspace_id: WorkspaceId) -> mpsc::Sender<EngineJob> {
        let (tx, mut rx) = mpsc::channel::<EngineJob>(QUEUE_DEPTH);
        let chain = Arc::clone(&self.chain);

        tokio::spawn(async move {
            info!(%workspace_id, "engine worker started");
            while let Some(job) = rx.recv().await {
                chain.run(workspace_id, job).await;
            }
        });

        tx
    }
}

/// Optional post-engine pass calling the LM alignment analyzer, gated by a
/// per-workspace rate limit so a busy repository cannot exhaust the
/// upstream quota.
pub struct AlignmentPass {
    db: Database,
    analyzer: Arc<dyn AlignmentAnalyzer>,
    limiter: SlidingWindowLimiter,
}

impl std::fmt::Debug for AlignmentPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignmentPass").finish_non_exhaustive()
    }
}

impl AlignmentPass {
    pub fn new(
        db: Database,
        analyzer: Arc<dyn AlignmentAnalyzer>,
        limiter: SlidingWindowLimiter,
    ) -> Self {
        Self {
            db,
            analyzer,
            limiter,
        }
    }

    pub async fn run(&self, workspace_id: WorkspaceId, job: &EngineJob) {
        if !self.limiter.allow(&workspace_id.to_string()) {
            debug!(%workspace_id, "alignment pass skipped by rate limit");
            return;
        }

        if let Err(e) = self.run_inner(workspace_id, job).await {
            error!(%workspace_id, error = %e, "alignment pass failed, rolled back");
        }
    }

    async fn run_inner(&self, workspace_id: WorkspaceId, job: &EngineJob) -> Result<()> {
        let feature_names = self.feature_names(workspace_id).await?;

        let verdict = self
            .analyzer
            .analyze(&AlignmentRequest {
                branch: job.branch.clone(),
                commit_hash: job.commit_hash.clone(),
                modified_files: job.modified_files.clone(),
                feature_names,
            })
            .await;

        let mut tx = self.db.pool().begin().await?;
        if verdict.drift {
            let description = if verdict.summary.is_empty() {
                format!("work on {} drifts from the stated feature goals", job.branch)
            } else {
                verdict.summary.clone()
            };
            blockers::upsert_alignment_blocker(
                &mut tx,
                workspace_id,
                &job.branch,
                Severity::Medium,
                &description,
            )
            .await?;
        } else {
            blockers::resolve_alignment_blocker(&mut tx, workspace_id, &job.branch).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn feature_names(&self, workspace_id: WorkspaceId) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT name FROM features
            WHERE workspace_id = $1
              AND status <> $2
            ORDER BY name
            "#,
        )
        .bind(workspace_id.to_uuid())
        .bind(FeatureStatus::Complete.as_str())
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter()
            .map(|row| Ok(row.try_get::<String, _>("name")?))
            .collect()
    }
}
