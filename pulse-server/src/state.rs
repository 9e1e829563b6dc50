use std::{fmt, sync::Arc};

use pulse_core::alignment::{AlignmentSettings, HttpAlignmentAnalyzer};
use pulse_core::conflict::ConflictEngine;
use pulse_core::database::Database;
use pulse_core::feature::FeatureEngine;
use pulse_core::health::HealthEngine;
use pulse_core::ratelimit::SlidingWindowLimiter;

use crate::config::Config;
use crate::dispatch::{AlignmentPass, EngineDispatcher};
use crate::ws::SubscriberRegistry;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub registry: Arc<SubscriberRegistry>,
    pub dispatcher: Arc<EngineDispatcher>,
    pub webhook_limiter: Arc<SlidingWindowLimiter>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Wire the engines, event bus, and dispatcher over an established
    /// database handle.
    pub fn build(config: Arc<Config>, db: Database) -> anyhow::Result<Self> {
        let registry = Arc::new(SubscriberRegistry::new());

        let window = config.default_activity_window_hours;
        let health = Arc::new(HealthEngine::new(db.clone(), registry.clone(), window));
        let feature = FeatureEngine::new(db.clone(), registry.clone(), health);
        let conflict = ConflictEngine::new(db.clone(), registry.clone(), window);

        let alignment = match &config.alignment_endpoint {
            Some(endpoint) => {
                let analyzer = HttpAlignmentAnalyzer::new(AlignmentSettings {
                    endpoint: endpoint.clone(),
                    model: config.alignment_model.clone(),
                    timeout: config.alignment_timeout,
                    max_retries: config.alignment_max_retries,
                    retry_delay: config.alignment_retry_delay,
                })?;
                Some(AlignmentPass::new(
                    db.clone(),
                    Arc::new(analyzer),
                    SlidingWindowLimiter::new(
                        config.alignment_rate_limit_max,
                        config.alignment_rate_limit_window,
                    ),
                ))
            }
            None => None,
        };

        let dispatcher = Arc::new(EngineDispatcher::new(conflict, feature, alignment));
        let webhook_limiter = Arc::new(SlidingWindowLimiter::new(
            config.webhook_rate_limit_max,
            config.webhook_rate_limit_window,
        ));

        Ok(Self {
            db,
            config,
            registry,
            dispatcher,
            webhook_limiter,
        })
    }
}
