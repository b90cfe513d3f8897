use std::sync::Arc;

use crate::config::Config;
use crate::hub::NotificationHub;
use crate::jobs::JobRegistry;
use crate::observability::Metrics;
use crate::relay::{Relay, RelayError};
use crate::resolver::Resolver;
use crate::service::JobService;
use crate::transcode::Transcoder;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<JobService>,
    pub hub: Arc<NotificationHub>,
    pub metrics: Arc<Metrics>,
    pub relay: Arc<Relay>,
}

impl AppState {
    pub fn new(
        config: Config,
        resolver: Arc<dyn Resolver>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Result<Self, RelayError> {
        let relay = Relay::new(&config.relay, &config.resolver.user_agent)?;
        let config = Arc::new(config);
        let metrics = Arc::new(Metrics::new());
        let hub = Arc::new(NotificationHub::new(Arc::clone(&metrics)));
        let service = JobService::new(
            Arc::clone(&config),
            Arc::new(JobRegistry::new()),
            Arc::clone(&hub),
            resolver,
            transcoder,
            Arc::clone(&metrics),
        );

        Ok(Self {
            config,
            service: Arc::new(service),
            hub,
            metrics,
            relay: Arc::new(relay),
        })
    }
}
