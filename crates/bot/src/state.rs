use std::sync::Arc;

use nem_push_domain::services::telemetry::TelemetryGuard;

use crate::service::BotService;

#[derive(Clone)]
pub struct AppState {
    service: Arc<BotService>,
    telemetry: TelemetryGuard,
}

impl AppState {
    pub fn new(service: Arc<BotService>, telemetry: TelemetryGuard) -> Self {
        Self { service, telemetry }
    }

    pub fn service(&self) -> &BotService {
        self.service.as_ref()
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }
}
