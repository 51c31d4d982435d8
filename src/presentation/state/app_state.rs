use std::sync::Arc;

use crate::application::services::AudioIntakeService;

#[derive(Clone)]
pub struct AppState {
    pub intake_service: Arc<AudioIntakeService>,
}

impl AppState {
    pub fn new(intake_service: Arc<AudioIntakeService>) -> Self {
        Self { intake_service }
    }
}
