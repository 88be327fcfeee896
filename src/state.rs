use crate::config::settings::AppConfig;
use crate::infrastructure::storage::Storage;
use crate::modules::delivery::service::Dispatcher;
use crate::workers::resizer::ResizeWorker;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn Storage>,
    pub dispatcher: Arc<Dispatcher>,
    pub worker: Arc<ResizeWorker>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn Storage>,
        dispatcher: Arc<Dispatcher>,
        worker: Arc<ResizeWorker>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            dispatcher,
            worker,
        }
    }
}
