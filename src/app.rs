//! Shared application state.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigStore;
use crate::display::Display;
use crate::photos::PhotoStore;
use crate::scheduler::{self, SchedulerHandle};
use crate::settings::Settings;
use crate::Error;

/// Everything request handlers need, cheap to clone.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Arc<ConfigStore>,
    pub photos: Arc<PhotoStore>,
    pub scheduler: SchedulerHandle,
}

impl AppContext {
    /// Open the stores under `settings.data_dir` and spawn the scheduler.
    ///
    /// Must be called inside a tokio runtime. The returned task finishes
    /// after `cancel` fires.
    pub fn start(
        settings: &Settings,
        display: Arc<dyn Display>,
        cancel: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>), Error> {
        let photos = Arc::new(PhotoStore::open(&settings.data_dir)?);
        let config = Arc::new(ConfigStore::open(settings.config_path()));
        tracing::info!(
            data_dir = %settings.data_dir.display(),
            "Loaded config: cycling {}, interval {}s",
            if config.snapshot().cycle_enabled { "on" } else { "off" },
            config.snapshot().cycle_interval
        );

        let (scheduler, task) = scheduler::spawn(
            Arc::clone(&config),
            Arc::clone(&photos),
            display,
            cancel,
        );
        Ok((
            Self {
                config,
                photos,
                scheduler,
            },
            task,
        ))
    }
}
