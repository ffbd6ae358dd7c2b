pub mod config;
pub mod core_state;
pub mod db;
pub mod forms;
pub mod models;
pub mod reminder;
pub mod repository;
pub mod store;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::core_state::{CoreError, CoreState};
use crate::reminder::TracingAlertDisplay;
use crate::store::Store;

/// Install the global tracing subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}

/// Run the reminder service until interrupted: open the local database,
/// re-arm pending reminders and log alerts as they fire.
pub fn run() -> Result<(), CoreError> {
    init_tracing();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let settings_path = config::settings_path()?;
        let settings = Settings::load_from(&settings_path)?;
        let store = Store::open(&config::database_path()?, settings.migration_policy)?;
        let state = CoreState::start(settings, store, Arc::new(TracingAlertDisplay)).await?;

        let report = state.repository().check_consistency().await?;
        if !report.is_clean() {
            tracing::warn!(issues = report.issues.len(), "Database consistency issues found");
            for issue in &report.issues {
                tracing::warn!(
                    category = %issue.category,
                    medication_id = ?issue.medication_id,
                    "{}",
                    issue.description
                );
            }
        }

        tracing::info!(pending = state.pending_reminders(), "Waiting for reminders");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");
        state.save_settings(&settings_path)?;
        Ok::<(), CoreError>(())
    })
}
