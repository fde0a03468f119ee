use crate::commands::{CommandResult, ErrorClass};
use frontdesk_core::config::{AppConfig, LoadOptions};
use frontdesk_db::{connect, migrations};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                ErrorClass::ConfigValidation,
                format!("configuration issue: {error}"),
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                ErrorClass::RuntimeInit,
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    match runtime.block_on(apply(&config)) {
        Ok(message) => CommandResult::success("migrate", message),
        Err((class, message)) => CommandResult::failure("migrate", class, message),
    }
}

async fn apply(config: &AppConfig) -> Result<String, (ErrorClass, String)> {
    let pool = connect(&config.database)
        .await
        .map_err(|error| (ErrorClass::DbConnectivity, error.to_string()))?;

    migrations::run_pending(&pool)
        .await
        .map_err(|error| (ErrorClass::Migration, error.to_string()))?;

    pool.close().await;
    Ok(format!("database at `{}` is up to date", config.database.url))
}
