use leadflow_core::config::{AppConfig, LoadOptions};
use leadflow_db::{connect_with_settings, migrations};

use crate::commands::CommandResult;

struct MigrateFailure {
    error_class: &'static str,
    message: String,
    exit_code: u8,
}

pub fn run() -> CommandResult {
    match apply() {
        Ok(applied) => CommandResult::success("migrate", applied),
        Err(failure) => {
            CommandResult::failure("migrate", failure.error_class, failure.message, failure.exit_code)
        }
    }
}

fn apply() -> Result<String, MigrateFailure> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| MigrateFailure {
        error_class: "config_validation",
        message: format!("configuration issue: {error}"),
        exit_code: 2,
    })?;

    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            MigrateFailure {
                error_class: "runtime_init",
                message: format!("failed to initialize async runtime: {error}"),
                exit_code: 3,
            }
        })?;

    runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| MigrateFailure {
            error_class: "db_connectivity",
            message: error.to_string(),
            exit_code: 4,
        })?;

        migrations::run_pending(&pool).await.map_err(|error| MigrateFailure {
            error_class: "migration",
            message: error.to_string(),
            exit_code: 5,
        })?;

        pool.close().await;
        Ok("applied pending migrations".to_string())
    })
}
