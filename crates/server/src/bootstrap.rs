use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use leadflow_agent::llm::LlmClient;
use leadflow_core::config::{AppConfig, ConfigError, LoadOptions};
use leadflow_db::repositories::{SqlLeadRepository, SqlTranscriptRepository};
use leadflow_db::{connect_with_settings, migrations, DbPool};
use leadflow_engine::{CrmClient, ReconcileEngine};

use crate::llm_http::HttpLlmClient;
use crate::routes::AppState;
use crate::salesforce::SalesforceClient;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let leads = Arc::new(SqlLeadRepository::new(db_pool.clone()));
    let transcripts = Arc::new(SqlTranscriptRepository::new(db_pool.clone()));

    let llm: Arc<dyn LlmClient> =
        Arc::new(HttpLlmClient::new(&config.llm).map_err(BootstrapError::HttpClient)?);
    let crm: Arc<dyn CrmClient> =
        Arc::new(SalesforceClient::new(&config.crm).map_err(BootstrapError::HttpClient)?);

    let engine = Arc::new(ReconcileEngine::new(
        leads.clone(),
        transcripts.clone(),
        llm.clone(),
        crm,
        config.sweep,
    ));

    let state = AppState { engine, llm, transcripts };

    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use leadflow_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                crm_base_url: Some("https://crm.example.com".to_string()),
                crm_access_token: Some("token-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_crm_credentials() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                crm_base_url: Some("https://crm.example.com".to_string()),
                crm_access_token: Some("   ".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("crm.access_token"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_on_a_fresh_database() {
        let app = bootstrap(valid_overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('transcripts', 'lead_records')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected schema tables to be available after bootstrap");
        assert_eq!(table_count, 2, "bootstrap should expose the lead-path tables");

        app.db_pool.close().await;
    }
}
