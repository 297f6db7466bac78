use std::env;
use std::fs;
use std::path::PathBuf;

use leadflow_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// Prints the effective configuration with per-field source attribution.
/// Secrets are redacted before they reach stdout.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file = detect_config_file();

    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let crm_token = if config.crm.access_token.expose_secret().trim().is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    };

    let fields: Vec<(&str, &str, String)> = vec![
        ("database.url", "LEADFLOW_DATABASE_URL", config.database.url.clone()),
        (
            "database.max_connections",
            "LEADFLOW_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            "LEADFLOW_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        ("llm.provider", "LEADFLOW_LLM_PROVIDER", format!("{:?}", config.llm.provider)),
        ("llm.model", "LEADFLOW_LLM_MODEL", config.llm.model.clone()),
        (
            "llm.base_url",
            "LEADFLOW_LLM_BASE_URL",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("llm.api_key", "LEADFLOW_LLM_API_KEY", llm_api_key.to_string()),
        ("crm.base_url", "LEADFLOW_CRM_BASE_URL", config.crm.base_url.clone()),
        ("crm.access_token", "LEADFLOW_CRM_ACCESS_TOKEN", crm_token.to_string()),
        ("crm.api_version", "LEADFLOW_CRM_API_VERSION", config.crm.api_version.clone()),
        ("server.bind_address", "LEADFLOW_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        ("server.port", "LEADFLOW_SERVER_PORT", config.server.port.to_string()),
        (
            "sweep.recency_window_hours",
            "LEADFLOW_SWEEP_RECENCY_WINDOW_HOURS",
            config.sweep.recency_window_hours.to_string(),
        ),
        (
            "sweep.max_creation_attempts",
            "LEADFLOW_SWEEP_MAX_CREATION_ATTEMPTS",
            config.sweep.max_creation_attempts.to_string(),
        ),
        (
            "sweep.max_update_attempts",
            "LEADFLOW_SWEEP_MAX_UPDATE_ATTEMPTS",
            config.sweep.max_update_attempts.to_string(),
        ),
        (
            "sweep.min_user_turns",
            "LEADFLOW_SWEEP_MIN_USER_TURNS",
            config.sweep.min_user_turns.to_string(),
        ),
        ("logging.level", "LEADFLOW_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "LEADFLOW_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, env_key, value) in fields {
        let source = field_source(key, env_key, file.as_ref());
        lines.push(format!("- {key} = {value} (source: {source})"));
    }

    lines.join("\n")
}

struct ConfigFile {
    path: PathBuf,
    doc: Value,
}

fn detect_config_file() -> Option<ConfigFile> {
    let path = [PathBuf::from("leadflow.toml"), PathBuf::from("config/leadflow.toml")]
        .into_iter()
        .find(|candidate| candidate.exists())?;

    let doc = fs::read_to_string(&path).ok()?.parse::<Value>().ok()?;
    Some(ConfigFile { path, doc })
}

fn field_source(key_path: &str, env_key: &str, file: Option<&ConfigFile>) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(file) = file {
        if contains_path(&file.doc, key_path) {
            return format!("file ({})", file.path.display());
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
