use crate::commands::CommandResult;
use crate::SweepKind;
use leadflow_core::config::{AppConfig, LoadOptions};

/// Triggers a reconciliation pass through a running server instead of
/// embedding LLM and CRM clients in the CLI. Cron jobs call this on a
/// schedule.
pub fn run(kind: SweepKind, server_url: Option<&str>) -> CommandResult {
    let command = "sweep";

    let base_url = match server_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => match AppConfig::load(LoadOptions::default()) {
            Ok(config) => {
                format!("http://{}:{}", config.server.bind_address, config.server.port)
            }
            Err(error) => {
                return CommandResult::failure(
                    command,
                    "config_validation",
                    format!("configuration issue: {error}"),
                    2,
                );
            }
        },
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let url = format!("{base_url}/sweeps/{}", kind.as_str());
        let response = reqwest::Client::new()
            .post(&url)
            .send()
            .await
            .map_err(|error| format!("request to `{url}` failed: {error}"))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!("server returned {status}: {body}"));
        }

        let report: serde_json::Value = serde_json::from_str(&body)
            .map_err(|error| format!("unreadable sweep report: {error}"))?;
        Ok(report)
    });

    match result {
        Ok(report) => CommandResult::success(
            command,
            format!(
                "{} sweep finished: scanned={} created={} merged={} updated={} skipped={} failed={}",
                kind.as_str(),
                report["scanned"],
                report["created"],
                report["merged"],
                report["updated"],
                report["skipped"],
                report["failed"],
            ),
        ),
        Err(message) => CommandResult::failure(command, "sweep_request", message, 4),
    }
}
