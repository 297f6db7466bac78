use leadflow_core::config::{AppConfig, LoadOptions};
use leadflow_db::connect_with_settings;
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

impl CheckStatus {
    fn marker(self) -> &'static str {
        match self {
            Self::Pass => "ok",
            Self::Fail => "fail",
            Self::Skipped => "skip",
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let checks = run_checks();

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let report = DoctorReport {
        overall_status: if all_pass { CheckStatus::Pass } else { CheckStatus::Fail },
        summary: if all_pass {
            "doctor: all readiness checks passed".to_string()
        } else {
            "doctor: one or more readiness checks failed".to_string()
        },
        checks,
    };

    if json_output {
        serde_json::to_string_pretty(&report)
            .unwrap_or_else(|error| format!("doctor serialization failed: {error}"))
    } else {
        render_human(&report)
    }
}

fn run_checks() -> Vec<DoctorCheck> {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return vec![
                DoctorCheck::fail("config_validation", error.to_string()),
                DoctorCheck::skipped("crm_token_readiness"),
                DoctorCheck::skipped("database_connectivity"),
            ];
        }
    };

    vec![
        DoctorCheck::pass("config_validation", "configuration loaded and validated"),
        check_crm_token(&config),
        check_database(&config),
    ]
}

fn check_crm_token(config: &AppConfig) -> DoctorCheck {
    if config.crm.access_token.expose_secret().trim().is_empty() {
        DoctorCheck::fail("crm_token_readiness", "crm.access_token is blank")
    } else {
        DoctorCheck::pass("crm_token_readiness", "token present; server can authenticate")
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let name = "database_connectivity";
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::fail(name, format!("failed to initialize async runtime: {error}"))
        }
    };

    let probe = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;
        pool.close().await;
        Ok::<(), String>(())
    });

    match probe {
        Ok(()) => DoctorCheck::pass(name, format!("connected using `{}`", config.database.url)),
        Err(error) => DoctorCheck::fail(name, error),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];
    for check in &report.checks {
        lines.push(format!("- [{}] {}: {}", check.status.marker(), check.name, check.details));
    }
    lines.join("\n")
}
