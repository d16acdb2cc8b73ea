use parley_agent::{ChatCompletionsClient, CommandValidator};
use parley_core::config::{AppConfig, LoadOptions};
use parley_db::connect;
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_CONFIG};

const REQUIRED_TABLES: &[&str] =
    &["conversation_message", "collection_catalog", "collection_document"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
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

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_CONFIG };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_completion_client(&config));
            checks.push(check_collection_policy(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in
                ["completion_client", "collection_policy", "database_connectivity", "schema"]
            {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_completion_client(config: &AppConfig) -> DoctorCheck {
    match ChatCompletionsClient::from_config(&config.llm) {
        Ok(client) => DoctorCheck::pass(
            "completion_client",
            format!(
                "{:?} endpoint `{}` (model `{}`, translator `{}`)",
                config.llm.provider,
                client.endpoint(),
                config.llm.model,
                config.llm.effective_translator_model()
            ),
        ),
        Err(error) => DoctorCheck::fail("completion_client", error.to_string()),
    }
}

fn check_collection_policy(config: &AppConfig) -> DoctorCheck {
    match CommandValidator::new(&config.router) {
        Ok(_) => DoctorCheck::pass(
            "collection_policy",
            format!(
                "pattern `{}`, protected [{}]",
                config.router.collection_pattern,
                config.router.protected_collections.join(", ")
            ),
        ),
        Err(error) => DoctorCheck::fail(
            "collection_policy",
            format!("router.collection_pattern is not a valid regex: {error}"),
        ),
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::skipped("schema", "the database was not reachable"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::skipped("schema", "the database was not reachable"),
                ];
            }
        };

        let mut missing = Vec::new();
        let mut query_error = None;
        for table in REQUIRED_TABLES {
            let found = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(*table)
            .fetch_one(&pool)
            .await;
            match found {
                Ok(count) if count > 0 => {}
                Ok(_) => missing.push(*table),
                Err(error) => {
                    query_error = Some(error);
                    break;
                }
            }
        }
        pool.close().await;

        let schema = match (query_error, missing.is_empty()) {
            (Some(error), _) => {
                DoctorCheck::fail("schema", format!("schema query failed: {error}"))
            }
            (None, true) => DoctorCheck::pass("schema", "all migrations applied"),
            (None, false) => DoctorCheck::fail(
                "schema",
                format!("missing tables: {} (run `parley migrate`)", missing.join(", ")),
            ),
        };

        vec![
            DoctorCheck::pass(
                "database_connectivity",
                format!("connected using `{}`", config.database.url),
            ),
            schema,
        ]
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
