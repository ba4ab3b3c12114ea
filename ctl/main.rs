#![forbid(unsafe_code)]

//! `teleport-autoreviewer-ctl`: operator companion for `teleport-autoreviewer`.
//!
//! Validates configuration, dry-runs the rejection rules against a made-up
//! request, and probes the health endpoint of a running instance.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use teleport_autoreviewer::models::request::{AccessRequest, RequestState};
use teleport_autoreviewer::policy::compiler::RuleCompiler;
use teleport_autoreviewer::policy::evaluator::PolicyEvaluator;
use teleport_autoreviewer::{AppError, GlobalConfig, Result};

#[derive(Debug, Parser)]
#[command(
    name = "teleport-autoreviewer-ctl",
    about = "Operator CLI for teleport-autoreviewer",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration and list the compiled rules.
    Check {
        /// Path to the TOML configuration file.
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
    },

    /// Evaluate a hypothetical request against the configured rules.
    Evaluate {
        /// Path to the TOML configuration file.
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
        /// Requested role; repeat for several.
        #[arg(long = "role")]
        roles: Vec<String>,
        /// Justification text.
        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Query the health endpoint of a running instance.
    Health {
        /// Full URL of the health endpoint.
        #[arg(long, default_value = "http://127.0.0.1:8080/health")]
        url: String,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let outcome = match args.command {
        Command::Check { config } => check(&config),
        Command::Evaluate {
            config,
            roles,
            reason,
        } => evaluate(&config, roles, reason),
        Command::Health { url } => health(&url),
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn load_evaluator(path: &Path) -> Result<(GlobalConfig, PolicyEvaluator)> {
    let config = GlobalConfig::load_from_path(path)?;
    let rules = RuleCompiler::compile(&config.rejection.rules)?;
    Ok((config, PolicyEvaluator::new(rules)))
}

fn check(path: &Path) -> Result<ExitCode> {
    let (config, evaluator) = load_evaluator(path)?;

    println!("teleport: {}", config.teleport.addr);
    println!("identity: {}", config.teleport.identity.display());
    println!("rules: {}", evaluator.rules().len());
    for (index, rule) in evaluator.rules().iter().enumerate() {
        println!("  [{index}] {}", rule.name);
        if let Some(roles) = &rule.roles {
            println!("      roles:  {}", roles.as_str());
        }
        if let Some(reason) = &rule.reason {
            println!("      reason: {}", reason.as_str());
        }
        println!(
            "      message: {}",
            rule.message_or(&config.rejection.default_message)
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn evaluate(path: &Path, roles: Vec<String>, reason: String) -> Result<ExitCode> {
    let (config, evaluator) = load_evaluator(path)?;

    let request = AccessRequest {
        id: "dry-run".into(),
        user: "dry-run".into(),
        roles,
        reason,
        state: RequestState::Pending,
    };

    match evaluator.decide(&request) {
        Some(rule) => {
            println!("denied by rule '{}'", rule.name);
            println!(
                "message: {}",
                rule.message_or(&config.rejection.default_message)
            );
        }
        None => println!("no rule triggered"),
    }
    Ok(ExitCode::SUCCESS)
}

fn health(url: &str) -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Io(format!("failed to build runtime: {err}")))?;

    runtime.block_on(async {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|err| AppError::Health(format!("failed to build client: {err}")))?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|err| AppError::Health(format!("request to {url} failed: {err}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| AppError::Health(format!("failed to read body: {err}")))?;
        println!("{body}");

        if status == reqwest::StatusCode::OK {
            Ok(ExitCode::SUCCESS)
        } else {
            eprintln!("health endpoint returned {status}");
            Ok(ExitCode::FAILURE)
        }
    })
}
