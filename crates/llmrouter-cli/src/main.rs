//! Operator CLI for the LLM router gateway: query a running gateway's
//! health/admin surfaces, and validate or scaffold its configuration file
//! offline without starting the server.

use clap::{Arg, Command};
use colored::Colorize;
use llmrouter_client::GatewayClient;
use std::fs;
use std::process;

fn cli() -> Command {
    Command::new("llmrouter-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .author("LLM Router Gateway Contributors")
        .about("Operate and inspect an LLM router gateway")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("status").about("Check gateway liveness").arg(url_arg()),
        )
        .subcommand(
            Command::new("state")
                .about("Show per-model health and circuit state")
                .arg(url_arg())
                .arg(Arg::new("model").help("Restrict to one model name")),
        )
        .subcommand(
            Command::new("reset")
                .about("Reset a model's circuit breaker to CLOSED")
                .arg(url_arg())
                .arg(Arg::new("model").required(true)),
        )
        .subcommand(
            Command::new("metrics").about("View aggregate gateway metrics").arg(url_arg()),
        )
        .subcommand(
            Command::new("config")
                .about("Configuration management")
                .subcommand_required(true)
                .subcommand(
                    Command::new("validate")
                        .about("Validate a gateway config file")
                        .arg(
                            Arg::new("file")
                                .short('f')
                                .long("file")
                                .default_value("config.json"),
                        ),
                )
                .subcommand(
                    Command::new("generate")
                        .about("Write a sample gateway config")
                        .arg(
                            Arg::new("output")
                                .short('o')
                                .long("output")
                                .default_value("config.json"),
                        ),
                ),
        )
}

fn url_arg() -> Arg {
    Arg::new("url")
        .short('u')
        .long("url")
        .value_name("URL")
        .default_value("http://localhost:8080")
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();

    let result = match matches.subcommand() {
        Some(("status", sub)) => status(sub.get_one::<String>("url").unwrap()).await,
        Some(("state", sub)) => {
            state(sub.get_one::<String>("url").unwrap(), sub.get_one::<String>("model")).await
        }
        Some(("reset", sub)) => {
            reset(sub.get_one::<String>("url").unwrap(), sub.get_one::<String>("model").unwrap()).await
        }
        Some(("metrics", sub)) => metrics(sub.get_one::<String>("url").unwrap()).await,
        Some(("config", sub)) => match sub.subcommand() {
            Some(("validate", c)) => validate_config(c.get_one::<String>("file").unwrap()),
            Some(("generate", c)) => generate_config(c.get_one::<String>("output").unwrap()),
            _ => unreachable!(),
        },
        _ => unreachable!(),
    };

    if let Err(err) = result {
        eprintln!("{} {}", "error:".red().bold(), err);
        process::exit(1);
    }
}

async fn status(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = GatewayClient::new(url)?;
    let health = client.health().await?;
    println!("{} {} (version {})", "healthy".green().bold(), health.status, health.version);
    Ok(())
}

async fn state(url: &str, model: Option<&String>) -> Result<(), Box<dyn std::error::Error>> {
    let client = GatewayClient::new(url)?;
    if let Some(name) = model {
        let view = client.state_for(name).await?;
        print_state_row(&view);
    } else {
        for view in client.state().await? {
            print_state_row(&view);
        }
    }
    Ok(())
}

fn print_state_row(view: &llmrouter_client::ModelStateView) {
    let label = if view.available { view.circuit_state.clone() } else { "disabled".to_string() };
    println!(
        "{:<24} {:<10} {:<20} success_rate={:.2} p95={:.0}ms requests={}",
        view.name, view.provider, label, view.success_rate, view.p95_latency_ms, view.total_requests,
    );
}

async fn reset(url: &str, model: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = GatewayClient::new(url)?;
    client.reset_state(model).await?;
    println!("{} model '{}' reset to CLOSED", "ok".green().bold(), model);
    Ok(())
}

async fn metrics(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = GatewayClient::new(url)?;
    let m = client.metrics().await?;
    println!(
        "models_tracked={} total_requests={} total_errors={} in_flight={} fallbacks_used={}",
        m.models_tracked, m.total_requests, m.total_errors, m.in_flight, m.fallbacks_used
    );
    Ok(())
}

fn validate_config(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read_to_string(file)?;
    let config: llmrouter_core::config::settings::GatewayConfig = serde_json::from_str(&data)
        .map_err(|e| format!("invalid config JSON: {e}"))?;
    config.validate().map_err(|e| format!("config invalid: {e}"))?;
    println!("{} {} is valid", "ok".green().bold(), file);
    Ok(())
}

fn generate_config(output: &str) -> Result<(), Box<dyn std::error::Error>> {
    let sample = serde_json::json!({
        "version": 1,
        "providers": {
            "groq": { "enabled": true, "api_key": "", "base_url": null },
            "openai": { "enabled": false, "api_key": "", "base_url": null }
        },
        "routing": {
            "max_model_switches": 3,
            "max_same_model_retries": 2,
            "retry_delay_ms": 3000,
            "timeout_secs": 60,
            "fallback": { "enabled": false, "provider": null, "model": null }
        },
        "circuit_breaker": {
            "failure_threshold": 3,
            "cooldown_period_mins": 3,
            "success_threshold": 2,
            "stats_window_size_mins": 10
        },
        "model_overrides": [],
        "model_requests_per_minute": null,
        "state_store": { "type": "memory" }
    });
    fs::write(output, serde_json::to_string_pretty(&sample)?)?;
    println!("{} wrote sample config to {}", "ok".green().bold(), output);
    Ok(())
}
