//! CLI command: `vidnotes status`
//!
//! Displays credential cooldowns, model cooldowns and per-domain usage.

use crate::app::App;
use crate::config::AppConfig;
use anyhow::Result;
use vidnotes_llm::OrchestratorStatus;

/// Run the status subcommand.
pub async fn run(config: AppConfig, json: bool) -> Result<()> {
    let app = App::start(config)?;
    let status = app.orchestrator.status().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_table(&app, &status);
    }

    app.shutdown().await
}

fn format_cooldown(ms: Option<u64>) -> String {
    match ms {
        None => "ready".to_string(),
        Some(ms) if ms >= 60_000 => format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000),
        Some(ms) => format!("{:.1}s", ms as f64 / 1000.0),
    }
}

fn print_table(app: &App, status: &OrchestratorStatus) {
    println!();
    println!(
        "  Provider: {}   Credentials: {}/{} available   Max attempts: {}",
        status.provider,
        status.available_credentials,
        status.total_credentials,
        status.max_attempts
    );

    println!();
    println!("  {:<16} {:<16} {:<12} Failures", "Credential", "Key", "Cooldown");
    println!("  {}", "-".repeat(60));
    for c in &status.credentials {
        let marker = if status.last_used_credential.as_deref() == Some(c.id.as_str()) {
            " *"
        } else {
            ""
        };
        println!(
            "  {:<16} {:<16} {:<12} {}{}",
            c.id,
            c.key,
            format_cooldown(c.cooldown_remaining_ms),
            c.consecutive_failures,
            marker
        );
    }

    println!();
    println!("  {:<28} {:<10} {:<10} Cooldown", "Model", "Priority", "Tier");
    println!("  {}", "-".repeat(60));
    for m in &status.models {
        println!(
            "  {:<28} {:<10} {:<10} {}",
            m.name,
            m.priority,
            format!("{:?}", m.capability_tier).to_lowercase(),
            format_cooldown(m.cooldown_remaining_ms)
        );
    }

    println!();
    println!("  {:<16} {:>14} {:>14} {:>8}", "Domain", "Used", "Limit", "%");
    println!("  {}", "-".repeat(60));
    for (name, domain) in &app.config.domains {
        let usage = status.token_usage.iter().find(|u| &u.domain == name);
        let limit = domain
            .daily_token_limit
            .unwrap_or(app.config.usage.default_daily_limit);
        let used = usage.map_or(0, |u| u.used_today);
        let pct = usage.map_or(0.0, |u| u.usage_pct);
        let warn = if pct >= 90.0 { " !!" } else { "" };
        println!("  {:<16} {:>14} {:>14} {:>7.1}%{}", name, used, limit, pct, warn);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cooldown() {
        assert_eq!(format_cooldown(None), "ready");
        assert_eq!(format_cooldown(Some(4_500)), "4.5s");
        assert_eq!(format_cooldown(Some(125_000)), "2m 5s");
    }
}
