//! CLI command: `vidnotes models`
//!
//! Shows which catalog entries a prompt of a given size would be routed to,
//! in selection order.

use crate::config::AppConfig;
use anyhow::{Context, Result};
use vidnotes_llm::{ModelCatalog, RequiredCapability};

/// Run the models subcommand.
pub async fn run(
    config: AppConfig,
    tokens: usize,
    capability: Option<RequiredCapability>,
) -> Result<()> {
    let catalog = ModelCatalog::new(config.models).context("Invalid model catalog")?;
    let candidates = catalog.candidates(tokens, capability);

    println!();
    println!(
        "  Candidates for ~{} prompt tokens (capability: {})",
        tokens,
        capability.map_or("any".to_string(), |c| format!("{c:?}").to_lowercase())
    );
    println!("  {}", "-".repeat(72));
    println!(
        "  {:<4} {:<28} {:<10} {:>12} {:>12}",
        "#", "Model", "Tier", "Budget", "$/1M tok"
    );
    println!("  {}", "-".repeat(72));

    if candidates.is_empty() {
        let fallback = catalog.available(capability);
        if fallback.is_empty() {
            println!("  (no model matches the capability)");
        } else {
            println!("  (prompt too large for every model; it would be truncated)");
        }
    }

    for (i, model) in candidates.iter().enumerate() {
        println!(
            "  {:<4} {:<28} {:<10} {:>12} {:>12.4}",
            i + 1,
            model.name,
            format!("{:?}", model.capability_tier).to_lowercase(),
            model.input_token_budget(),
            model.cost_per_token * 1_000_000.0
        );
    }
    println!();
    Ok(())
}
