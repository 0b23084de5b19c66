//! CLI command: `vidnotes generate`

use crate::app::App;
use crate::config::AppConfig;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use vidnotes_llm::{InvocationRequest, Message, RequiredCapability};

/// Arguments for `generate`
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Domain whose defaults and usage budget apply
    #[arg(long, default_value = "notes")]
    pub domain: String,
    /// Prompt text (reads stdin when neither --prompt nor --file is given)
    #[arg(long, conflicts_with = "file")]
    pub prompt: Option<String>,
    /// Read the prompt from a file
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// System instruction
    #[arg(long)]
    pub system: Option<String>,
    /// Override the domain's required capability (low, medium, high)
    #[arg(long)]
    pub capability: Option<RequiredCapability>,
    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,
    /// Output token cap
    #[arg(long)]
    pub max_output_tokens: Option<u32>,
    /// Request deadline in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
    /// Print orchestrator status afterwards
    #[arg(long)]
    pub status: bool,
}

async fn read_prompt(args: &GenerateArgs) -> Result<String> {
    if let Some(prompt) = &args.prompt {
        return Ok(prompt.clone());
    }
    if let Some(path) = &args.file {
        return tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt file {}", path.display()));
    }
    let mut buf = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buf)
        .await
        .context("Failed to read prompt from stdin")?;
    Ok(buf)
}

fn build_request(config: &AppConfig, args: &GenerateArgs, prompt: String) -> InvocationRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &args.system {
        messages.push(Message::system(system.clone()));
    }
    messages.push(Message::user(prompt));

    let mut request =
        InvocationRequest::for_domain(args.domain.clone(), &config.domain(&args.domain), messages);
    if let Some(capability) = args.capability {
        request = request.with_required_capability(capability);
    }
    if let Some(temperature) = args.temperature {
        request = request.with_temperature(temperature);
    }
    if let Some(max) = args.max_output_tokens {
        request = request.with_max_output_tokens(max);
    }
    if let Some(secs) = args.timeout_secs {
        request = request.with_timeout(Duration::from_secs(secs));
    }
    request
}

/// Run the generate subcommand.
pub async fn run(config: AppConfig, args: &GenerateArgs) -> Result<()> {
    let prompt = read_prompt(args).await?;
    if prompt.trim().is_empty() {
        anyhow::bail!("Prompt is empty");
    }

    let request = build_request(&config, args, prompt);
    let app = App::start(config)?;
    let result = app.orchestrator.generate(request).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if let Some(content) = &result.content {
        println!("{content}");
    }

    if args.status {
        let status = app.orchestrator.status().await;
        println!("{}", serde_json::to_string_pretty(&status)?);
    }

    app.shutdown().await?;

    match result.error {
        Some(err) => anyhow::bail!(
            "{} (HTTP {}; {})",
            err.user_message(),
            err.status_code(),
            err
        ),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: GenerateArgs,
    }

    fn config() -> AppConfig {
        ::config::Config::builder()
            .add_source(::config::File::from_str(
                crate::config::DEFAULT_CONFIG,
                ::config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_domain_defaults_then_overrides() {
        let w = Wrapper::parse_from(["x", "--domain", "charts", "--temperature", "0.9"]);
        let req = build_request(&config(), &w.args, "plot this".to_string());
        assert_eq!(req.domain, "charts");
        assert_eq!(req.required_capability, Some(RequiredCapability::Medium));
        assert_eq!(req.temperature, Some(0.9));
        assert_eq!(req.max_output_tokens, Some(4096));
    }

    #[test]
    fn test_system_message_first() {
        let w = Wrapper::parse_from(["x", "--system", "Be concise", "--timeout-secs", "5"]);
        let req = build_request(&config(), &w.args, "hi".to_string());
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0], Message::system("Be concise"));
        assert_eq!(req.timeout, Some(Duration::from_secs(5)));
    }
}
