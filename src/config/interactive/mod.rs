#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::{Config, LlmConfig, LlmProvider, api_key_from_env};
use crate::llm::build_model;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 uni-scout Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Language Model").bold().yellow());
    eprintln!("Choose the provider used for extraction, embeddings and chat.");
    eprintln!();

    configure_llm(&mut config.llm)?;

    eprintln!();
    eprintln!("{}", style("REST Server").bold().yellow());
    let port: u16 = Input::new()
        .with_prompt("Server port")
        .default(config.server.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    config.server.set_port(port)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_llm_connection(&config.llm) {
        eprintln!("{}", style("✓ Provider connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the language model provider").yellow()
        );
        eprintln!("You can continue, but processing and chat will fail until it is reachable.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Language Model:").bold().yellow());
    eprintln!("  Provider: {}", style(config.llm.provider).cyan());
    eprintln!("  Base URL: {}", style(&config.llm.base_url).cyan());
    eprintln!("  Chat Model: {}", style(&config.llm.chat_model).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.llm.embedding_model).cyan()
    );
    eprintln!(
        "  Embedding Dimension: {}",
        style(config.llm.embedding_dimension).cyan()
    );
    eprintln!("  Batch Size: {}", style(config.llm.batch_size).cyan());
    eprintln!(
        "  API Key: {}",
        style(mask_secret(config.llm.api_key.as_deref())).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Server:").bold().yellow());
    eprintln!("  Bind: {}", style(config.server.bind_addr()).cyan());
    eprintln!(
        "  Allowed Origins: {}",
        style(config.server.allowed_origins.join(", ")).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Ingestion:").bold().yellow());
    eprintln!("  Raw Directory: {}", style(config.raw_dir().display()).cyan());
    eprintln!(
        "  Extensions: {}",
        style(config.ingest.extensions.join(", ")).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Search:").bold().yellow());
    eprintln!(
        "  Default/Max Limit: {}/{}",
        style(config.search.default_limit).cyan(),
        style(config.search.max_limit).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Crawler:").bold().yellow());
    eprintln!("  User Agent: {}", style(&config.crawler.user_agent).cyan());
    eprintln!(
        "  Timeout: {}s, Delay: {}ms, Attempts: {}",
        style(config.crawler.timeout_secs).cyan(),
        style(config.crawler.politeness_delay_ms).cyan(),
        style(config.crawler.retry_attempts).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

/// The file's own contents. Environment overrides are left out so saving
/// never copies them into `config.toml`.
fn load_existing_config(config_dir: &Path) -> Config {
    Config::load_file(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No usable configuration found. Using defaults.").yellow()
            );
            Config::with_base_dir(config_dir)
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_llm(llm: &mut LlmConfig) -> Result<()> {
    let providers = [LlmProvider::Gemini, LlmProvider::Ollama];
    let default_index = providers
        .iter()
        .position(|&p| p == llm.provider)
        .unwrap_or(0);

    let provider_index = Select::new()
        .with_prompt("Provider")
        .default(default_index)
        .items(&providers)
        .interact()?;

    let provider = providers[provider_index];
    if provider != llm.provider {
        let api_key = llm.api_key.take();
        *llm = LlmConfig {
            api_key,
            ..LlmConfig::for_provider(provider)
        };
    }

    let base_url: String = Input::new()
        .with_prompt("Base URL")
        .default(llm.base_url.clone())
        .validate_with(|input: &String| -> Result<(), String> {
            let temp = LlmConfig {
                base_url: input.clone(),
                ..LlmConfig::for_provider(provider)
            };
            temp.base_url().map(|_| ()).map_err(|e| e.to_string())
        })
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(llm.chat_model.clone())
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(llm.embedding_model.clone())
        .interact_text()?;

    let embedding_dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(llm.embedding_dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(llm.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    llm.set_base_url(base_url)?;
    llm.set_chat_model(chat_model)?;
    llm.set_embedding_model(embedding_model)?;
    llm.set_embedding_dimension(embedding_dimension)?;
    llm.set_batch_size(batch_size)?;

    Ok(())
}

fn test_llm_connection(llm: &LlmConfig) -> bool {
    let quick = LlmConfig {
        timeout_secs: 5,
        retry_attempts: 1,
        api_key: api_key_from_env(),
        ..llm.clone()
    };
    build_model(&quick)
        .and_then(|model| model.health_check())
        .is_ok()
}

/// Show only the last four characters of a secret
fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        None => "(not set)".to_string(),
        Some(s) if s.chars().count() <= 4 => "****".to_string(),
        Some(s) => {
            let tail: String = s
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("****{tail}")
        }
    }
}
