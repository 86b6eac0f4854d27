use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use crate::config::get_config_dir;
use crate::config::settings::Config;
use crate::embeddings::ProviderKind;
use crate::embeddings::ollama::OllamaProvider;

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("Corpus Search Configuration").bold().cyan());
    eprintln!();

    let config_dir = get_config_dir()?;
    let mut config = Config::load(&config_dir).unwrap_or_else(|_| {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
        Config {
            base_dir: config_dir.clone(),
            ..Config::default()
        }
    });

    eprintln!("{}", style("Embedding Provider").bold().yellow());
    let kinds = [
        ProviderKind::Ollama,
        ProviderKind::Openai,
        ProviderKind::Gemini,
        ProviderKind::Stub,
    ];
    let labels: Vec<String> = kinds.iter().map(|k| k.to_string()).collect();
    let current = kinds
        .iter()
        .position(|k| *k == config.embedding.provider)
        .unwrap_or(0);
    let selected = Select::new()
        .with_prompt("Primary embedding provider")
        .items(&labels)
        .default(current)
        .interact()?;
    config.embedding.provider = kinds[selected];

    match config.embedding.provider {
        ProviderKind::Ollama => configure_ollama(&mut config)?,
        ProviderKind::Openai => {
            let key: String = Input::new()
                .with_prompt("OpenAI API key")
                .allow_empty(true)
                .interact_text()?;
            if !key.is_empty() {
                config.providers.openai.api_key = Some(key);
            }
            config.providers.openai.model = Input::new()
                .with_prompt("Model")
                .default(config.providers.openai.model.clone())
                .interact_text()?;
        }
        ProviderKind::Gemini => {
            let key: String = Input::new()
                .with_prompt("Gemini API key")
                .allow_empty(true)
                .interact_text()?;
            if !key.is_empty() {
                config.providers.gemini.api_key = Some(key);
            }
            config.providers.gemini.model = Input::new()
                .with_prompt("Model")
                .default(config.providers.gemini.model.clone())
                .interact_text()?;
        }
        ProviderKind::Stub => {
            eprintln!(
                "{}",
                style("Deterministic stub selected; no credentials needed.").dim()
            );
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("Configuration saved.").green());
        eprintln!(
            "Configuration file: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

fn configure_ollama(config: &mut Config) -> Result<()> {
    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(config.providers.ollama.host.clone())
        .interact_text()?;
    config
        .providers
        .ollama
        .set_host(host)
        .context("Invalid host")?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(config.providers.ollama.port)
        .interact_text()?;
    config
        .providers
        .ollama
        .set_port(port)
        .context("Invalid port")?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(config.providers.ollama.model.clone())
        .interact_text()?;
    config
        .providers
        .ollama
        .set_model(model)
        .context("Invalid model")?;

    eprintln!("{}", style("Testing Ollama connection...").yellow());
    match OllamaProvider::new(&config.providers.ollama, config.embedding.timeout())
        .and_then(|provider| provider.health_check().map_err(Into::into))
    {
        Ok(()) => eprintln!("{}", style("Ollama connection successful.").green()),
        Err(error) => {
            eprintln!(
                "{} {}",
                style("Warning: could not reach Ollama:").yellow(),
                error
            );
            eprintln!("You can continue, but make sure Ollama is running before indexing.");
        }
    }
    Ok(())
}

#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding:").bold().yellow());
    eprintln!(
        "  Provider: {}",
        style(config.embedding.provider).cyan()
    );
    if !config.embedding.fallback.is_empty() {
        let chain: Vec<String> = config
            .embedding
            .fallback
            .iter()
            .map(|k| k.to_string())
            .collect();
        eprintln!("  Fallback chain: {}", style(chain.join(" -> ")).cyan());
    }
    if let Some(dims) = config.embedding.dimensions {
        eprintln!("  Dimensions override: {}", style(dims).cyan());
    }
    eprintln!("  Timeout: {}ms", style(config.embedding.timeout_ms).cyan());
    eprintln!("  Batch size: {}", style(config.embedding.batch_size).cyan());
    eprintln!(
        "  Cache capacity: {}",
        style(config.embedding.cache_capacity).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Chunking:").bold().yellow());
    eprintln!(
        "  Size/overlap: {}/{} chars",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Search:").bold().yellow());
    eprintln!(
        "  Similarity threshold: {}",
        style(config.search.similarity_threshold).cyan()
    );
    eprintln!(
        "  Hybrid weights: {} vector / {} lexical",
        style(config.search.vector_weight).cyan(),
        style(config.search.lexical_weight).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    eprintln!("Data directory: {}", style(config.data_dir().display()).dim());
    eprintln!(
        "Library root: {}",
        style(config.library_root().display()).dim()
    );

    Ok(())
}
