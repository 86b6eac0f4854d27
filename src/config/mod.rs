// Configuration: TOML settings with validation, plus interactive setup.

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, EmbeddingConfig, GeminiConfig, LibraryConfig, OllamaConfig, OpenAiConfig,
    ProvidersConfig,
};

/// Platform configuration directory for this application.
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("corpus-search"))
        .ok_or(ConfigError::DirectoryError)
}
