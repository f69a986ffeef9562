//! Configuration module.
//!
//! Settings resolve in layers: built-in defaults, then a TOML config file, then
//! environment overrides, then command-line flags.

pub mod loader;

pub use loader::{
    apply_cli_overrides, apply_env_overrides, default_config_path, default_log_path,
    load_config_file, load_config_with_precedence, merge_config, ConfigError, ConfigFile,
    ResolvedConfig,
};

/// Resolve configuration through every layer except CLI flags.
///
/// # Errors
///
/// Returns [`ConfigError`] if a config file exists but is unreadable or malformed, or
/// an environment override is not a positive integer.
pub fn resolve(config_path: Option<std::path::PathBuf>) -> Result<ResolvedConfig, ConfigError> {
    let file = load_config_with_precedence(config_path)?;
    apply_env_overrides(merge_config(file))
}
