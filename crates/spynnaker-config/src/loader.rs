// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, later ones winning:
//! 1. TOML file (base values)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, SpynnakerConfig, CONFIG_FILE_NAME};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "SPYNNAKER_CONFIG_PATH";

/// Find the configuration file
///
/// Search order:
/// 1. `SPYNNAKER_CONFIG_PATH` environment variable
/// 2. Current working directory
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by {} not found: {}",
            CONFIG_PATH_ENV,
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.as_path();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent;
                }
                None => break,
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|path| path.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet {} to specify a custom location.",
        CONFIG_FILE_NAME, search_list, CONFIG_PATH_ENV
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, the file is searched for.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if the config file is not found or contains invalid TOML
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<SpynnakerConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: SpynnakerConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `SPYNNAKER_MAX_PACKET_BYTES` -> `buffers.max_packet_bytes`
/// - `SPYNNAKER_KEY_WIDTH` -> `buffers.key_width`
/// - `SPYNNAKER_INBOUND_CHANNEL_CAPACITY` -> `service.inbound_channel_capacity`
/// - `SPYNNAKER_REGION_CHANNEL_CAPACITY` -> `service.region_channel_capacity`
/// - `SPYNNAKER_OUTBOUND_CHANNEL_CAPACITY` -> `service.outbound_channel_capacity`
/// - `SPYNNAKER_LOG_LEVEL` -> `logging.level`
/// - `SPYNNAKER_LOG_DIR` -> `logging.log_dir`
///
/// Values that fail to parse are ignored.
pub fn apply_environment_overrides(config: &mut SpynnakerConfig) {
    if let Ok(value) = env::var("SPYNNAKER_MAX_PACKET_BYTES") {
        parse_into(&value, &mut config.buffers.max_packet_bytes);
    }
    if let Ok(value) = env::var("SPYNNAKER_KEY_WIDTH") {
        parse_into(&value, &mut config.buffers.key_width);
    }

    if let Ok(value) = env::var("SPYNNAKER_INBOUND_CHANNEL_CAPACITY") {
        parse_into(&value, &mut config.service.inbound_channel_capacity);
    }
    if let Ok(value) = env::var("SPYNNAKER_REGION_CHANNEL_CAPACITY") {
        parse_into(&value, &mut config.service.region_channel_capacity);
    }
    if let Ok(value) = env::var("SPYNNAKER_OUTBOUND_CHANNEL_CAPACITY") {
        parse_into(&value, &mut config.service.outbound_channel_capacity);
    }

    if let Ok(value) = env::var("SPYNNAKER_LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Ok(value) = env::var("SPYNNAKER_LOG_DIR") {
        config.logging.log_dir = Some(PathBuf::from(value));
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - CLI arguments keyed by field name (e.g. `{"max_packet_bytes": "512"}`).
///   `debug_crates` takes a comma separated list.
pub fn apply_cli_overrides(config: &mut SpynnakerConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("max_packet_bytes") {
        parse_into(value, &mut config.buffers.max_packet_bytes);
    }
    if let Some(value) = cli_args.get("key_width") {
        parse_into(value, &mut config.buffers.key_width);
    }

    if let Some(value) = cli_args.get("inbound_channel_capacity") {
        parse_into(value, &mut config.service.inbound_channel_capacity);
    }
    if let Some(value) = cli_args.get("region_channel_capacity") {
        parse_into(value, &mut config.service.region_channel_capacity);
    }
    if let Some(value) = cli_args.get("outbound_channel_capacity") {
        parse_into(value, &mut config.service.outbound_channel_capacity);
    }

    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
    if let Some(value) = cli_args.get("log_dir") {
        config.logging.log_dir = Some(PathBuf::from(value));
    }
    if let Some(value) = cli_args.get("debug_crates") {
        config.logging.debug_crates = value
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
    }
}

fn parse_into<T: FromStr>(value: &str, target: &mut T) {
    if let Ok(parsed) = value.trim().parse::<T>() {
        *target = parsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyWidth;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const OVERRIDE_VARS: [&str; 3] = [
        "SPYNNAKER_MAX_PACKET_BYTES",
        "SPYNNAKER_KEY_WIDTH",
        "SPYNNAKER_LOG_LEVEL",
    ];

    fn clear_override_vars() {
        for var in OVERRIDE_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom_config.toml");
        File::create(&config_path).unwrap();

        env::set_var(CONFIG_PATH_ENV, config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var(CONFIG_PATH_ENV);

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();

        env::set_var(CONFIG_PATH_ENV, dir.path().join("absent.toml"));
        let result = find_config_file();
        env::remove_var(CONFIG_PATH_ENV);

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        clear_override_vars();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[buffers]").unwrap();
        writeln!(file, "max_packet_bytes = 512").unwrap();
        writeln!(file, "[service]").unwrap();
        writeln!(file, "region_channel_capacity = 4").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.buffers.max_packet_bytes, 512);
        assert_eq!(config.buffers.key_width, KeyWidth::Bits32);
        assert_eq!(config.service.region_channel_capacity, 4);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "[buffers]\nmax_packet_bytes = \"many\"\n").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = SpynnakerConfig::default();

        env::set_var("SPYNNAKER_MAX_PACKET_BYTES", "1024");
        env::set_var("SPYNNAKER_KEY_WIDTH", "bits16");
        env::set_var("SPYNNAKER_LOG_LEVEL", "not-a-number-but-a-string");

        apply_environment_overrides(&mut config);
        clear_override_vars();

        assert_eq!(config.buffers.max_packet_bytes, 1024);
        assert_eq!(config.buffers.key_width, KeyWidth::Bits16);
        assert_eq!(config.logging.level, "not-a-number-but-a-string");
    }

    #[test]
    fn test_unparsable_environment_value_ignored() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = SpynnakerConfig::default();

        env::set_var("SPYNNAKER_MAX_PACKET_BYTES", "lots");
        apply_environment_overrides(&mut config);
        clear_override_vars();

        assert_eq!(config.buffers.max_packet_bytes, 256);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = SpynnakerConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("region_channel_capacity".to_string(), "2".to_string());
        cli_args.insert(
            "debug_crates".to_string(),
            "spynnaker-buffers, spynnaker-eieio,".to_string(),
        );

        apply_cli_overrides(&mut config, &cli_args);

        assert_eq!(config.service.region_channel_capacity, 2);
        assert_eq!(
            config.logging.debug_crates,
            vec!["spynnaker-buffers".to_string(), "spynnaker-eieio".to_string()]
        );
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[buffers]").unwrap();
        writeln!(file, "max_packet_bytes = 128").unwrap();
        writeln!(file, "[logging]").unwrap();
        writeln!(file, "level = \"warn\"").unwrap();

        env::set_var("SPYNNAKER_MAX_PACKET_BYTES", "512");
        env::set_var("SPYNNAKER_LOG_LEVEL", "debug");

        let mut cli_args = HashMap::new();
        cli_args.insert("max_packet_bytes".to_string(), "1024".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();
        clear_override_vars();

        // CLI wins for packet size, env wins for level (no CLI override)
        assert_eq!(config.buffers.max_packet_bytes, 1024);
        assert_eq!(config.logging.level, "debug");
    }
}
