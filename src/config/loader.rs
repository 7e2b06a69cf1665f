//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{EdiConfig, StoreBackend};
use super::secret::secret_string;
use crate::domain::errors::EdiError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into EdiConfig
/// 4. Applies environment variable overrides (EDI_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - Environment variable substitution fails
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use edi::config::loader::load_config;
///
/// let config = load_config("edi.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<EdiConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(EdiError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        EdiError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses configuration from TOML text
///
/// Same pipeline as [`load_config`] minus the file read.
pub fn parse_config(contents: &str) -> Result<EdiConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: EdiConfig = toml::from_str(&contents)
        .map_err(|e| EdiError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;
    config.finalize();

    config.validate().map_err(|e| {
        EdiError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| EdiError::Other(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::new();
    let mut missing_vars = Vec::new();

    for line in input.lines() {
        let trimmed = line.trim_start();

        // Placeholders in comments are left alone
        if trimmed.starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.contains(&var_name.to_string()) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(EdiError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using EDI_* prefix
///
/// Environment variables follow the pattern: EDI_<SECTION>_<KEY>
/// For example: EDI_STORE_BACKEND, EDI_SYNCHRONIZER_BATCH_SIZE
fn apply_env_overrides(config: &mut EdiConfig) -> Result<()> {
    if let Ok(val) = std::env::var("EDI_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // Store overrides
    if let Ok(val) = std::env::var("EDI_STORE_BACKEND") {
        config.store.backend = match val.to_ascii_lowercase().as_str() {
            "memory" => StoreBackend::Memory,
            "postgresql" => StoreBackend::PostgreSQL,
            other => {
                return Err(EdiError::Configuration(format!(
                    "Invalid EDI_STORE_BACKEND '{other}'. Must be one of: memory, postgresql"
                )))
            }
        };
    }
    if let Some(ref mut pg_config) = config.store.postgresql {
        if let Ok(val) = std::env::var("EDI_STORE_POSTGRESQL_CONNECTION_STRING") {
            pg_config.connection_string = secret_string(val);
        }
        if let Ok(val) = std::env::var("EDI_STORE_POSTGRESQL_MAX_CONNECTIONS") {
            if let Ok(max) = val.parse() {
                pg_config.max_connections = max;
            }
        }
    }

    // Synchronizer overrides
    if let Ok(val) = std::env::var("EDI_SYNCHRONIZER_BATCH_SIZE") {
        if let Ok(size) = val.parse() {
            config.synchronizer.batch_size = size;
        }
    }
    if let Ok(val) = std::env::var("EDI_SYNCHRONIZER_EMPTY_EQUALS_ABSENT") {
        config.synchronizer.empty_equals_absent = val.parse().unwrap_or(true);
    }

    // Server overrides
    if let Ok(val) = std::env::var("EDI_SERVER_BIND") {
        config.server.bind = val;
    }
    if let Ok(val) = std::env::var("EDI_SERVER_DEFAULT_GATEWAY") {
        config.server.default_gateway = Some(val);
    }

    // Mail overrides (only if mail is configured)
    if let Some(ref mut mail) = config.mail {
        if let Ok(val) = std::env::var("EDI_MAIL_HOST") {
            mail.host = val;
        }
        if let Ok(val) = std::env::var("EDI_MAIL_PASSWORD") {
            mail.password = Some(secret_string(val));
        }
    }

    // Options overrides
    if let Ok(val) = std::env::var("EDI_JAIL_PATH") {
        config.options.set("edi.jail_path", val);
    }

    // Logging overrides
    if let Ok(val) = std::env::var("EDI_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("EDI_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("EDI_LOADER_TEST_VAR", "test_value");
        let input = "password = \"${EDI_LOADER_TEST_VAR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "password = \"test_value\"\n");
        std::env::remove_var("EDI_LOADER_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("EDI_LOADER_MISSING_VAR");
        let input = "password = \"${EDI_LOADER_MISSING_VAR}\"";
        let result = substitute_env_vars(input);
        assert!(result.is_err());
    }

    #[test]
    fn test_substitute_skips_comments() {
        std::env::remove_var("EDI_LOADER_COMMENTED_VAR");
        let input = "# password = \"${EDI_LOADER_COMMENTED_VAR}\"";
        assert!(substitute_env_vars(input).is_ok());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_valid() {
        let toml_content = r#"
[application]
log_level = "debug"

[options.edi]
production = true

[entities.partner]
key = "ref"

[record_types.partner]
target = "partner"
via = "ref"

[document_types.friends]
model = "csv"
record_types = ["partner"]

[gateways.local]
connection = "local"
safety = "edi.production"

[[gateways.local.paths]]
name = "inbox"
path = "/tmp/edi/in"
glob = "*.csv"
doc_types = ["friends"]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.gateways["local"].paths[0].glob, "*.csv");
        assert!(config.document_type("unknown").is_some());
    }
}
