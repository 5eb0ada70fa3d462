//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `B2BROKER_CONFIG`
//! environment variable. The file is optional: a deployment configured purely through environment
//! variables is fine.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `B2BROKER_` override YAML values
//! 3. **Bare B2 variables** - `B2_KEY_ID`, `B2_APP_KEY` and `B2_BUCKET_ID`, the names
//!    existing deployments typically already carry, override `b2.key_id`,
//!    `b2.application_key` and `b2.bucket_id` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `B2BROKER_B2__BUCKET_ID=abc123` sets the `b2.bucket_id` field.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! B2BROKER_PORT=8080
//!
//! # Set the account credentials (preferred method)
//! B2_KEY_ID="0012ab..."
//! B2_APP_KEY="K001..."
//! B2_BUCKET_ID="4a48fe..."
//!
//! # Or use the prefixed form
//! B2BROKER_B2__KEY_ID="0012ab..."
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// Default base URL for B2 account authorization.
pub static DEFAULT_B2_API_URL: &str = "https://api.backblazeb2.com";

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "B2BROKER_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch missing credentials before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have defaults; the B2 credential fields default to empty, and the broker
/// answers every request with a configuration error until they are set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Optional: bare `B2_KEY_ID` override, folded into `b2.key_id` by [`Config::load`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Optional: bare `B2_APP_KEY` override, folded into `b2.application_key`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_key: Option<String>,
    /// Optional: bare `B2_BUCKET_ID` override, folded into `b2.bucket_id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_id: Option<String>,
    /// Backblaze B2 account credentials and endpoint settings
    pub b2: B2Config,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            key_id: None,
            application_key: None,
            bucket_id: None,
            b2: B2Config::default(),
            cors: CorsConfig::default(),
        }
    }
}

/// Backblaze B2 account and endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct B2Config {
    /// Application key ID for the account
    pub key_id: String,
    /// Application key secret
    pub application_key: String,
    /// Bucket the broker hands out credentials for
    pub bucket_id: String,
    /// Base URL of the B2 authorization API. Overridable so tests can point
    /// the broker at a local mock.
    pub api_url: Url,
    /// Timeout applied to every upstream B2 call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for B2Config {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            application_key: String::new(),
            bucket_id: String::new(),
            api_url: Url::parse(DEFAULT_B2_API_URL).expect("default B2 API URL is valid"),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl B2Config {
    /// The credential triple used for authorization and dispatch.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            key_id: self.key_id.clone(),
            application_key: self.application_key.clone(),
            bucket_id: self.bucket_id.clone(),
        }
    }
}

/// The account credential triple sourced from configuration.
///
/// Immutable for the process lifetime. All three fields are required before
/// any upstream call is attempted.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub key_id: String,
    pub application_key: String,
    pub bucket_id: String,
}

impl Credentials {
    /// Names of the required fields that are unset. Empty means complete.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.key_id.is_empty() {
            missing.push("key_id");
        }
        if self.application_key.is_empty() {
            missing.push("application_key");
        }
        if self.bucket_id.is_empty() {
            missing.push("bucket_id");
        }
        missing
    }

    /// Fail with a configuration error when any credential field is unset.
    pub fn validate(&self) -> Result<(), Error> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Configuration { missing })
        }
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            // The broker serves browser frontends it does not know in advance
            allowed_origins: vec![CorsOrigin::Wildcard],
            max_age: Some(3600),
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        // The bare B2_* variables take precedence over file and prefixed
        // values, so existing deployments keep working unchanged.
        if let Some(key_id) = config.key_id.take() {
            config.b2.key_id = key_id;
        }
        if let Some(application_key) = config.application_key.take() {
            config.b2.application_key = application_key;
        }
        if let Some(bucket_id) = config.bucket_id.take() {
            config.b2.bucket_id = bucket_id;
        }

        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("B2BROKER_").split("__"))
            // Common bare variable names for the credentials
            .merge(Env::raw().only(&["B2_KEY_ID"]).map(|_| "key_id".into()))
            .merge(Env::raw().only(&["B2_APP_KEY"]).map(|_| "application_key".into()))
            .merge(Env::raw().only(&["B2_BUCKET_ID"]).map(|_| "bucket_id".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args_for(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_yaml_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 8080
b2:
  key_id: 0012abcdef
  application_key: K001secret
  bucket_id: 4a48fe88
  request_timeout: 10s
"#,
            )?;

            let config = Config::load(&args_for("test.yaml"))?;

            assert_eq!(config.port, 8080);
            assert_eq!(config.b2.key_id, "0012abcdef");
            assert_eq!(config.b2.application_key, "K001secret");
            assert_eq!(config.b2.bucket_id, "4a48fe88");
            assert_eq!(config.b2.request_timeout, Duration::from_secs(10));
            assert_eq!(config.b2.api_url.as_str(), "https://api.backblazeb2.com/");
            assert!(config.b2.credentials().validate().is_ok());

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
host: 10.0.0.5
b2:
  key_id: from-file
"#,
            )?;

            jail.set_env("B2BROKER_PORT", "9000");
            jail.set_env("B2BROKER_B2__KEY_ID", "from-env");

            let config = Config::load(&args_for("test.yaml"))?;

            // Env vars should override
            assert_eq!(config.port, 9000);
            assert_eq!(config.b2.key_id, "from-env");

            // YAML values should be preserved
            assert_eq!(config.host, "10.0.0.5");

            Ok(())
        });
    }

    #[test]
    fn test_bare_b2_variables_win() {
        Jail::expect_with(|jail| {
            jail.set_env("B2BROKER_B2__KEY_ID", "prefixed");
            jail.set_env("B2_KEY_ID", "bare");
            jail.set_env("B2_APP_KEY", "bare-secret");
            jail.set_env("B2_BUCKET_ID", "bare-bucket");

            let config = Config::load(&args_for("missing.yaml"))?;

            assert_eq!(config.b2.key_id, "bare");
            assert_eq!(config.b2.application_key, "bare-secret");
            assert_eq!(config.b2.bucket_id, "bare-bucket");
            // Overrides are folded into `b2`, not left dangling at the top level
            assert!(config.key_id.is_none());

            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args_for("does-not-exist.yaml"))?;

            assert_eq!(config.bind_address(), "0.0.0.0:3000");
            assert_eq!(
                config.b2.credentials().missing_fields(),
                vec!["key_id", "application_key", "bucket_id"]
            );

            Ok(())
        });
    }

    #[test]
    fn test_credentials_validation_reports_missing_fields() {
        let credentials = Credentials {
            key_id: "present".to_string(),
            application_key: String::new(),
            bucket_id: String::new(),
        };

        let err = credentials.validate().unwrap_err();
        match err {
            Error::Configuration { missing } => {
                assert_eq!(missing, vec!["application_key", "bucket_id"]);
            }
            other => panic!("expected configuration error, got {other:?}"),
        }
    }
}
