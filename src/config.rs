use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

use crate::{api_access::ApiAccessConfig, app::Cli, connection::ServerConfig};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_ACTIVATION_THRESHOLD: f32 = 0.6;
const DEFAULT_POSTER_FALLBACK_URL: &str = "/assets/media/poster-fallback.jpg";

#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(flatten)]
    pub api_access: ApiAccessConfig,

    #[serde(flatten)]
    pub server: ServerConfig,

    pub embed: EmbedConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    pub maps_api_key: Option<String>,
    pub activation_threshold: f32,
    pub poster_fallback_url: String,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            maps_api_key: None,
            activation_threshold: DEFAULT_ACTIVATION_THRESHOLD,
            poster_fallback_url: DEFAULT_POSTER_FALLBACK_URL.to_string(),
        }
    }
}

impl Config {
    pub fn read(file: &mut impl Read) -> anyhow::Result<Self> {
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .context("Failed to read config file")?;

        let config = toml::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    pub fn read_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut file = File::open(path).context("Failed to open config file")?;
        Self::read(&mut file)
    }

    pub fn from_cli_args(args: &Cli) -> anyhow::Result<Self> {
        let mut config = match &args.config {
            Some(config_path) => Self::read_path(config_path)?,
            None => {
                let default_config = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default_config.exists() {
                    log::info!("Using default config file {DEFAULT_CONFIG_PATH}");
                    Self::read_path(default_config)?
                } else {
                    log::warn!("No config file found; using default config");

                    #[cfg(debug_assertions)]
                    {
                        log::warn!("DEBUG DEFAULT CONFIG IS INSECURE! You are running a debug build, which uses an insecure default configuration for development purposes.");
                    }

                    Config::default()
                }
            }
        };
        if let Some(listen_on) = &args.listen_on {
            config.server.listen_on = listen_on.clone();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use crate::api_access::{ApiAccessPolicy, ApiKey, ApiPermissions};

    use super::*;

    const TEST_CONFIG: &str = r#"
listen_on = "127.0.0.1:6969"

[api_policy]
disable_access_control = false
restrict_attach = false
restrict_script = true

[[api_keys]]
key = "AAAAA"
attach = true
script = true

[embed]
maps_api_key = "MAPSKEY"
activation_threshold = 0.75
poster_fallback_url = "https://cdn.example.com/fallback.jpg"
"#;

    #[test]
    fn should_parse_config() {
        // given
        let mut config_file = Cursor::new(TEST_CONFIG);

        // when
        let config = Config::read(&mut config_file).unwrap();

        // then
        assert_eq!(
            config,
            Config {
                server: ServerConfig {
                    listen_on: "127.0.0.1:6969".to_string()
                },
                api_access: ApiAccessConfig {
                    api_policy: ApiAccessPolicy {
                        disable_access_control: false,
                        restrict_attach: false,
                        restrict_script: true
                    },
                    api_keys: vec![ApiKey {
                        key: "AAAAA".to_string(),
                        permissions: ApiPermissions::all()
                    }]
                },
                embed: EmbedConfig {
                    maps_api_key: Some("MAPSKEY".to_string()),
                    activation_threshold: 0.75,
                    poster_fallback_url: "https://cdn.example.com/fallback.jpg".to_string()
                },
            }
        )
    }

    #[test]
    fn should_fall_back_to_defaults() {
        // given
        let mut config_file = Cursor::new("");

        // when
        let config = Config::read(&mut config_file).unwrap();

        // then
        assert_eq!(config, Config::default());
        assert_eq!(config.embed.activation_threshold, 0.6);
        assert!(config.embed.maps_api_key.is_none());
    }

    #[test]
    fn should_read_config_from_a_file() {
        // given
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEST_CONFIG.as_bytes()).unwrap();

        // when
        let config = Config::read_path(file.path()).unwrap();

        // then
        assert_eq!(config.embed.maps_api_key.as_deref(), Some("MAPSKEY"));
    }

    #[test]
    fn should_return_error_on_invalid_syntax() {
        // given
        let mut config_file = Cursor::new("listen_on = ");

        // when
        let result = Config::read(&mut config_file);

        // then
        assert!(result.is_err());
    }
}
