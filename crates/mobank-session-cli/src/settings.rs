/*
[INPUT]:  Optional YAML file, MOBANK_* environment variables, CLI overrides
[OUTPUT]: Validated CLI settings wrapping the session configuration
[POS]:    CLI configuration layer
[UPDATE]: When adding CLI-only options or new configuration sources
*/

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use mobank_session::SessionConfig;
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "MOBANK";
const APP_DIR: &str = "mobank";

/// Everything the binary reads from configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CliSettings {
    /// Secure store file; defaults under the user data dir.
    pub store_path: Option<PathBuf>,
    #[serde(flatten)]
    pub session: SessionConfig,
}

impl CliSettings {
    /// Layer defaults, the YAML file (if any) and `MOBANK__SECTION__KEY` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            let path_str = path.to_str().context("config path must be valid utf-8")?;
            builder = builder.add_source(File::new(path_str, FileFormat::Yaml).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings: CliSettings = builder
            .build()
            .context("read configuration sources")?
            .try_deserialize()
            .context("parse configuration")?;
        settings
            .session
            .validate()
            .map_err(|err| anyhow!(err))
            .context("validate configuration")?;
        Ok(settings)
    }

    /// Explicit path wins, then the configured one, then the data dir.
    pub fn resolve_store_path(&self, cli_override: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = cli_override {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = &self.store_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?
            .join(APP_DIR);
        Ok(data_dir.join("session.json"))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("serialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "store_path: /tmp/mobank-test.json\napi:\n  base_url: https://bank.example\npin:\n  max_attempts: 3\n"
        )
        .unwrap();

        let settings = CliSettings::load(Some(file.path())).unwrap();
        assert_eq!(settings.session.api.base_url, "https://bank.example");
        assert_eq!(settings.session.pin.max_attempts, 3);
        // untouched sections keep their defaults
        assert_eq!(settings.session.retry.max_retries, 2);
        assert_eq!(
            settings.resolve_store_path(None).unwrap(),
            PathBuf::from("/tmp/mobank-test.json")
        );
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = CliSettings::load(Some(Path::new("/nonexistent/mobank.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "pin:\n  max_attempts: 0\n").unwrap();
        let err = CliSettings::load(Some(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("max_attempts"));
    }

    #[test]
    fn test_cli_store_override_wins() {
        let settings = CliSettings {
            store_path: Some(PathBuf::from("/from/config.json")),
            ..CliSettings::default()
        };
        let resolved = settings
            .resolve_store_path(Some(Path::new("/from/flag.json")))
            .unwrap();
        assert_eq!(resolved, PathBuf::from("/from/flag.json"));
    }
}
