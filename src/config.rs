use std::{path::Path, time::Duration};

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    error::{Result, ScanClientError},
    CONFIG_FILE_NAME, DEFAULT_ANTIVIRUS_URL, DEFAULT_NETWORK_SECURITY_URL,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub antivirus_url: String,
    pub network_security_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            antivirus_url: DEFAULT_ANTIVIRUS_URL.to_string(),
            network_security_url: DEFAULT_NETWORK_SECURITY_URL.to_string(),
            poll_interval_ms: 1000,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Loads `avscan.toml` from the user's config dir, creating it with defaults on first run.
    pub fn new() -> Result<Self> {
        let dirs = directories::BaseDirs::new().ok_or(ScanClientError::NoHomeDir)?;
        let config_dir = dirs.config_dir();
        let config_file = config_dir.join(CONFIG_FILE_NAME);

        if !config_file.exists() {
            log::info!("creating config file at {config_file:?}");
            std::fs::create_dir_all(config_dir)?;
            let config = Self::default();
            std::fs::write(&config_file, toml::to_string(&config)?)?;
            return Ok(config);
        }

        Self::load_from(&config_file)
    }

    /// Merges the given file over the defaults. Keys missing from the file keep their default.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::info!("reading config from {path:?}");
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(Box::new)?; // boxed because the error size from figment is large

        config.validate()?;
        log::debug!("using config: {config:?}");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.antivirus_url)?;
        Url::parse(&self.network_security_url)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        // a zero period would make tokio's interval panic
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "antivirus_url = \"http://scanner.lan:9000/api/antivirus\"\npoll_interval_ms = 250\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(
            config,
            Config {
                antivirus_url: "http://scanner.lan:9000/api/antivirus".into(),
                poll_interval_ms: 250,
                ..Config::default()
            }
        );
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn rejects_unparseable_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "network_security_url = \"not a url\"\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ScanClientError::InvalidUrl(_)));
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let config = Config {
            poll_interval_ms: 0,
            ..Config::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }
}
