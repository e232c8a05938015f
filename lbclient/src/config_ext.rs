//! Extension pour intégrer la configuration du client dans lbconfig
//!
//! Ce module fournit le trait `LyricbaseConfigExt` qui ajoute à
//! `lbconfig::Config` les paramètres de l'API, de la session et de la sonde
//! de connectivité.

use crate::api::{ApiSettings, DEFAULT_BASE_URL};
use anyhow::{anyhow, Result};
use lbconfig::Config;
use serde_yaml::{Number, Value};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SESSION_DIR: &str = "session";
const DEFAULT_PROBE_PATH: &str = "/";

/// Trait d'extension pour gérer la configuration du client dans lbconfig
///
/// # Exemple
///
/// ```rust,ignore
/// use lbconfig::get_config;
/// use lbclient::LyricbaseConfigExt;
///
/// let config = get_config();
/// let settings = config.get_api_settings()?;
/// println!("API: {}", settings.base_url);
/// ```
pub trait LyricbaseConfigExt {
    /// URL de base de l'API
    fn get_api_base_url(&self) -> Result<String>;

    /// Définit l'URL de base de l'API
    ///
    /// # Errors
    ///
    /// Retourne une erreur si l'URL n'est pas en http(s)
    fn set_api_base_url(&self, url: &str) -> Result<()>;

    fn get_api_connect_timeout(&self) -> Result<Duration>;

    fn get_api_request_timeout(&self) -> Result<Duration>;

    /// Marge avant expiration du token déclenchant un rafraîchissement anticipé
    fn get_api_refresh_skew(&self) -> Result<Duration>;

    fn set_api_refresh_skew(&self, secs: u64) -> Result<()>;

    /// Paramètres complets du client HTTP
    fn get_api_settings(&self) -> Result<ApiSettings>;

    /// Répertoire de session (credentials), créé s'il n'existe pas
    fn get_session_dir(&self) -> Result<PathBuf>;

    fn set_session_dir(&self, directory: &str) -> Result<()>;

    /// Chemin interrogé par la sonde de connectivité
    fn get_connectivity_probe_path(&self) -> Result<String>;

    fn get_connectivity_probe_interval(&self) -> Result<Duration>;

    /// Définit l'intervalle de la sonde, en secondes (au moins 1)
    fn set_connectivity_probe_interval(&self, secs: u64) -> Result<()>;
}

impl LyricbaseConfigExt for Config {
    fn get_api_base_url(&self) -> Result<String> {
        Ok(self
            .get_string_or(&["api", "base_url"], DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string())
    }

    fn set_api_base_url(&self, url: &str) -> Result<()> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow!("Invalid API base URL: {}", url));
        }
        self.set_value(&["api", "base_url"], Value::String(url.to_string()))
    }

    fn get_api_connect_timeout(&self) -> Result<Duration> {
        Ok(Duration::from_secs(
            self.get_u64_or(&["api", "connect_timeout_secs"], 10),
        ))
    }

    fn get_api_request_timeout(&self) -> Result<Duration> {
        Ok(Duration::from_secs(
            self.get_u64_or(&["api", "request_timeout_secs"], 30),
        ))
    }

    fn get_api_refresh_skew(&self) -> Result<Duration> {
        Ok(Duration::from_secs(
            self.get_u64_or(&["api", "refresh_skew_secs"], 30),
        ))
    }

    fn set_api_refresh_skew(&self, secs: u64) -> Result<()> {
        self.set_value(
            &["api", "refresh_skew_secs"],
            Value::Number(Number::from(secs)),
        )
    }

    fn get_api_settings(&self) -> Result<ApiSettings> {
        Ok(ApiSettings {
            base_url: self.get_api_base_url()?,
            connect_timeout: self.get_api_connect_timeout()?,
            request_timeout: self.get_api_request_timeout()?,
            refresh_skew: self.get_api_refresh_skew()?,
        })
    }

    fn get_session_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["session", "directory"], DEFAULT_SESSION_DIR)
    }

    fn set_session_dir(&self, directory: &str) -> Result<()> {
        self.set_managed_dir(&["session", "directory"], directory.to_string())
    }

    fn get_connectivity_probe_path(&self) -> Result<String> {
        Ok(self.get_string_or(&["connectivity", "probe_path"], DEFAULT_PROBE_PATH))
    }

    fn get_connectivity_probe_interval(&self) -> Result<Duration> {
        let secs = self.get_u64_or(&["connectivity", "probe_interval_secs"], 15);
        Ok(Duration::from_secs(secs.max(1)))
    }

    fn set_connectivity_probe_interval(&self, secs: u64) -> Result<()> {
        self.set_value(
            &["connectivity", "probe_interval_secs"],
            Value::Number(Number::from(secs.max(1))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = Config::load_config(dir.path().to_str().unwrap())?;

        let settings = config.get_api_settings()?;
        assert_eq!(settings.base_url, "http://localhost:3000");
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.refresh_skew, Duration::from_secs(30));

        assert_eq!(config.get_session_dir()?, dir.path().join("session"));
        assert_eq!(config.get_connectivity_probe_path()?, "/");
        assert_eq!(config.get_connectivity_probe_interval()?, Duration::from_secs(15));
        Ok(())
    }

    #[test]
    fn test_set_base_url() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = Config::load_config(dir.path().to_str().unwrap())?;

        config.set_api_base_url("https://lyricbase.example.net/")?;
        assert_eq!(config.get_api_base_url()?, "https://lyricbase.example.net");
        assert!(config.set_api_base_url("ftp://nope").is_err());
        Ok(())
    }

    #[test]
    fn test_probe_interval_has_a_floor() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = Config::load_config(dir.path().to_str().unwrap())?;

        config.set_connectivity_probe_interval(0)?;
        assert_eq!(config.get_connectivity_probe_interval()?, Duration::from_secs(1));

        config.set_connectivity_probe_interval(120)?;
        assert_eq!(config.get_connectivity_probe_interval()?, Duration::from_secs(120));
        Ok(())
    }
}
