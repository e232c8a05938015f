//! Extension pour intégrer la configuration du miroir dans lbconfig

use crate::mirror::{ContentMirror, MirrorItem, DEFAULT_PURGE_ATTEMPTS};
use anyhow::Result;
use lbconfig::Config;
use serde_yaml::{Number, Value};
use std::path::PathBuf;

/// Nom par défaut du répertoire du miroir (relatif au répertoire de configuration)
const DEFAULT_MIRROR_DIR: &str = "mirror";

/// Trait d'extension pour gérer la configuration du miroir dans lbconfig
///
/// # Exemple
///
/// ```rust,ignore
/// use lbconfig::get_config;
/// use lbmirror::MirrorConfigExt;
///
/// let config = get_config();
/// let dir = config.get_mirror_dir()?;
/// ```
pub trait MirrorConfigExt {
    /// Répertoire racine du miroir, créé s'il n'existe pas
    fn get_mirror_dir(&self) -> Result<PathBuf>;

    /// Définit le répertoire racine du miroir
    fn set_mirror_dir(&self, directory: &str) -> Result<()>;

    /// Nombre de tentatives de suppression lors d'une purge
    fn get_mirror_purge_attempts(&self) -> Result<u32>;

    /// Définit le nombre de tentatives de suppression lors d'une purge
    fn set_mirror_purge_attempts(&self, attempts: u32) -> Result<()>;
}

impl MirrorConfigExt for Config {
    fn get_mirror_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["mirror", "directory"], DEFAULT_MIRROR_DIR)
    }

    fn set_mirror_dir(&self, directory: &str) -> Result<()> {
        self.set_managed_dir(&["mirror", "directory"], directory.to_string())
    }

    fn get_mirror_purge_attempts(&self) -> Result<u32> {
        let attempts = self.get_u64_or(
            &["mirror", "purge_attempts"],
            u64::from(DEFAULT_PURGE_ATTEMPTS),
        );
        Ok(u32::try_from(attempts).unwrap_or(DEFAULT_PURGE_ATTEMPTS))
    }

    fn set_mirror_purge_attempts(&self, attempts: u32) -> Result<()> {
        self.set_value(
            &["mirror", "purge_attempts"],
            Value::Number(Number::from(attempts)),
        )
    }
}

impl<T: MirrorItem> ContentMirror<T> {
    /// Crée un miroir depuis la configuration lbconfig
    pub fn from_config(config: &Config, catalog: &str) -> Result<Self> {
        let root = config.get_mirror_dir()?;
        let attempts = config.get_mirror_purge_attempts()?;
        Ok(ContentMirror::new(root, catalog)?.with_purge_attempts(attempts))
    }
}
