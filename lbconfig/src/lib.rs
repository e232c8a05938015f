//! # lbconfig - Configuration des crates Lyricbase
//!
//! Un document YAML unique, construit au chargement :
//!
//! 1. le document par défaut intégré (`lyricbase.yaml`)
//! 2. recouvert par `<config_dir>/config.yaml` s'il existe
//! 3. puis par les variables `LYRICBASE_CONFIG__SECTION__KEY=valeur`
//!
//! Les clés sont insensibles à la casse. Le document fusionné est réécrit
//! dans `config.yaml`, et chaque `set_value` le sauvegarde à nouveau.
//!
//! Les crates ajoutent leurs propres clés via un trait d'extension
//! (`LyricbaseConfigExt` dans `lbclient`, `MirrorConfigExt` dans `lbmirror`)
//! construit sur [`Config::get_value`] et [`Config::set_value`].
//!
//! ## Utilisation
//!
//! ```no_run
//! use lbconfig::get_config;
//!
//! let config = get_config();
//! let level = config.get_log_min_level()?;
//! let session_dir = config.get_managed_dir(&["session", "directory"], "session")?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = include_str!("lyricbase.yaml");

/// Variable désignant le répertoire de configuration
const ENV_CONFIG_DIR: &str = "LYRICBASE_CONFIG";
/// Préfixe des surcharges, les niveaux étant séparés par `__`
const ENV_PREFIX: &str = "LYRICBASE_CONFIG__";
const CONFIG_DIR_NAME: &str = ".lyricbase";
const CONFIG_FILE_NAME: &str = "config.yaml";

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load Lyricbase configuration"));
}

/// Génère le getter et le setter d'une clé typée avec sa valeur par défaut
macro_rules! setting {
    ($getter:ident, $setter:ident, $path:expr, bool, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            Ok(self.get_value($path).ok().and_then(|v| v.as_bool()).unwrap_or($default))
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
    ($getter:ident, $setter:ident, $path:expr, String, $default:expr) => {
        pub fn $getter(&self) -> Result<String> {
            Ok(self.get_string_or($path, $default))
        }

        pub fn $setter(&self, value: String) -> Result<()> {
            self.set_value($path, Value::String(value))
        }
    };
}

/// Configuration chargée depuis un répertoire
#[derive(Debug)]
pub struct Config {
    dir: PathBuf,
    file: PathBuf,
    data: Mutex<Value>,
}

impl Config {
    /// Répertoire de configuration à utiliser
    ///
    /// Dans l'ordre : `directory` s'il n'est pas vide, la variable
    /// `LYRICBASE_CONFIG`, `./.lyricbase` puis `~/.lyricbase` s'ils existent.
    /// À défaut, `./.lyricbase`. Le répertoire est créé au besoin.
    pub fn config_dir(directory: &str) -> Result<PathBuf> {
        let dir = if !directory.is_empty() {
            PathBuf::from(directory)
        } else if let Ok(from_env) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %from_env, "Config directory from environment");
            PathBuf::from(from_env)
        } else {
            let local = PathBuf::from(CONFIG_DIR_NAME);
            let home = home_dir().map(|home| home.join(CONFIG_DIR_NAME));
            [Some(local.clone()), home]
                .into_iter()
                .flatten()
                .find(|candidate| candidate.is_dir())
                .unwrap_or(local)
        };

        fs::create_dir_all(&dir)?;
        if !dir.is_dir() {
            return Err(anyhow!("{} is not a directory", dir.display()));
        }
        Ok(dir)
    }

    /// Charge la configuration et réécrit le document fusionné
    pub fn load_config(directory: &str) -> Result<Self> {
        let dir = Self::config_dir(directory)?;
        let file = dir.join(CONFIG_FILE_NAME);
        info!(config_dir = %dir.display(), "Using config directory");

        let mut data = normalize_keys(serde_yaml::from_str(DEFAULT_CONFIG)?);
        match fs::read(&file) {
            Ok(bytes) => {
                info!(config_file = %file.display(), "Loaded config file");
                overlay(&mut data, normalize_keys(serde_yaml::from_slice(&bytes)?));
            }
            Err(_) => {
                info!(config_file = %file.display(), "No config file, using defaults");
            }
        }

        for (name, raw) in env::vars() {
            let Some(path) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let keys: Vec<&str> = path.split("__").collect();
            let value = serde_yaml::from_str(&raw).unwrap_or(Value::String(raw.clone()));
            if let Err(e) = insert(&mut data, &keys, value) {
                warn!(variable = %name, error = %e, "Ignoring config override");
            }
        }

        let config = Config {
            dir,
            file,
            data: Mutex::new(data),
        };
        config.save()?;
        Ok(config)
    }

    /// Répertoire contenant `config.yaml`
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Écrit le document courant dans `config.yaml`
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.data.lock().unwrap())?;
        fs::write(&self.file, yaml)?;
        Ok(())
    }

    /// Définit la valeur à `path` (par ex. `&["api", "base_url"]`) et sauvegarde
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        insert(&mut self.data.lock().unwrap(), path, value)?;
        self.save()
    }

    /// Valeur à `path` ; erreur si le chemin n'existe pas
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        lookup(&self.data.lock().unwrap(), path)
            .cloned()
            .ok_or_else(|| anyhow!("No configuration value at {}", path.join(".")))
    }

    /// Chaîne à `path`, ou `default` si absente, vide ou d'un autre type
    pub fn get_string_or(&self, path: &[&str], default: &str) -> String {
        match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => default.to_string(),
        }
    }

    /// Entier à `path` ; les chaînes numériques sont acceptées
    pub fn get_u64_or(&self, path: &[&str], default: u64) -> u64 {
        match self.get_value(path) {
            Ok(Value::Number(n)) => n.as_u64().unwrap_or(default),
            Ok(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
                warn!(path = %path.join("."), value = %s, default, "Not a number, using default");
                default
            }),
            _ => default,
        }
    }

    /// Répertoire géré par la configuration, créé s'il n'existe pas
    ///
    /// Un chemin relatif est résolu depuis le répertoire de configuration.
    /// Sans valeur, `default` est enregistré puis utilisé.
    ///
    /// # Exemple
    ///
    /// ```no_run
    /// use lbconfig::get_config;
    ///
    /// let config = get_config();
    /// let mirror_dir = config.get_managed_dir(&["mirror", "directory"], "mirror")?;
    /// println!("Mirror directory: {}", mirror_dir.display());
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<PathBuf> {
        let configured = match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };

        let dir = self.dir.join(configured);
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            info!(directory = %dir.display(), "Created managed directory");
        }
        Ok(dir)
    }

    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    setting!(
        get_log_min_level,
        set_log_min_level,
        &["host", "logger", "min_level"],
        String,
        "INFO"
    );

    setting!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        bool,
        true
    );
}

/// Instance globale, chargée au premier accès
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

fn lookup<'a>(data: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(data, |node, key| node.get(key.to_lowercase()))
}

fn insert(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        *data = value;
        return Ok(());
    };

    let mut node = data;
    for key in parents {
        node = node
            .as_mapping_mut()
            .ok_or_else(|| anyhow!("Cannot set {}: {} is not a section", path.join("."), key))?
            .entry(Value::String(key.to_lowercase()))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
    }

    node.as_mapping_mut()
        .ok_or_else(|| anyhow!("Cannot set {}: parent is not a section", path.join(".")))?
        .insert(Value::String(last.to_lowercase()), value);
    Ok(())
}

/// Met en minuscules toutes les clés textuelles
fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(key, value)| {
                    let key = match key {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (key, normalize_keys(value))
                })
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

/// Recouvre `base` par `top` : les sections fusionnent, le reste est remplacé
fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Mapping(base), Value::Mapping(top)) => {
            for (key, value) in top {
                match base.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, top) => *base = top,
    }
}
