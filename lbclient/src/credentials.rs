//! Stockage persistant de la paire de credentials
//!
//! Une seule paire existe pour la session courante ; le token d'accès et le
//! token de rafraîchissement sont toujours écrits ensemble.

use crate::error::{LyricbaseError, Result};
use crate::models::SignedInUser;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Nom du fichier de credentials dans le répertoire de session
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Paire de credentials d'accès et de rafraîchissement
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Date d'obtention du token d'accès
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: None,
            issued_at: None,
        }
    }

    /// Définit la date d'expiration du token d'accès
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Le token d'accès expire avant `now + skew`
    ///
    /// Une paire sans date d'expiration n'est jamais considérée comme expirée.
    pub fn expires_within(&self, skew: Duration) -> bool {
        self.expires_at
            .map(|at| at < Utc::now() + skew)
            .unwrap_or(false)
    }

    /// Le token d'accès doit être rafraîchi avant usage
    ///
    /// L'avance `skew` est limitée à la moitié de la durée de vie du token
    /// quand celle-ci est connue.
    pub fn needs_refresh(&self, skew: Duration) -> bool {
        let skew = match (self.issued_at, self.expires_at) {
            (Some(issued), Some(expires)) => skew.min((expires - issued) / 2),
            _ => skew,
        };
        self.expires_within(skew)
    }
}

// Les tokens ne doivent jamais apparaître dans les logs
impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("expires_at", &self.expires_at)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

impl From<&SignedInUser> for CredentialPair {
    fn from(user: &SignedInUser) -> Self {
        Self {
            access_token: user.access_token.clone(),
            refresh_token: user.refresh_token.clone(),
            expires_at: user.expires_at,
            issued_at: Some(Utc::now()),
        }
    }
}

/// Stockage de la paire de credentials
///
/// `save` est atomique vis-à-vis de `load` : un lecteur voit l'ancienne paire
/// ou la nouvelle, jamais un mélange des deux.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Paire courante ; une erreur de lecture équivaut à l'absence de paire
    async fn load(&self) -> Option<CredentialPair>;

    /// Remplace la paire courante
    async fn save(&self, pair: &CredentialPair) -> Result<()>;

    /// Supprime la paire courante
    async fn clear(&self) -> Result<()>;
}

/// Stockage en mémoire (tests, sessions éphémères)
///
/// ```
/// use lbclient::{CredentialPair, CredentialStore, MemoryCredentialStore};
///
/// # tokio_test::block_on(async {
/// let store = MemoryCredentialStore::new();
/// store.save(&CredentialPair::new("access", "refresh")).await.unwrap();
/// assert_eq!(store.load().await.unwrap().refresh_token, "refresh");
///
/// store.clear().await.unwrap();
/// assert!(store.load().await.is_none());
/// # });
/// ```
#[derive(Default)]
pub struct MemoryCredentialStore {
    pair: RwLock<Option<CredentialPair>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crée un stockage contenant déjà une paire
    pub fn with_pair(pair: CredentialPair) -> Self {
        Self {
            pair: RwLock::new(Some(pair)),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Option<CredentialPair> {
        self.pair.read().await.clone()
    }

    async fn save(&self, pair: &CredentialPair) -> Result<()> {
        *self.pair.write().await = Some(pair.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.pair.write().await = None;
        Ok(())
    }
}

/// État du cache mémoire de [`FileCredentialStore`]
enum Cached {
    /// Le fichier n'a pas encore été lu
    Unknown,
    Known(Option<CredentialPair>),
}

/// Stockage sur disque : un document JSON `credentials.json`
///
/// L'écriture passe par un fichier temporaire renommé à sa place. La dernière
/// paire lue ou écrite est gardée en mémoire ; le verrou en écriture est tenu
/// pendant toute l'opération sur le fichier.
pub struct FileCredentialStore {
    path: PathBuf,
    cache: RwLock<Cached>,
}

impl FileCredentialStore {
    /// Crée un stockage dans le répertoire de session donné
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            path: directory.as_ref().join(CREDENTIALS_FILE),
            cache: RwLock::new(Cached::Unknown),
        }
    }

    /// Chemin du fichier de credentials
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Option<CredentialPair> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cannot read credentials from {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&content) {
            Ok(pair) => Some(pair),
            Err(e) => {
                warn!("Ignoring unreadable credentials file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    async fn write_file(&self, pair: &CredentialPair) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(pair)?;
        let tmp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", CREDENTIALS_FILE, uuid::Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&tmp, &json).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Option<CredentialPair> {
        if let Cached::Known(pair) = &*self.cache.read().await {
            return pair.clone();
        }

        let mut cache = self.cache.write().await;
        if let Cached::Known(pair) = &*cache {
            return pair.clone();
        }
        let pair = self.read_file().await;
        *cache = Cached::Known(pair.clone());
        pair
    }

    async fn save(&self, pair: &CredentialPair) -> Result<()> {
        let mut cache = self.cache.write().await;
        self.write_file(pair).await.map_err(|e| {
            LyricbaseError::Persistence(format!(
                "cannot write {}: {}",
                self.path.display(),
                e
            ))
        })?;
        *cache = Cached::Known(Some(pair.clone()));
        debug!("Credentials saved to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut cache = self.cache.write().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(LyricbaseError::Persistence(format!(
                    "cannot remove {}: {}",
                    self.path.display(),
                    e
                )))
            }
        }
        *cache = Cached::Known(None);
        debug!("Credentials cleared");
        Ok(())
    }
}
