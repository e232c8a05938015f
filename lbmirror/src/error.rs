//! Gestion des erreurs du miroir de contenu

use thiserror::Error;

/// Type Result personnalisé pour lbmirror
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Erreurs possibles lors de l'utilisation du miroir
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Erreur d'entrée/sortie sur le stockage local
    #[error("Mirror I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Erreur de sérialisation d'une entrée
    #[error("Mirror serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Entrée présente sur disque mais illisible
    #[error("Corrupt mirror entry {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Clé refusée (vide ou contenant des caractères hors `[A-Za-z0-9_-]`)
    #[error("Invalid mirror key: {0:?}")]
    InvalidKey(String),

    /// Entrée absente du miroir
    #[error("Mirror entry not found: {0}")]
    NotFound(String),

    /// La purge n'a pas pu vider le répertoire
    #[error("Mirror purge incomplete, {remaining} entries left")]
    Purge { remaining: usize },

    /// Échec du fetcher de catalogue
    #[error("Catalog fetch failed: {0}")]
    Fetch(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// La tâche de téléchargement a paniqué ou a été annulée par le runtime
    #[error("Download task failed: {0}")]
    Task(String),
}

impl MirrorError {
    /// Vérifie si l'erreur vient du stockage local (et non du catalogue distant)
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            MirrorError::Io(_) | MirrorError::Serialize(_) | MirrorError::Corrupt { .. }
        )
    }
}
