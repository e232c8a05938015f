//! Gestion des erreurs pour le client Lyricbase

use crate::api::refresh::RefreshError;
use lbmirror::MirrorError;
use thiserror::Error;

/// Type Result personnalisé pour lbclient
pub type Result<T> = std::result::Result<T, LyricbaseError>;

/// Erreurs possibles lors de l'utilisation du client Lyricbase
#[derive(Error, Debug)]
pub enum LyricbaseError {
    /// Échec de transport (timeout, DNS, connexion interrompue) ; l'appelant peut réessayer
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Réponse non-2xx du serveur
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// Credential de rafraîchissement invalide ou expiré ; la session est terminée
    #[error("Authentication expired, please sign in again")]
    AuthenticationExpired,

    /// Erreur d'accès au stockage local
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// La purge du miroir n'a pas abouti
    #[error("Mirror purge incomplete, {remaining} entries left")]
    Purge { remaining: usize },

    /// Écriture refusée : aucune file d'attente hors ligne
    #[error("Write rejected while offline")]
    OfflineWriteRejected,

    /// Ressource sans équivalent dans le miroir
    #[error("{0} is not available offline")]
    NotAvailableOffline(String),

    /// Ressource non trouvée (chanson, playlist, etc.)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Erreur de parsing JSON
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Erreur de configuration (anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Échec non fatal du rafraîchissement (réseau, 5xx) ; la session est conservée
    #[error("Credential refresh failed: {0}")]
    RefreshFailed(RefreshError),

    /// Autre erreur du miroir
    #[error("Mirror error: {0}")]
    Mirror(MirrorError),

    /// Erreur générique
    #[error("Lyricbase error: {0}")]
    Other(String),
}

impl LyricbaseError {
    /// Crée une erreur depuis un code de statut HTTP et le corps de la réponse
    pub fn from_status_code(code: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status: code,
            body: body.into(),
        }
    }

    /// Vérifie si l'erreur impose une nouvelle connexion
    pub fn is_auth_error(&self) -> bool {
        matches!(self, LyricbaseError::AuthenticationExpired)
    }

    /// Vérifie si l'erreur est transitoire (l'appelant décide d'un éventuel nouvel essai)
    pub fn is_transient(&self) -> bool {
        match self {
            LyricbaseError::Network(_) => true,
            LyricbaseError::Http { status, .. } => *status == 429 || *status >= 500,
            LyricbaseError::RefreshFailed(e) => !e.is_rejection(),
            _ => false,
        }
    }

    /// Code HTTP associé, si l'erreur en porte un
    pub fn status(&self) -> Option<u16> {
        match self {
            LyricbaseError::Http { status, .. } => Some(*status),
            LyricbaseError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<MirrorError> for LyricbaseError {
    fn from(error: MirrorError) -> Self {
        match error {
            MirrorError::Purge { remaining } => Self::Purge { remaining },
            MirrorError::NotFound(key) => Self::NotFound(key),
            MirrorError::Io(e) => Self::Persistence(e.to_string()),
            MirrorError::Fetch(source) => match source.downcast::<LyricbaseError>() {
                Ok(inner) => *inner,
                Err(other) => Self::Other(other.to_string()),
            },
            other if other.is_storage_error() => Self::Persistence(other.to_string()),
            other => Self::Mirror(other),
        }
    }
}
