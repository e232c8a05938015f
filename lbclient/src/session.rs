//! Événements de session diffusés aux observateurs (UI, services)

use tokio::sync::broadcast;
use tracing::debug;

/// Capacité du canal d'événements
const EVENT_CAPACITY: usize = 64;

/// Changement d'état de la session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connexion ou inscription réussie
    SignedIn,
    /// Déconnexion explicite
    SignedOut,
    /// Le token de rafraîchissement a été rejeté ; une nouvelle connexion est nécessaire
    Invalidated,
}

/// Émetteur des événements de session
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(EVENT_CAPACITY).0,
        }
    }

    /// S'abonne aux événements futurs
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        debug!(?event, "Session event");
        // Pas d'abonné : l'événement est simplement perdu
        let _ = self.tx.send(event);
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
