//! Coordination du rafraîchissement des credentials
//!
//! N requêtes concurrentes dont le token d'accès est rejeté produisent un seul
//! appel à `POST /auth/refresh`. Le premier appelant lance l'échange dans une
//! tâche dédiée ; les suivants attendent le même résultat partagé.

use crate::credentials::{CredentialPair, CredentialStore};
use crate::error::{LyricbaseError, Result};
use crate::session::{SessionEvent, SessionEvents};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Échec d'un échange de rafraîchissement
///
/// Clonable pour être partagé entre tous les appelants en attente.
#[derive(Error, Debug, Clone)]
pub enum RefreshError {
    /// Le serveur refuse le token de rafraîchissement (400, 401, 403)
    #[error("Refresh token rejected ({status})")]
    Rejected { status: u16 },

    /// Échec de transport pendant l'échange
    #[error("Network error during refresh: {0}")]
    Network(Arc<reqwest::Error>),

    /// Autre réponse non-2xx
    #[error("Refresh failed with HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Réponse illisible
    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),

    /// La nouvelle paire n'a pas pu être enregistrée
    #[error("Cannot persist refreshed credentials: {0}")]
    Persistence(String),

    /// La tâche d'échange a été interrompue
    #[error("Refresh task aborted: {0}")]
    Aborted(String),
}

impl RefreshError {
    /// Un rejet termine la session
    pub fn is_rejection(&self) -> bool {
        matches!(self, RefreshError::Rejected { .. })
    }

    /// Classe un code HTTP d'échec
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            400 | 401 | 403 => RefreshError::Rejected { status },
            _ => RefreshError::Http {
                status,
                body: body.into(),
            },
        }
    }
}

impl From<RefreshError> for LyricbaseError {
    fn from(error: RefreshError) -> Self {
        match error {
            RefreshError::Rejected { .. } => LyricbaseError::AuthenticationExpired,
            RefreshError::Http { status, body } => LyricbaseError::Http { status, body },
            RefreshError::Persistence(msg) => LyricbaseError::Persistence(msg),
            other => LyricbaseError::RefreshFailed(other),
        }
    }
}

/// Tokens renvoyés par l'endpoint de rafraîchissement
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedTokens {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    /// Absent : le token de rafraîchissement précédent reste valable
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,
    #[serde(rename = "expiresAt", default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl RefreshedTokens {
    /// Construit la nouvelle paire à partir de la précédente
    pub fn into_pair(self, previous: &CredentialPair) -> CredentialPair {
        CredentialPair {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .unwrap_or_else(|| previous.refresh_token.clone()),
            expires_at: self.expires_at,
            issued_at: Some(Utc::now()),
        }
    }
}

/// Échange d'un token de rafraîchissement contre une nouvelle paire
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> std::result::Result<RefreshedTokens, RefreshError>;
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

/// Échange via `POST /auth/refresh {refreshToken}`
pub struct HttpTokenRefresher {
    client: Client,
    url: String,
}

impl HttpTokenRefresher {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            url: super::join_url(base_url, "/auth/refresh"),
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn exchange(&self, refresh_token: &str) -> std::result::Result<RefreshedTokens, RefreshError> {
        debug!("POST {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RefreshError::Network(Arc::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Refresh endpoint answered {}", status.as_u16());
            return Err(RefreshError::from_status(status.as_u16(), body));
        }

        let text = response
            .text()
            .await
            .map_err(|e| RefreshError::Network(Arc::new(e)))?;
        serde_json::from_str(&text).map_err(|e| RefreshError::InvalidResponse(e.to_string()))
    }
}

/// État observable du coordinateur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    /// Un échange est en cours, partagé par tous les appelants
    Refreshing,
    /// Rafraîchissement rejeté ; terminal jusqu'à la prochaine connexion
    Failed,
}

type RefreshOutcome = std::result::Result<CredentialPair, RefreshError>;
type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

enum Slot {
    Idle,
    Refreshing(PendingRefresh),
    Failed,
}

struct Inner {
    slot: Slot,
    /// Incrémenté à chaque `install` ; un échange lancé avant ne touche plus à rien
    epoch: u64,
}

/// Coordinateur de rafraîchissement : au plus un échange par expiration
pub struct RefreshCoordinator {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    events: SessionEvents,
    inner: Arc<Mutex<Inner>>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        events: SessionEvents,
    ) -> Self {
        Self {
            store,
            refresher,
            events,
            inner: Arc::new(Mutex::new(Inner {
                slot: Slot::Idle,
                epoch: 0,
            })),
        }
    }

    /// État courant
    pub async fn state(&self) -> RefreshState {
        match self.inner.lock().await.slot {
            Slot::Idle => RefreshState::Idle,
            Slot::Refreshing(_) => RefreshState::Refreshing,
            Slot::Failed => RefreshState::Failed,
        }
    }

    /// La session a été invalidée par un rejet
    pub async fn is_failed(&self) -> bool {
        self.state().await == RefreshState::Failed
    }

    /// Installe la paire d'une nouvelle session, ou l'efface avec `None`
    ///
    /// L'écriture a lieu verrou tenu, après le changement d'époque : un
    /// échange lancé sous l'ancienne session ne peut plus l'écraser.
    pub async fn install(&self, pair: Option<&CredentialPair>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.epoch += 1;
        inner.slot = Slot::Idle;
        match pair {
            Some(pair) => self.store.save(pair).await,
            None => self.store.clear().await,
        }
    }

    /// Obtient une paire valide après le rejet du token `rejected`
    ///
    /// Si la paire stockée porte déjà un autre token d'accès, l'expiration a
    /// été traitée par un autre appelant et la paire stockée est renvoyée sans
    /// nouvel échange.
    pub async fn refresh(&self, rejected: Option<&str>) -> Result<CredentialPair> {
        let pending = {
            let mut inner = self.inner.lock().await;
            let existing = match &inner.slot {
                Slot::Failed => return Err(LyricbaseError::AuthenticationExpired),
                Slot::Refreshing(pending) => Some(pending.clone()),
                Slot::Idle => None,
            };

            match existing {
                Some(pending) => pending,
                None => {
                    let current = self
                        .store
                        .load()
                        .await
                        .ok_or(LyricbaseError::AuthenticationExpired)?;

                    if let Some(rejected) = rejected {
                        if current.access_token != rejected {
                            debug!("Access token already refreshed by another request");
                            return Ok(current);
                        }
                    }

                    let pending = self.start(current, inner.epoch);
                    inner.slot = Slot::Refreshing(pending.clone());
                    pending
                }
            }
        };

        pending.await.map_err(LyricbaseError::from)
    }

    /// Lance l'échange dans sa propre tâche
    ///
    /// La tâche va jusqu'au bout même si tous les appelants abandonnent.
    fn start(&self, current: CredentialPair, epoch: u64) -> PendingRefresh {
        let store = Arc::clone(&self.store);
        let refresher = Arc::clone(&self.refresher);
        let events = self.events.clone();
        let inner = Arc::clone(&self.inner);

        info!("Refreshing access token");
        let task = tokio::spawn(async move {
            let exchanged = refresher.exchange(&current.refresh_token).await;

            let mut inner = inner.lock().await;
            if inner.epoch != epoch {
                debug!("Session reset during refresh, discarding result");
                return exchanged.map(|tokens| tokens.into_pair(&current));
            }

            let outcome = match exchanged {
                Ok(tokens) => {
                    let pair = tokens.into_pair(&current);
                    match store.save(&pair).await {
                        Ok(()) => Ok(pair),
                        Err(e) => Err(RefreshError::Persistence(e.to_string())),
                    }
                }
                Err(e) => Err(e),
            };

            match &outcome {
                Ok(_) => {
                    info!("Access token refreshed");
                    inner.slot = Slot::Idle;
                }
                Err(e) if e.is_rejection() => {
                    warn!("Refresh token rejected, ending session");
                    if let Err(e) = store.clear().await {
                        warn!("Cannot clear credentials: {}", e);
                    }
                    inner.slot = Slot::Failed;
                    events.emit(SessionEvent::Invalidated);
                }
                Err(e) => {
                    warn!("Refresh failed, session kept: {}", e);
                    inner.slot = Slot::Idle;
                }
            }
            outcome
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(RefreshError::Aborted(e.to_string())))
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Échangeur factice qui compte ses appels
    struct FakeRefresher {
        calls: AtomicUsize,
        delay: Duration,
        reject: bool,
    }

    impl FakeRefresher {
        fn new(reject: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(50),
                reject,
            })
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn exchange(&self, _refresh_token: &str) -> std::result::Result<RefreshedTokens, RefreshError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.reject {
                Err(RefreshError::Rejected { status: 403 })
            } else {
                Ok(RefreshedTokens {
                    access_token: format!("access-{}", n + 1),
                    refresh_token: None,
                    expires_at: None,
                })
            }
        }
    }

    fn coordinator(
        reject: bool,
    ) -> (Arc<RefreshCoordinator>, Arc<FakeRefresher>, Arc<MemoryCredentialStore>, SessionEvents) {
        let store = Arc::new(MemoryCredentialStore::with_pair(CredentialPair::new(
            "access-1",
            "refresh-1",
        )));
        let refresher = FakeRefresher::new(reject);
        let events = SessionEvents::new();
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            refresher.clone(),
            events.clone(),
        ));
        (coordinator, refresher, store, events)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_exchange() {
        let (coordinator, refresher, store, _) = coordinator(false);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let c = coordinator.clone();
            handles.push(tokio::spawn(async move { c.refresh(Some("access-1")).await }));
        }

        for handle in handles {
            let pair = handle.await.unwrap().unwrap();
            assert_eq!(pair.access_token, "access-2");
            assert_eq!(pair.refresh_token, "refresh-1");
        }

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.load().await.unwrap().access_token, "access-2");
        assert_eq!(coordinator.state().await, RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_stale_rejection_reuses_stored_pair() {
        let (coordinator, refresher, _, _) = coordinator(false);

        coordinator.refresh(Some("access-1")).await.unwrap();
        // un retardataire rejeté avec l'ancien token
        let pair = coordinator.refresh(Some("access-1")).await.unwrap();

        assert_eq!(pair.access_token, "access-2");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejection_ends_session() {
        let (coordinator, refresher, store, events) = coordinator(true);
        let mut rx = events.subscribe();

        let result = coordinator.refresh(Some("access-1")).await;
        assert!(matches!(result, Err(LyricbaseError::AuthenticationExpired)));
        assert!(store.load().await.is_none());
        assert_eq!(coordinator.state().await, RefreshState::Failed);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Invalidated);

        // Terminal : aucun nouvel échange
        let again = coordinator.refresh(None).await;
        assert!(matches!(again, Err(LyricbaseError::AuthenticationExpired)));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        coordinator
            .install(Some(&CredentialPair::new("access-9", "refresh-9")))
            .await
            .unwrap();
        assert_eq!(coordinator.state().await, RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_exchange_survives_dropped_waiters() {
        let (coordinator, refresher, store, _) = coordinator(false);

        let c = coordinator.clone();
        let waiter = tokio::spawn(async move { c.refresh(Some("access-1")).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiter.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.load().await.unwrap().access_token, "access-2");
    }

    /// Échangeur bloqué jusqu'à l'ouverture de `gate`
    struct GatedRefresher {
        started: Arc<Notify>,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl TokenRefresher for GatedRefresher {
        async fn exchange(&self, _refresh_token: &str) -> std::result::Result<RefreshedTokens, RefreshError> {
            self.started.notify_one();
            self.gate.notified().await;
            Ok(RefreshedTokens {
                access_token: "old-session-access-2".to_string(),
                refresh_token: None,
                expires_at: None,
            })
        }
    }

    /// Stockage qui ouvre `gate` juste après avoir écrit, puis traîne
    struct SlowStore {
        pairs: MemoryCredentialStore,
        gate: Arc<Notify>,
    }

    impl SlowStore {
        async fn linger(&self) {
            self.gate.notify_one();
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    #[async_trait]
    impl CredentialStore for SlowStore {
        async fn load(&self) -> Option<CredentialPair> {
            self.pairs.load().await
        }

        async fn save(&self, pair: &CredentialPair) -> Result<()> {
            self.pairs.save(pair).await?;
            if pair.access_token == "access-9" {
                self.linger().await;
            }
            Ok(())
        }

        async fn clear(&self) -> Result<()> {
            self.pairs.clear().await?;
            self.linger().await;
            Ok(())
        }
    }

    fn gated_coordinator() -> (Arc<RefreshCoordinator>, Arc<SlowStore>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());
        let store = Arc::new(SlowStore {
            pairs: MemoryCredentialStore::with_pair(CredentialPair::new("access-1", "refresh-1")),
            gate: gate.clone(),
        });
        let refresher = Arc::new(GatedRefresher {
            started: started.clone(),
            gate,
        });
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            refresher,
            SessionEvents::new(),
        ));
        (coordinator, store, started)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sign_in_during_refresh_keeps_new_pair() {
        let (coordinator, store, started) = gated_coordinator();

        let c = coordinator.clone();
        let pending = tokio::spawn(async move { c.refresh(Some("access-1")).await });
        started.notified().await;

        coordinator
            .install(Some(&CredentialPair::new("access-9", "refresh-9")))
            .await
            .unwrap();
        pending.await.unwrap().unwrap();

        let pair = store.load().await.unwrap();
        assert_eq!(pair.access_token, "access-9");
        assert_eq!(pair.refresh_token, "refresh-9");
        assert_eq!(coordinator.state().await, RefreshState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sign_out_during_refresh_stays_signed_out() {
        let (coordinator, store, started) = gated_coordinator();

        let c = coordinator.clone();
        let pending = tokio::spawn(async move { c.refresh(Some("access-1")).await });
        started.notified().await;

        coordinator.install(None).await.unwrap();
        pending.await.unwrap().unwrap();

        assert!(store.load().await.is_none());
    }

    #[test]
    fn test_status_classification() {
        assert!(RefreshError::from_status(400, "").is_rejection());
        assert!(RefreshError::from_status(401, "").is_rejection());
        assert!(RefreshError::from_status(403, "").is_rejection());
        assert!(!RefreshError::from_status(500, "").is_rejection());
    }
}
