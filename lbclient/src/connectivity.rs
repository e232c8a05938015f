//! Suivi de la connectivité réseau
//!
//! Le [`ConnectivityMonitor`] reçoit les signaux de joignabilité (plateforme
//! ou sonde HTTP) et les diffuse aux abonnés. L'état initial est livré dès
//! l'abonnement et deux états identiques consécutifs ne sont notifiés qu'une
//! fois.

use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// État de connectivité
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(self) -> bool {
        self == Connectivity::Online
    }
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connectivity::Online => write!(f, "ONLINE"),
            Connectivity::Offline => write!(f, "OFFLINE"),
        }
    }
}

type Listener = Arc<dyn Fn(Connectivity) + Send + Sync>;

struct MonitorInner {
    state: watch::Sender<Connectivity>,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_id: AtomicU64,
    /// Sérialise les livraisons pour que les abonnés voient les transitions dans l'ordre
    delivery: Mutex<()>,
}

/// Moniteur de connectivité
///
/// Les callbacks sont appelés de façon synchrone et ne doivent pas rappeler
/// `report` ni `subscribe` sur le même moniteur.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                state: watch::channel(initial).0,
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                delivery: Mutex::new(()),
            }),
        }
    }

    /// État courant
    pub fn current(&self) -> Connectivity {
        *self.inner.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Signale un nouvel état ; renvoie `true` s'il s'agit d'une transition
    pub fn report(&self, state: Connectivity) -> bool {
        let _delivery = self.inner.delivery.lock().unwrap();

        let changed = self.inner.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if !changed {
            return false;
        }

        info!("Connectivity is now {}", state);
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(state);
        }
        true
    }

    /// S'abonne aux changements ; le callback reçoit immédiatement l'état courant
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Connectivity) + Send + Sync + 'static,
    {
        let _delivery = self.inner.delivery.lock().unwrap();

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(callback);
        self.inner
            .listeners
            .lock()
            .unwrap()
            .insert(id, Arc::clone(&listener));

        listener(self.current());
        debug!(id, "Connectivity listener registered");

        Subscription {
            id,
            monitor: Arc::downgrade(&self.inner),
        }
    }

    /// Flux d'états pour les consommateurs asynchrones
    pub fn watch(&self) -> watch::Receiver<Connectivity> {
        self.inner.state.subscribe()
    }

    /// Nombre d'abonnés actifs
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().unwrap().len()
    }

    /// Lance une sonde périodique : toute réponse HTTP vaut ONLINE, un échec
    /// de transport vaut OFFLINE
    pub fn spawn_probe(
        &self,
        client: Client,
        url: String,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            info!("Connectivity probe started on {} every {:?}", url, interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let state = match client.get(&url).send().await {
                            Ok(_) => Connectivity::Online,
                            Err(e) => {
                                debug!("Probe failed: {}", e);
                                Connectivity::Offline
                            }
                        };
                        monitor.report(state);
                    }
                }
            }
            info!("Connectivity probe stopped");
        })
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(Connectivity::Online)
    }
}

/// Abonnement ; se désabonne à la destruction
pub struct Subscription {
    id: u64,
    monitor: Weak<MonitorInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.monitor.upgrade() {
            inner.listeners.lock().unwrap().remove(&self.id);
        }
    }
}
