//! Suivi des téléchargements du miroir
//!
//! [`ContentMirror::download_all`] rapporte sa progression via un callback ;
//! [`ContentMirror::spawn_download`] lance le même téléchargement dans une
//! tâche et expose la progression sous forme de flux `watch`, avec une
//! annulation et un résultat final.

use crate::error::{MirrorError, Result};
use crate::mirror::{ContentMirror, MirrorItem};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Callback de progression
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Progression d'un téléchargement : `written / total`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadProgress {
    /// Entrées écrites jusqu'ici
    pub written: usize,
    /// Nombre d'entrées à écrire
    pub total: usize,
}

impl DownloadProgress {
    /// Fraction accomplie, entre 0.0 et 1.0
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.written as f64 / self.total as f64
        }
    }

    /// Pourcentage accompli
    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }
}

/// Résultat final d'un téléchargement
///
/// Un téléchargement partiel n'est pas une erreur : `written` indique ce qui
/// a été conservé sur disque.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    pub written: usize,
    pub total: usize,
    /// Arrêté par le jeton d'annulation
    pub cancelled: bool,
    /// Arrêté par une purge concurrente
    pub interrupted: bool,
}

impl DownloadReport {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            written: 0,
            total,
            cancelled: false,
            interrupted: false,
        }
    }

    /// Toutes les entrées ont été écrites
    pub fn is_complete(&self) -> bool {
        !self.cancelled && !self.interrupted && self.written == self.total
    }
}

/// Téléchargement lancé en tâche de fond
pub struct DownloadHandle {
    progress: watch::Receiver<DownloadProgress>,
    cancel: CancellationToken,
    task: JoinHandle<Result<DownloadReport>>,
}

impl DownloadHandle {
    /// Flux de progression ; la dernière valeur est toujours disponible
    pub fn progress(&self) -> watch::Receiver<DownloadProgress> {
        self.progress.clone()
    }

    /// Demande l'arrêt avant la prochaine écriture
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Jeton d'annulation partagé avec la tâche
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Attend le résultat final
    pub async fn wait(self) -> Result<DownloadReport> {
        self.task
            .await
            .map_err(|e| MirrorError::Task(e.to_string()))?
    }
}

impl<T: MirrorItem> ContentMirror<T> {
    /// Lance [`download_all`](ContentMirror::download_all) dans une tâche tokio
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let handle = mirror.spawn_download(move || async move { api.fetch_all().await });
    /// let mut progress = handle.progress();
    /// while progress.changed().await.is_ok() {
    ///     println!("{:.0}%", progress.borrow().percent());
    /// }
    /// let report = handle.wait().await?;
    /// ```
    pub fn spawn_download<F, Fut, E>(self: &Arc<Self>, fetcher: F) -> DownloadHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<Vec<T>, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let (tx, rx) = watch::channel(DownloadProgress::default());
        let cancel = CancellationToken::new();

        let mirror = Arc::clone(self);
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let on_progress: ProgressCallback = Arc::new(move |progress| {
                tx.send_replace(progress);
            });
            mirror.download_all(fetcher, Some(on_progress), &token).await
        });

        DownloadHandle {
            progress: rx,
            cancel,
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction() {
        let p = DownloadProgress {
            written: 1,
            total: 4,
        };
        assert_eq!(p.fraction(), 0.25);
        assert_eq!(p.percent(), 25.0);
        assert_eq!(DownloadProgress::default().fraction(), 1.0);
    }

    #[test]
    fn test_report_completeness() {
        let mut report = DownloadReport::new(2);
        assert!(!report.is_complete());
        report.written = 2;
        assert!(report.is_complete());
        report.cancelled = true;
        assert!(!report.is_complete());
    }
}
