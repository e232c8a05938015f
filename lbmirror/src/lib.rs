//! # lbmirror - Miroir hors ligne des catalogues Lyricbase
//!
//! Cette crate conserve sur disque une copie d'un catalogue distant (par
//! exemple l'ensemble des chansons) afin de pouvoir le consulter sans réseau.
//!
//! ## Vue d'ensemble
//!
//! - Une entrée par élément, `{mirror_dir}/{catalog}/{key}.json`, sans manifeste
//! - Écriture de chaque entrée en tout-ou-rien (fichier temporaire + renommage)
//! - Téléchargement non transactionnel avec progression `written / total`
//!   et annulation entre deux écritures
//! - Purge complète, prioritaire sur tout téléchargement en cours
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use lbmirror::{ContentMirror, MirrorItem};
//! use serde::{Deserialize, Serialize};
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Song { id: String, title: String }
//!
//! impl MirrorItem for Song {
//!     fn mirror_key(&self) -> &str { &self.id }
//! }
//!
//! # async fn example() -> Result<(), lbmirror::MirrorError> {
//! let mirror = ContentMirror::<Song>::new(".lyricbase/mirror", "songs")?;
//!
//! let report = mirror
//!     .download_all(
//!         || async { Ok::<_, std::io::Error>(vec![Song { id: "1".into(), title: "Hallelujah".into() }]) },
//!         None,
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! assert_eq!(report.written, mirror.list().await?.len());
//!
//! mirror.purge().await?;
//! assert!(mirror.list().await?.is_empty());
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "lbconfig")]
pub mod config_ext;
pub mod download;
pub mod error;
pub mod mirror;

#[cfg(feature = "lbconfig")]
pub use config_ext::MirrorConfigExt;
pub use download::{DownloadHandle, DownloadProgress, DownloadReport, ProgressCallback};
pub use error::{MirrorError, Result};
pub use mirror::{validate_key, ContentMirror, MirrorItem, DEFAULT_PURGE_ATTEMPTS};
