//! # lbclient - Client Lyricbase
//!
//! Cette crate fournit la couche d'accès aux données de Lyricbase (paroles,
//! accords, artistes, playlists) : requêtes authentifiées avec
//! rafraîchissement transparent du token, et lecture hors ligne depuis un
//! miroir local du catalogue.
//!
//! ## Vue d'ensemble
//!
//! - `LyricbaseApi` : pipeline de requêtes ; ajoute `Authorization: Bearer`,
//!   et sur un 401 rafraîchit le token puis renvoie la requête une fois
//! - `RefreshCoordinator` : un seul échange de token par expiration, quel que
//!   soit le nombre de requêtes concurrentes
//! - `CredentialStore` : persistance de la paire de tokens
//! - `ConnectivityMonitor` : état ONLINE/OFFLINE et notifications
//! - `DataSourceSelector` : API en ligne, miroir `lbmirror` hors ligne
//! - `LyricbaseClient` : assemblage de l'ensemble depuis `lbconfig`
//!
//! ## Structure des modules
//!
//! ```text
//! lbclient/
//! ├── src/
//! │   ├── lib.rs              # Module principal (ce fichier)
//! │   ├── client.rs           # Client haut-niveau
//! │   ├── models.rs           # Structures de données
//! │   ├── credentials.rs      # Stockage des tokens
//! │   ├── session.rs          # Événements de session
//! │   ├── connectivity.rs     # Moniteur de connectivité
//! │   ├── selector.rs         # Choix de la source de données
//! │   ├── api/
//! │   │   ├── mod.rs          # Pipeline de requêtes
//! │   │   ├── refresh.rs      # Rafraîchissement coordonné
//! │   │   ├── auth.rs         # Connexion, inscription, OTP
//! │   │   ├── catalog.rs      # Chansons et artistes
//! │   │   ├── playlists.rs    # Playlists
//! │   │   └── user.rs         # Demandes de chansons
//! │   ├── config_ext.rs       # Extension lbconfig
//! │   ├── logging.rs          # Initialisation de tracing
//! │   └── error.rs            # Gestion des erreurs
//! ```
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use lbclient::{LyricbaseClient, Query, ResourceKind};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = lbconfig::get_config();
//!     lbclient::logging::init_logging(&config);
//!
//!     let client = LyricbaseClient::from_config_obj(&config)?;
//!     client.api().sign_in("ana@example.com", "secret").await?;
//!
//!     let selection = client
//!         .read(&ResourceKind::Songs, &Query::Search("grace".into()))
//!         .await?;
//!     println!("{} songs ({:?})", selection.items.len(), selection.origin);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config_ext;
pub mod connectivity;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod models;
pub mod selector;
pub mod session;

pub use api::refresh::{
    HttpTokenRefresher, RefreshCoordinator, RefreshError, RefreshState, RefreshedTokens,
    TokenRefresher,
};
pub use api::{ApiSettings, LyricbaseApi, RequestOptions};
pub use client::{LyricbaseClient, SONGS_CATALOG};
pub use config_ext::LyricbaseConfigExt;
pub use connectivity::{Connectivity, ConnectivityMonitor, Subscription};
pub use credentials::{CredentialPair, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{LyricbaseError, Result};
pub use models::*;
pub use selector::{DataSourceSelector, Items, Origin, Query, ResourceKind, Selection};
pub use session::{SessionEvent, SessionEvents};

// Re-exports pour faciliter l'utilisation
pub use lbmirror::{ContentMirror, DownloadHandle, DownloadProgress, DownloadReport, ProgressCallback};
