//! Téléchargement du catalogue pour une utilisation hors ligne
//!
//! Cet exemple montre comment :
//! - Télécharger toutes les chansons dans le miroir avec une barre de progression
//! - Relire le miroir en mode hors ligne
//! - Supprimer les téléchargements
//!
//! Le client doit déjà être connecté (credentials présents dans le répertoire
//! de session).

use lbclient::{Connectivity, LyricbaseClient, Query, ResourceKind};
use std::io::Write;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = lbconfig::get_config();
    lbclient::logging::init_logging(&config);

    let client = LyricbaseClient::from_config_obj(&config)?;

    println!("=== Téléchargement du catalogue ===");
    println!("Miroir : {}\n", client.mirror().directory().display());

    let handle = client.spawn_song_download();
    let mut progress = handle.progress();

    // Ctrl-C annule proprement entre deux écritures
    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    while progress.changed().await.is_ok() {
        let p = *progress.borrow_and_update();
        let filled = (p.fraction() * 40.0) as usize;
        print!(
            "\r[{}{}] {:>3.0}% ({}/{})",
            "#".repeat(filled),
            "-".repeat(40 - filled),
            p.percent(),
            p.written,
            p.total
        );
        std::io::stdout().flush()?;
    }
    println!();

    let report = handle.wait().await?;
    if report.is_complete() {
        println!("✓ {} chanson(s) téléchargée(s)", report.written);
    } else {
        println!(
            "Téléchargement partiel : {}/{} (annulé : {}, interrompu : {})",
            report.written, report.total, report.cancelled, report.interrupted
        );
    }

    println!("\n--- Lecture hors ligne ---");
    client.connectivity().report(Connectivity::Offline);

    let artists = client.read(&ResourceKind::Artists, &Query::All).await?;
    println!("{} artiste(s) ({:?})", artists.items.len(), artists.origin);

    let songs = client.read(&ResourceKind::Songs, &Query::All).await?;
    for song in songs.items.into_songs().unwrap_or_default().iter().take(5) {
        println!("  {} - {}", song.artist, song.title);
    }

    println!("\n--- Suppression ---");
    client.purge_downloads().await?;
    println!("✓ Miroir vidé ({} entrée(s))", client.mirror().count().await?);
    Ok(())
}
