//! Exemple d'utilisation basique de lbclient
//!
//! Cet exemple montre comment :
//! - Se connecter avec un email et un mot de passe
//! - Parcourir les chansons et les artistes
//! - Rechercher une chanson
//!
//! Usage : `cargo run --example basic_usage -- <email> <password>`

use lbclient::{LyricbaseClient, Query, ResourceKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = lbconfig::get_config();
    lbclient::logging::init_logging(&config);

    let mut args = std::env::args().skip(1);
    let (email, password) = match (args.next(), args.next()) {
        (Some(email), Some(password)) => (email, password),
        _ => anyhow::bail!("usage: basic_usage <email> <password>"),
    };

    println!("=== lbclient - Exemple d'utilisation basique ===\n");

    let client = LyricbaseClient::from_config_obj(&config)?;

    println!("Connexion à {}...", client.api().base_url());
    let user = client.api().sign_in(&email, &password).await?;
    println!("✓ Connecté en tant que {}", user.name.as_deref().unwrap_or(&email));

    println!("\n--- Chansons ---");
    let count = client.api().song_count().await?;
    println!("{} chanson(s) au catalogue", count);

    let songs = client.read(&ResourceKind::Songs, &Query::All).await?;
    for song in songs.items.into_songs().unwrap_or_default().iter().take(5) {
        println!("  {} - {}", song.artist, song.title);
    }

    println!("\n--- Artistes ---");
    let artists = client.api().artists().await?;
    for artist in artists.iter().take(5) {
        println!("  {}", artist.name);
    }

    println!("\n--- Recherche ---");
    let query = "grace";
    let found = client
        .read(&ResourceKind::Songs, &Query::Search(query.to_string()))
        .await?;
    println!("'{}' : {} résultat(s) ({:?})", query, found.items.len(), found.origin);

    client.api().sign_out().await?;
    println!("\n✓ Déconnecté");
    Ok(())
}
