use lbclient::{
    ApiSettings, Connectivity, ConnectivityMonitor, ContentMirror, DataSourceSelector,
    LyricbaseApi, LyricbaseClient, LyricbaseError, MemoryCredentialStore, Origin, PlaylistDraft,
    Query, ResourceKind, Song,
};
use mockito::Server;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

fn song(id: &str, title: &str, artist: &str) -> Song {
    serde_json::from_value(json!({"_id": id, "title": title, "artist": artist})).unwrap()
}

fn catalog() -> Vec<Song> {
    vec![
        song("m1", "Amazing Grace", "John Newton"),
        song("m2", "Oceans", "Hillsong United"),
        song("m3", "So Will I", "Hillsong United"),
        song("m4", "It Is Well", "Horatio Spafford"),
    ]
}

async fn mirrored_catalog() -> (TempDir, Arc<ContentMirror<Song>>) {
    let dir = tempfile::tempdir().unwrap();
    let mirror = Arc::new(ContentMirror::new(dir.path(), "songs").unwrap());
    mirror
        .download_all(
            || async { Ok::<_, std::io::Error>(catalog()) },
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    (dir, mirror)
}

fn selector_for(
    base_url: &str,
    mirror: Arc<ContentMirror<Song>>,
    state: Connectivity,
) -> (DataSourceSelector, ConnectivityMonitor) {
    let api = Arc::new(
        LyricbaseApi::new(
            ApiSettings::new(base_url),
            Arc::new(MemoryCredentialStore::new()),
        )
        .unwrap(),
    );
    let connectivity = ConnectivityMonitor::new(state);
    (
        DataSourceSelector::new(api, mirror, connectivity.clone()),
        connectivity,
    )
}

#[tokio::test]
async fn test_offline_reads_come_from_mirror() {
    let mut server = Server::new_async().await;
    let untouched = server
        .mock("GET", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let (_dir, mirror) = mirrored_catalog().await;
    let (selector, _) = selector_for(&server.url(), mirror, Connectivity::Offline);

    let all = selector.read(&ResourceKind::Songs, &Query::All).await.unwrap();
    assert_eq!(all.origin, Origin::Mirror);
    assert_eq!(all.items.len(), 4);

    let one = selector
        .read(&ResourceKind::Songs, &Query::ById("m2".into()))
        .await
        .unwrap()
        .items
        .into_songs()
        .unwrap();
    assert_eq!(one[0].title, "Oceans");

    let found = selector
        .read(&ResourceKind::Songs, &Query::Search("GRACE".into()))
        .await
        .unwrap()
        .items
        .into_songs()
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "m1");

    let artists = selector
        .read(&ResourceKind::Artists, &Query::All)
        .await
        .unwrap()
        .items
        .into_artists()
        .unwrap();
    let names: Vec<&str> = artists.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Hillsong United", "Horatio Spafford", "John Newton"]);

    let by_artist = selector
        .read(
            &ResourceKind::ArtistSongs("hillsong united".into()),
            &Query::All,
        )
        .await
        .unwrap();
    assert_eq!(by_artist.items.len(), 2);

    untouched.assert_async().await;
}

#[tokio::test]
async fn test_offline_playlists_and_writes_fail_fast() {
    let mut server = Server::new_async().await;
    let untouched = server
        .mock("POST", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let (_dir, mirror) = mirrored_catalog().await;
    let (selector, _) = selector_for(&server.url(), mirror, Connectivity::Offline);

    let playlists = selector.read(&ResourceKind::Playlists, &Query::All).await;
    assert!(matches!(playlists, Err(LyricbaseError::NotAvailableOffline(_))));

    let created = selector
        .create_playlist(&PlaylistDraft::new("Sunday", vec!["m1".into()]))
        .await;
    assert!(matches!(created, Err(LyricbaseError::OfflineWriteRejected)));

    let raw = selector
        .request(reqwest::Method::POST, "/playlists/save", Some(&json!({"playlistId": "p1"})))
        .await;
    assert!(matches!(raw, Err(LyricbaseError::OfflineWriteRejected)));

    let missing = selector
        .read(&ResourceKind::Songs, &Query::ById("unknown".into()))
        .await;
    assert!(matches!(missing, Err(LyricbaseError::NotFound(_))));

    untouched.assert_async().await;
}

#[tokio::test]
async fn test_online_reads_go_to_api() {
    let mut server = Server::new_async().await;
    let songs = server
        .mock("GET", "/songs/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!([{"_id": "live1", "title": "Live", "artist": "Band"}]).to_string())
        .expect(1)
        .create_async()
        .await;
    let artists = server
        .mock("GET", "/artists/")
        .with_status(200)
        .with_body(json!([{"_id": "a1", "name": "Band"}, {"_id": "a2", "name": "Choir"}]).to_string())
        .expect(1)
        .create_async()
        .await;

    let (_dir, mirror) = mirrored_catalog().await;
    let (selector, _) = selector_for(&server.url(), mirror, Connectivity::Online);

    let live = selector.read(&ResourceKind::Songs, &Query::All).await.unwrap();
    assert_eq!(live.origin, Origin::Live);
    assert_eq!(live.items.into_songs().unwrap()[0].id, "live1");

    let choir = selector
        .read(&ResourceKind::Artists, &Query::Search("choir".into()))
        .await
        .unwrap()
        .items
        .into_artists()
        .unwrap();
    assert_eq!(choir.len(), 1);
    assert_eq!(choir[0].id.as_deref(), Some("a2"));

    songs.assert_async().await;
    artists.assert_async().await;
}

/// Serveur HTTP minimal qui retient sa réponse jusqu'au signal `release`
async fn held_server(received: Arc<Notify>, release: Arc<Notify>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let _ = socket.read(&mut buf).await.unwrap();
        received.notify_one();
        release.notified().await;

        let body = json!([{"_id": "live1", "title": "Live", "artist": "Band"}]).to_string();
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });

    format!("http://{}", addr)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_going_offline_mid_flight_only_affects_next_read() {
    let received = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let base_url = held_server(received.clone(), release.clone()).await;

    let (_dir, mirror) = mirrored_catalog().await;
    let (selector, connectivity) = selector_for(&base_url, mirror, Connectivity::Online);

    let in_flight = {
        let selector = selector.clone();
        tokio::spawn(async move { selector.read(&ResourceKind::Songs, &Query::All).await })
    };

    received.notified().await;
    assert!(connectivity.report(Connectivity::Offline));
    release.notify_one();

    let live = in_flight.await.unwrap().unwrap();
    assert_eq!(live.origin, Origin::Live);
    assert_eq!(live.items.len(), 1);

    let next = selector.read(&ResourceKind::Songs, &Query::All).await.unwrap();
    assert_eq!(next.origin, Origin::Mirror);
    assert_eq!(next.items.len(), 4);
}

#[tokio::test]
async fn test_client_downloads_catalog_then_purges() {
    let mut server = Server::new_async().await;
    let download = server
        .mock("GET", "/songs/download")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(serde_json::to_string(&catalog()).unwrap())
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(
        LyricbaseApi::new(
            ApiSettings::new(server.url()),
            Arc::new(MemoryCredentialStore::new()),
        )
        .unwrap(),
    );
    let mirror = Arc::new(ContentMirror::new(dir.path(), "songs").unwrap());
    let client = LyricbaseClient::new(api, mirror, ConnectivityMonitor::default());

    let report = client
        .download_songs(None, &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(client.mirror().list().await.unwrap().len(), report.written);
    assert!(client.is_available_offline("m3").await);
    assert_eq!(client.read_mirrored("m3").await.unwrap().title, "So Will I");

    client.purge_downloads().await.unwrap();
    assert!(client.mirror().list().await.unwrap().is_empty());
    assert!(!client.is_available_offline("m3").await);

    download.assert_async().await;
}

#[tokio::test]
async fn test_failed_catalog_fetch_keeps_lyricbase_error() {
    let mut server = Server::new_async().await;
    let _download = server
        .mock("GET", "/songs/download")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(
        LyricbaseApi::new(
            ApiSettings::new(server.url()),
            Arc::new(MemoryCredentialStore::new()),
        )
        .unwrap(),
    );
    let mirror = Arc::new(ContentMirror::new(dir.path(), "songs").unwrap());
    let client = LyricbaseClient::new(api, mirror, ConnectivityMonitor::default());

    let err = client
        .download_songs(None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LyricbaseError::Http { status: 500, .. }));
    assert!(client.mirror().list().await.unwrap().is_empty());
}
