//! Local HTTP servers bound to an ephemeral port

use axum::http::header;
use axum::routing::get;
use axum::Router;

/// Serve `router` on 127.0.0.1 and return its base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A media host: `/song.mp3` returns a few bytes, everything else is 404
pub async fn spawn_media_server() -> String {
    let router = Router::new().route(
        "/song.mp3",
        get(|| async { ([(header::CONTENT_TYPE, "audio/mpeg")], b"ID3-remote-audio".to_vec()) }),
    );
    spawn_server(router).await
}
