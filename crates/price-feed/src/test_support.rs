//! In-process HTTP server answering requests with canned responses

use axum::http::{header, StatusCode, Uri};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Start a server on an ephemeral port and return its base URL.
///
/// `respond` receives the request path and body and returns the status code
/// and JSON body to send back.
pub async fn serve<F>(respond: F) -> String
where
    F: Fn(&str, &str) -> (u16, String) + Send + Sync + 'static,
{
    let respond = Arc::new(respond);
    let app = Router::new().fallback(move |uri: Uri, body: String| {
        let respond = Arc::clone(&respond);
        async move {
            let (status, payload) = respond(uri.path(), &body);
            let status = StatusCode::from_u16(status).unwrap();
            (status, [(header::CONTENT_TYPE, "application/json")], payload)
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    format!("http://{}", addr)
}
