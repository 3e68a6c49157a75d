//! Static assets compiled into the binary

use axum::{
    extract::Path,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "static/"]
struct Assets;

const INDEX: &str = "home.html";

/// `GET /`: the test form
pub async fn index() -> Response {
    match Assets::get(INDEX) {
        Some(file) => Html(file.data.into_owned()).into_response(),
        None => (StatusCode::NOT_FOUND, "home.html not bundled").into_response(),
    }
}

/// `GET /static/*path`
pub async fn static_asset(Path(path): Path<String>) -> Response {
    let path = path.trim_start_matches('/');
    match Assets::get(path) {
        Some(file) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref().to_string())],
                file.data.into_owned(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}
