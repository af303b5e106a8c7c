//! Browser polling client
//!
//! The page is served with the shared secret embedded so the script can sign
//! its requests; `/` is therefore expected to be reachable only by operators.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use crate::AppState;

const INDEX_HTML: &str = include_str!("../ui/index.html");
const APP_JS: &str = include_str!("../ui/app.js");

/// GET /
pub async fn serve_index(State(state): State<AppState>) -> Html<String> {
    Html(INDEX_HTML.replace("{{SHARED_SECRET}}", &state.shared_secret.to_string()))
}

/// GET /static/app.js
pub async fn serve_app_js() -> Response {
    (
        StatusCode::OK,
        [("content-type", "application/javascript")],
        APP_JS,
    )
        .into_response()
}
