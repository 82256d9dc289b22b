use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, put},
    Router,
};
use std::future::Future;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::routes::*;
use tcgtracker_core::Repository;

pub fn router(repo: Arc<dyn Repository>, cors_origins: &[String]) -> Router {
    let state = Arc::new(AppState { repo });

    let api = Router::new()
        .route("/decks", get(list_decks).post(create_deck))
        .route("/decks/:deck", get(get_deck).put(update_deck).delete(delete_deck))
        .route("/decks/:deck/composition", get(deck_composition))
        .route("/decks/:deck/cards", put(upsert_card))
        .route("/decks/:deck/cards/:card", delete(remove_card))
        .route("/decks/:deck/decklist", get(deck_list_text))
        .route("/current-deck", get(get_current_deck).put(set_current_deck))
        .route("/history", get(history))
        .route("/matches", get(list_matches).post(create_match))
        .route("/matches/:id", get(get_match).put(update_match).delete(delete_match))
        .route("/stats", get(overall_stats))
        .route("/stats/decks", get(deck_stats))
        .route("/export", get(export))
        .route("/import", axum::routing::post(import))
        .route("/backups", get(list_backups).post(create_backup));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(state)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };
    CorsLayer::new()
        .allow_origin(allow)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
}

/// Serves until `shutdown` resolves, then drains in-flight requests.
pub async fn run<F>(repo: Arc<dyn Repository>, addr: SocketAddr, cors_origins: &[String], shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(repo, cors_origins);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
