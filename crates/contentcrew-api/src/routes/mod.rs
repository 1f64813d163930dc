mod articles;
mod health;

use articles::article_router;
use axum::Router;
use health::health_router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use articles::{FeedbackPayload, GenerateArticleRequest, JobAccepted, ListQuery};

pub fn build_router(state: AppState) -> Router {
    // The browser frontend is served from a different origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/health", health_router())
        .merge(article_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
