use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{auth::AuthenticatedPrincipal, state::AppState};

pub mod auth;
pub mod catalog;
pub mod health;
pub mod requests;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let catalog_routes = Router::new()
        .route("/documents", get(catalog::list_document_types))
        .route("/requirements", get(catalog::list_requirement_types));

    let requests_routes = Router::new()
        .route(
            "/",
            get(requests::list_all_requests).post(requests::create_request),
        )
        .route("/mine", get(requests::list_my_requests))
        .route("/stats", get(requests::request_stats))
        .route("/:id/advance", post(requests::advance_request))
        .route("/:id/attachments", get(requests::list_attachments));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/catalog", catalog_routes)
        .nest("/api/requests", requests_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedPrincipal, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 32))
}
