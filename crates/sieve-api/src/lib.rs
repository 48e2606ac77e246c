//! # sieve-api
//!
//! HTTP surface for sieve: source submission and analysis, profiles, the
//! master graph, recommendation jobs and saved items under `/api/v1`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod state;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use handlers::{generations, master, profiles, saved, sources, system};

pub use config::ServerConfig;
pub use error::ApiError;
pub use state::AppState;

/// Descriptor batches can carry a few thousand items.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Time-ordered request ids for log correlation.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the application router.
pub fn router(state: AppState, allowed_origins: Vec<HeaderValue>) -> Router {
    let api = Router::new()
        // Sources
        .route("/sources", get(sources::list_sources))
        .route("/sources/descriptors", post(sources::submit_descriptors))
        .route(
            "/sources/:id",
            get(sources::get_source)
                .patch(sources::update_source)
                .delete(sources::delete_source),
        )
        .route("/sources/:id/descriptors", get(sources::list_descriptors))
        .route("/sources/:id/analyze", post(sources::analyze_source))
        .route("/analyze", post(sources::analyze_all))
        .route("/reanalyze", post(sources::reanalyze_all))
        // Master graph
        .route("/master", get(master::get_master))
        .route("/master/rebuild", post(master::rebuild_master))
        .route("/master/tags", post(master::add_master_tag))
        .route("/master/tags/:tag", delete(master::remove_master_tag))
        .route("/combine", post(master::combine_tags))
        // Profiles
        .route(
            "/profiles",
            get(profiles::list_profiles).post(profiles::create_profile),
        )
        .route(
            "/profiles/:id",
            get(profiles::get_profile)
                .patch(profiles::update_profile)
                .delete(profiles::delete_profile),
        )
        .route("/profiles/:id/tags", post(profiles::add_manual_tag))
        .route("/profiles/:id/tags/:tag", delete(profiles::remove_manual_tag))
        .route("/profiles/:id/graph", get(profiles::profile_graph))
        .route(
            "/profiles/:id/similarities",
            get(profiles::profile_similarities),
        )
        // Generation jobs
        .route("/generations", post(generations::start_generation))
        .route(
            "/generations/:scope_key",
            get(generations::poll_generation).delete(generations::acknowledge_generation),
        )
        .route("/rate-limit", get(generations::rate_limit_status))
        // Saved recommendations
        .route(
            "/saved",
            get(saved::list_saved).post(saved::save_recommendation),
        )
        .route("/saved/:id", delete(saved::delete_saved))
        // Housekeeping
        .route("/stats", get(system::stats))
        .route("/data", delete(system::clear_all));

    Router::new()
        .route("/health", get(system::health_check))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(allowed_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
                .max_age(std::time::Duration::from_secs(3600)),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
