use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::account;
use crate::feedback::{stats as feedback_stats, submit as feedback_submit};
use crate::presentations::{attendees, crud as presentation_crud};
use crate::quiz::{answers, questions, reports};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the identity verifier into request extensions so the AuthUser extractor can find it.
async fn inject_verifier(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut().insert(state.verifier.clone());
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting: 10 requests per minute per IP on account endpoints
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(6) // 1 token every 6 seconds = 10 per minute
            .burst_size(10)
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Spawn background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    let auth_routes = Router::new()
        .route("/api/auth/register", post(account::register))
        .route("/api/auth/login", post(account::login))
        .layer(GovernorLayer {
            config: governor_config,
        });

    let account_routes = Router::new().route("/api/auth/profile", get(account::profile));

    let presentation_routes = Router::new()
        .route(
            "/api/presentations",
            get(presentation_crud::list_presentations).post(presentation_crud::create_presentation),
        )
        .route(
            "/api/presentations/{id}",
            get(presentation_crud::get_presentation)
                .put(presentation_crud::update_presentation)
                .delete(presentation_crud::delete_presentation),
        )
        .route("/api/presentations/{id}/add_listener", post(attendees::add_listener))
        .route("/api/presentations/{id}/remove_listener", post(attendees::remove_listener));

    let quiz_routes = Router::new()
        .route(
            "/api/quiz/presentations/{id}/questions",
            get(questions::list_questions).post(questions::create_question),
        )
        .route(
            "/api/quiz/presentations/{id}/active_questions",
            get(questions::list_active_questions),
        )
        .route(
            "/api/quiz/presentations/{id}/active_question",
            get(questions::current_active_question),
        )
        .route(
            "/api/quiz/presentations/{id}/report/{user_id}",
            get(reports::listener_report),
        )
        .route(
            "/api/quiz/presentations/{id}/overall_stats",
            get(reports::overall_stats),
        )
        .route("/api/quiz/questions/{id}/answer", post(answers::submit_answer))
        .route("/api/quiz/questions/{id}/deactivate", post(questions::deactivate_question))
        .route("/api/quiz/questions/{id}/stats", get(reports::question_stats));

    let feedback_routes = Router::new()
        .route(
            "/api/feedback/presentations/{id}/submit",
            post(feedback_submit::submit_feedback),
        )
        .route(
            "/api/feedback/presentations/{id}/stats",
            get(feedback_stats::feedback_stats),
        );

    // WebSocket endpoint (optional token via query param; join carries its own credential)
    let ws_routes = Router::new().route("/ws", get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(auth_routes)
        .merge(account_routes)
        .merge(presentation_routes)
        .merge(quiz_routes)
        .merge(feedback_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(state.clone(), inject_verifier))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
