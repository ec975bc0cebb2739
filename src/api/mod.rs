mod error;
mod handlers;
mod identity;

pub use error::ApiError;
pub use identity::{Caller, USER_ID_HEADER, USER_ROLE_HEADER};

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::observability::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let teachers = Router::new()
        .route(
            "/teachers/{teacher_id}/availability",
            get(handlers::get_availability).put(handlers::put_availability),
        )
        .route("/teachers/{teacher_id}/open-slots", get(handlers::open_slots));

    let reservations = Router::new()
        .route("/reservations", post(handlers::create_reservation))
        .route("/reservations/{id}", get(handlers::get_reservation))
        .route("/reservations/{id}/approve", post(handlers::approve))
        .route("/reservations/{id}/reject", post(handlers::reject))
        .route("/reservations/{id}/cancel", post(handlers::cancel))
        .route("/reservations/{id}/payment-order", post(handlers::attach_payment_order))
        .route("/reservations/{id}/checkout", post(handlers::checkout))
        .route("/payments/confirm", post(handlers::confirm_payment));

    let me = Router::new()
        .route("/me/upcoming", get(handlers::upcoming))
        .route("/me/history", get(handlers::history))
        .route("/me/pending-queue", get(handlers::pending_queue));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(teachers)
        .merge(reservations)
        .merge(me)
        .route_layer(middleware::from_fn(track_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(HTTP_REQUESTS_TOTAL, "route" => route.clone(), "status" => status).increment(1);
    metrics::histogram!(HTTP_REQUEST_DURATION_SECONDS, "route" => route).record(start.elapsed().as_secs_f64());
    response
}
