use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, with_security_headers, Config};
use crate::handlers::{health_check, reviews, rewards, transactions};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/users", post(rewards::register_user))
        .route("/transactions", post(transactions::create_transaction))
        .route("/transactions/:id", get(transactions::get_transaction))
        .route(
            "/transactions/:id/payment-proof",
            post(transactions::upload_payment_proof),
        )
        .route("/transactions/:id/payment", post(transactions::retry_payment))
        .route("/transactions/:id/approve", post(transactions::approve_transaction))
        .route("/transactions/:id/reject", post(transactions::reject_transaction))
        .route("/transactions/:id/cancel", post(transactions::cancel_transaction))
        .route("/events/:id/reviews", post(reviews::create_review))
        .route("/vouchers", post(rewards::issue_voucher))
        .route("/rewards/:prize_id/redeem", post(rewards::redeem_prize))
        .with_state(state);

    with_security_headers(api, config.production)
        .layer(create_cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
}
