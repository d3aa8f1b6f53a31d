pub mod auth;
pub mod callbacks;
pub mod errors;
pub mod payments;
pub mod refunds;

use {
    crate::AppState,
    axum::{
        Router,
        routing::{get, post},
    },
    std::time::Duration,
    tower::ServiceBuilder,
    tower_http::{timeout::TimeoutLayer, trace::TraceLayer},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/payments", post(payments::create_payment))
        .route("/v1/payments/cancel", post(payments::cancel_payment))
        .route("/v1/payments/{payment_id}", get(payments::get_payment_by_id))
        .route(
            "/v1/payments/by-merchant-order/{merchant_order_no}",
            get(payments::get_payment_by_merchant_order_no),
        )
        .route(
            "/v1/payments/{payment_id}/refunds",
            get(refunds::list_refunds),
        )
        .route("/v1/refunds", post(refunds::create_refund))
        .route("/v1/refunds/{refund_id}", get(refunds::get_refund))
        .route("/v1/refunds/{refund_id}/sync", post(refunds::sync_refund))
        .route("/v1/callbacks/stripe", post(callbacks::stripe_callback))
        .route("/v1/callbacks/alipay", post(callbacks::alipay_callback))
        .route(
            "/v1/callbacks/wechatpay",
            post(callbacks::wechatpay_callback),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
        .with_state(state)
}
