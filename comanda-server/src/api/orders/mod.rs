//! Order API 模块

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/orders", post(handler::submit))
        .route(
            "/api/orders/table/{table_id}",
            get(handler::get_active).delete(handler::remove_active),
        )
        .route("/api/orders/table/{table_id}/close", post(handler::close))
        .route(
            "/api/orders/table/{table_id}/kitchen",
            post(handler::send_to_kitchen),
        )
}
