//! Order API Handlers
//!
//! Thin adapters over [`crate::orders::OrderAggregator`]: every state
//! change goes through it, and every accepted change is fanned out on the
//! message bus by the aggregator itself.

use axum::{
    Json,
    extract::{Path, State},
};

use crate::core::ServerState;
use crate::utils::{AppError, AppResult};
use shared::order::{Order, OrderSubmission};

/// POST /api/orders - 提交/合并一张桌台的点单
///
/// 200 返回合并后的订单；空商品列表 400；存储失败 500。
pub async fn submit(
    State(state): State<ServerState>,
    Json(submission): Json<OrderSubmission>,
) -> AppResult<Json<Order>> {
    let outcome = state
        .aggregator()
        .submit_order(
            submission.table_id,
            submission.party_size,
            submission.items,
        )
        .await?;
    Ok(Json(outcome.order))
}

/// GET /api/orders/table/{table_id} - 查询桌台的未关闭订单
pub async fn get_active(
    State(state): State<ServerState>,
    Path(table_id): Path<i64>,
) -> AppResult<Json<Order>> {
    let order = state
        .aggregator()
        .get_active_order(table_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("No active order for table {table_id}")))?;
    Ok(Json(order))
}

/// DELETE /api/orders/table/{table_id} - 删除桌台的未关闭订单
pub async fn remove_active(
    State(state): State<ServerState>,
    Path(table_id): Path<i64>,
) -> AppResult<Json<bool>> {
    let removed = state.aggregator().remove_active_order(table_id).await?;
    if !removed {
        return Err(AppError::not_found(format!(
            "No active order for table {table_id}"
        )));
    }
    Ok(Json(true))
}

/// POST /api/orders/table/{table_id}/close - 结账关闭订单
pub async fn close(
    State(state): State<ServerState>,
    Path(table_id): Path<i64>,
) -> AppResult<Json<Order>> {
    let order = state.aggregator().close_order(table_id).await?;
    Ok(Json(order))
}

/// POST /api/orders/table/{table_id}/kitchen - 标记订单已发厨房
pub async fn send_to_kitchen(
    State(state): State<ServerState>,
    Path(table_id): Path<i64>,
) -> AppResult<Json<Order>> {
    let order = state.aggregator().send_to_kitchen(table_id).await?;
    Ok(Json(order))
}
