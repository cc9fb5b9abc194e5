use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::dto::orders::{OrderList, OrderWithItems};
use crate::dto::payments::PaymentList;
use crate::routes::admin::{DashboardStats, RecentOrder, UpdateOrderStatusRequest, UserList};
use crate::{
    audit::log_audit,
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        payments::{Column as PaymentCol, Entity as Payments},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderStatus, User},
    response::{ApiResponse, Meta},
    routes::params::{AdminOrderQuery, AdminPaymentQuery, Pagination},
    services::order_service::{order_from_entity, order_item_from_entity},
    services::payment_service::payment_from_entity,
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: AdminOrderQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::OrderStatus.eq(status));
    }
    if let Some(payment_status) = query.payment_status {
        condition = condition.add(OrderCol::PaymentStatus.eq(payment_status));
    }

    let finder = Orders::find()
        .filter(condition)
        .order_by_desc(OrderCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("OK", OrderList { items }, Some(meta)))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;

    let order = Orders::find_by_id(id).one(&state.orm).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Order found",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Status writes go through the order state machine; arbitrary jumps are
/// rejected even for admins.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    if !order.order_status.can_transition_to(payload.order_status) {
        return Err(AppError::BadRequest(format!(
            "cannot transition order from {} to {}",
            order.order_status.as_str(),
            payload.order_status.as_str()
        )));
    }

    let now = Utc::now();
    let mut active: OrderActive = order.into();
    active.order_status = Set(payload.order_status);
    match payload.order_status {
        OrderStatus::Delivered => {
            active.delivered_at = Set(Some(now.into()));
        }
        OrderStatus::Cancelled => {
            active.cancelled_at = Set(Some(now.into()));
        }
        _ => {}
    }
    if let Some(shipping_status) = payload.shipping_status {
        active.shipping_status = Set(shipping_status);
    }
    if let Some(tracking_number) = payload.tracking_number {
        active.tracking_number = Set(Some(tracking_number));
    }
    active.updated_at = Set(now.into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order.id,
            "status": order.order_status.as_str(),
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order updated",
        order_from_entity(order),
        Some(Meta::empty()),
    ))
}

/// Aggregate counts plus the five most recent orders, for the admin
/// dashboard.
pub async fn get_dashboard_stats(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<DashboardStats>> {
    ensure_admin(user)?;

    let (total_users,): (i64,) = sqlx::query_as("SELECT count(*) FROM users")
        .fetch_one(&state.pool)
        .await?;
    let (total_orders,): (i64,) = sqlx::query_as("SELECT count(*) FROM orders")
        .fetch_one(&state.pool)
        .await?;
    let (total_products,): (i64,) = sqlx::query_as("SELECT count(*) FROM products")
        .fetch_one(&state.pool)
        .await?;

    let recent_orders = sqlx::query_as::<_, RecentOrder>(
        r#"
        SELECT o.id, u.name AS customer_name, o.total AS amount,
               o.order_status AS status, o.created_at
        FROM orders o
        JOIN users u ON u.id = o.user_id
        ORDER BY o.created_at DESC
        LIMIT 5
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    let stats = DashboardStats {
        total_users,
        total_orders,
        total_products,
        recent_orders,
    };
    Ok(ApiResponse::success("OK", stats, Some(Meta::empty())))
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let items = sqlx::query_as::<_, User>(
        "SELECT * FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as("SELECT count(*) FROM users")
        .fetch_one(&state.pool)
        .await?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("OK", UserList { items }, Some(meta)))
}

pub async fn list_all_payments(
    state: &AppState,
    user: &AuthUser,
    query: AdminPaymentQuery,
) -> AppResult<ApiResponse<PaymentList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(PaymentCol::PaymentStatus.eq(status));
    }
    if let Some(method) = query.method {
        condition = condition.add(PaymentCol::PaymentMethod.eq(method));
    }

    let finder = Payments::find()
        .filter(condition)
        .order_by_desc(PaymentCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(payment_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("OK", PaymentList { items }, Some(meta)))
}
