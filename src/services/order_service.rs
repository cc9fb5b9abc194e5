use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::dto::orders::{CancelOrderRequest, CreateOrderRequest, OrderList, OrderWithItems};
use crate::{
    audit::log_audit,
    entity::{
        cart_items::{Column as CartItemCol, Entity as CartItems},
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus, PaymentStatus, ShippingStatus},
    pricing,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// Converts the user's cart into an order. The cart snapshot, the order
/// insert and the cart clear all happen inside one transaction, so a
/// crash cannot leave the order created with the cart still populated.
pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let cart = match cart {
        Some(cart) => cart,
        None => return Err(AppError::BadRequest("Cart is empty".into())),
    };

    let cart_items = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .order_by_asc(CartItemCol::CreatedAt)
        .all(&txn)
        .await?;
    if cart_items.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    // Cart totals are maintained on every mutation, so the subtotal is
    // taken as-is rather than re-derived here.
    let subtotal = cart.total_amount;
    let shipping_cost = pricing::shipping_cost(payload.shipping_method, subtotal);
    let tax = pricing::tax(subtotal);
    let discount = 0;
    let total = pricing::order_total(subtotal, tax, shipping_cost, discount);

    let now = Utc::now();
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        shipping_address: Set(payload.shipping_address),
        billing_address: Set(payload.billing_address),
        payment_method: Set(payload.payment_method),
        shipping_method: Set(payload.shipping_method),
        shipping_cost: Set(shipping_cost),
        subtotal: Set(subtotal),
        tax: Set(tax),
        discount: Set(discount),
        total: Set(total),
        notes: Set(payload.notes),
        order_status: Set(OrderStatus::Pending),
        payment_status: Set(PaymentStatus::Pending),
        shipping_status: Set(ShippingStatus::Pending),
        tracking_number: Set(None),
        payment_details: Set(None),
        estimated_delivery_date: Set(
            pricing::estimated_delivery_date(payload.shipping_method, now).into(),
        ),
        delivered_at: Set(None),
        cancelled_at: Set(None),
        cancellation_reason: Set(None),
        refunded_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    // Deep copy: the order's line items never track later cart or catalog
    // changes.
    let mut order_items: Vec<OrderItem> = Vec::with_capacity(cart_items.len());
    for item in &cart_items {
        let inserted = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(item.product_id),
            quantity: Set(item.quantity),
            price: Set(item.price),
            lens_type: Set(item.lens_type.clone()),
            lens_color: Set(item.lens_color.clone()),
            power: Set(item.power.clone()),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        order_items.push(order_item_from_entity(inserted));
    }

    // Empty the cart (the row itself survives for reuse).
    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;
    let mut cart_active: CartActive = cart.into();
    cart_active.total_items = Set(0);
    cart_active.total_amount = Set(0);
    cart_active.updated_at = Set(now.into());
    cart_active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_create",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total": order.total })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    tracing::info!(order_id = %order.id, user_id = %user.user_id, "order created");

    Ok(ApiResponse::success(
        "Order created",
        OrderWithItems {
            order: order_from_entity(order),
            items: order_items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::OrderStatus.eq(status));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

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
    Ok(ApiResponse::success("Ok", OrderList { items }, Some(meta)))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = find_owned_order(&state.orm, user.user_id, id).await?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Orders can only be cancelled while still pending. Stock was never
/// reserved at creation, so there is nothing to restore.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: CancelOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    if order.order_status != OrderStatus::Pending {
        return Err(AppError::BadRequest("Order cannot be cancelled".into()));
    }

    let mut active: OrderActive = order.into();
    active.order_status = Set(OrderStatus::Cancelled);
    active.cancelled_at = Set(Some(Utc::now().into()));
    active.cancellation_reason = Set(Some(payload.reason.clone()));
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_cancel",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "reason": payload.reason })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order cancelled",
        order_from_entity(order),
        Some(Meta::empty()),
    ))
}

pub(crate) async fn find_owned_order<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    order_id: Uuid,
) -> AppResult<OrderModel> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user_id))
                .add(OrderCol::Id.eq(order_id)),
        )
        .one(conn)
        .await?;
    match order {
        Some(o) => Ok(o),
        None => Err(AppError::NotFound),
    }
}

pub(crate) fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        shipping_address: model.shipping_address,
        billing_address: model.billing_address,
        payment_method: model.payment_method,
        shipping_method: model.shipping_method,
        shipping_cost: model.shipping_cost,
        subtotal: model.subtotal,
        tax: model.tax,
        discount: model.discount,
        total: model.total,
        notes: model.notes,
        order_status: model.order_status,
        payment_status: model.payment_status,
        shipping_status: model.shipping_status,
        tracking_number: model.tracking_number,
        payment_details: model.payment_details,
        estimated_delivery_date: model.estimated_delivery_date.with_timezone(&Utc),
        delivered_at: model.delivered_at.map(|dt| dt.with_timezone(&Utc)),
        cancelled_at: model.cancelled_at.map(|dt| dt.with_timezone(&Utc)),
        cancellation_reason: model.cancellation_reason,
        refunded_at: model.refunded_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        price: model.price,
        lens_type: model.lens_type,
        lens_color: model.lens_color,
        power: model.power,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
