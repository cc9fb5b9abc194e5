use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::dto::cart::{AddToCartRequest, CartValidationReport, UpdateCartItemRequest};
use crate::{
    audit::log_audit,
    entity::{
        cart_items::{
            ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems,
            Model as CartItemModel,
        },
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Cart, CartItem, PrescriptionPower},
    response::{ApiResponse, Meta},
    services::product_service::find_active_product,
    state::AppState,
};

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Cart>> {
    let cart = match find_cart(&state.orm, user.user_id).await? {
        Some(cart) => cart,
        None => create_cart(&state.orm, user.user_id).await?,
    };
    let cart = assemble(&state.orm, cart).await?;
    Ok(ApiResponse::success("OK", cart, Some(Meta::empty())))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<Cart>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }
    validate_power(payload.power.as_ref())?;

    let txn = state.orm.begin().await?;

    // Lock the cart row so concurrent adds for the same user serialize
    // instead of overwriting each other's quantity.
    let cart = match lock_cart(&txn, user.user_id).await? {
        Some(cart) => cart,
        None => create_cart(&txn, user.user_id).await?,
    };

    let product = find_active_product(&txn, payload.product_id).await?;

    let existing = CartItems::find()
        .filter(
            Condition::all()
                .add(CartItemCol::CartId.eq(cart.id))
                .add(CartItemCol::ProductId.eq(product.id)),
        )
        .one(&txn)
        .await?;

    // Merge semantics: quantity accumulates across repeated adds.
    let merged_quantity = existing.as_ref().map_or(0, |item| item.quantity) + payload.quantity;
    if product.stock < merged_quantity {
        return Err(AppError::InsufficientStock(product.id));
    }

    // Always re-snapshot the price at mutation time.
    let price = product.effective_price();

    if let Some(item) = existing {
        let mut active: CartItemActive = item.into();
        active.quantity = Set(merged_quantity);
        active.price = Set(price);
        if payload.lens_type.is_some() {
            active.lens_type = Set(payload.lens_type);
        }
        if payload.lens_color.is_some() {
            active.lens_color = Set(payload.lens_color);
        }
        if payload.power.is_some() {
            active.power = Set(payload.power);
        }
        active.update(&txn).await?;
    } else {
        CartItemActive {
            id: Set(Uuid::new_v4()),
            cart_id: Set(cart.id),
            product_id: Set(product.id),
            quantity: Set(payload.quantity),
            price: Set(price),
            lens_type: Set(payload.lens_type),
            lens_color: Set(payload.lens_color),
            power: Set(payload.power),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
    }

    let cart = recompute_totals(&txn, cart).await?;
    let cart = assemble(&txn, cart).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_add",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": payload.product_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("OK", cart, Some(Meta::empty())))
}

pub async fn update_cart_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<Cart>> {
    if let Some(quantity) = payload.quantity {
        if quantity <= 0 {
            return Err(AppError::BadRequest(
                "quantity must be greater than 0".to_string(),
            ));
        }
    }
    validate_power(payload.power.as_ref())?;

    let txn = state.orm.begin().await?;

    let cart = match lock_cart(&txn, user.user_id).await? {
        Some(cart) => cart,
        None => return Err(AppError::NotFound),
    };

    let item = CartItems::find()
        .filter(
            Condition::all()
                .add(CartItemCol::Id.eq(item_id))
                .add(CartItemCol::CartId.eq(cart.id)),
        )
        .one(&txn)
        .await?;
    let item = match item {
        Some(item) => item,
        None => return Err(AppError::NotFound),
    };

    if let Some(quantity) = payload.quantity {
        let product = find_active_product(&txn, item.product_id).await?;
        if product.stock < quantity {
            return Err(AppError::InsufficientStock(product.id));
        }
    }

    let mut active: CartItemActive = item.into();
    if let Some(quantity) = payload.quantity {
        active.quantity = Set(quantity);
    }
    if payload.lens_type.is_some() {
        active.lens_type = Set(payload.lens_type);
    }
    if payload.lens_color.is_some() {
        active.lens_color = Set(payload.lens_color);
    }
    if payload.power.is_some() {
        active.power = Set(payload.power);
    }
    active.update(&txn).await?;

    let cart = recompute_totals(&txn, cart).await?;
    let cart = assemble(&txn, cart).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({ "item_id": item_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("OK", cart, Some(Meta::empty())))
}

/// Removing an absent item is an error, not a no-op.
pub async fn remove_cart_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<Cart>> {
    let txn = state.orm.begin().await?;

    let cart = match lock_cart(&txn, user.user_id).await? {
        Some(cart) => cart,
        None => return Err(AppError::NotFound),
    };

    let result = CartItems::delete_many()
        .filter(
            Condition::all()
                .add(CartItemCol::Id.eq(item_id))
                .add(CartItemCol::CartId.eq(cart.id)),
        )
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    let cart = recompute_totals(&txn, cart).await?;
    let cart = assemble(&txn, cart).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "item_id": item_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        cart,
        Some(Meta::empty()),
    ))
}

/// Idempotent: clearing an already-empty (or absent) cart succeeds.
pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Cart>> {
    let txn = state.orm.begin().await?;

    let cart = match lock_cart(&txn, user.user_id).await? {
        Some(cart) => cart,
        None => create_cart(&txn, user.user_id).await?,
    };

    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;

    let cart = recompute_totals(&txn, cart).await?;
    let cart = assemble(&txn, cart).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_clear",
        Some("cart_items"),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Cart cleared", cart, Some(Meta::empty())))
}

/// Re-checks every line against the live catalog. Per-item problems are
/// collected instead of failing the call; price drift is silently healed
/// and persisted.
pub async fn validate_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CartValidationReport>> {
    let txn = state.orm.begin().await?;

    let cart = match lock_cart(&txn, user.user_id).await? {
        Some(cart) => cart,
        None => return Err(AppError::BadRequest("Cart is empty".into())),
    };

    let items = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .order_by_asc(CartItemCol::CreatedAt)
        .all(&txn)
        .await?;
    if items.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let mut report = CartValidationReport {
        is_valid: true,
        errors: Vec::new(),
        updated_items: Vec::new(),
    };
    let mut healed = false;

    for item in items {
        let product = Products::find_by_id(item.product_id).one(&txn).await?;
        let product = match product {
            Some(p) if p.is_active => p,
            _ => {
                report.is_valid = false;
                report
                    .errors
                    .push(format!("Product {} is no longer available", item.product_id));
                continue;
            }
        };

        if product.stock < item.quantity {
            report.is_valid = false;
            report
                .errors
                .push(format!("Insufficient stock for \"{}\"", product.name));
            continue;
        }

        let live_price = product.effective_price();
        if live_price != item.price {
            let mut active: CartItemActive = item.into();
            active.price = Set(live_price);
            let updated = active.update(&txn).await?;
            report.updated_items.push(cart_item_from_entity(updated));
            healed = true;
        }
    }

    if healed {
        recompute_totals(&txn, cart).await?;
        tracing::info!(
            user_id = %user.user_id,
            updated = report.updated_items.len(),
            "cart prices re-synced to catalog"
        );
    }
    txn.commit().await?;

    Ok(ApiResponse::success(
        "Cart validated",
        report,
        Some(Meta::empty()),
    ))
}

fn validate_power(power: Option<&PrescriptionPower>) -> AppResult<()> {
    if let Some(power) = power {
        power.validate().map_err(AppError::BadRequest)?;
    }
    Ok(())
}

async fn find_cart<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<Option<CartModel>> {
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(conn)
        .await?;
    Ok(cart)
}

async fn lock_cart<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<Option<CartModel>> {
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .lock(LockType::Update)
        .one(conn)
        .await?;
    Ok(cart)
}

/// Carts are created lazily on first use.
async fn create_cart<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<CartModel> {
    let cart = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        total_items: Set(0),
        total_amount: Set(0),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(conn)
    .await?;
    tracing::info!(user_id = %user_id, cart_id = %cart.id, "cart created");
    Ok(cart)
}

/// Derived totals are always recomputed from the line items before the
/// cart row is persisted; they are never accepted from a caller.
async fn recompute_totals<C: ConnectionTrait>(conn: &C, cart: CartModel) -> AppResult<CartModel> {
    let items = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .all(conn)
        .await?;

    let total_items: i32 = items.iter().map(|item| item.quantity).sum();
    let total_amount: i64 = items
        .iter()
        .map(|item| item.price * item.quantity as i64)
        .sum();

    let mut active: CartActive = cart.into();
    active.total_items = Set(total_items);
    active.total_amount = Set(total_amount);
    active.updated_at = Set(Utc::now().into());
    let cart = active.update(conn).await?;
    Ok(cart)
}

async fn assemble<C: ConnectionTrait>(conn: &C, cart: CartModel) -> AppResult<Cart> {
    let items = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .order_by_asc(CartItemCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(cart_item_from_entity)
        .collect();

    Ok(Cart {
        id: cart.id,
        user_id: cart.user_id,
        items,
        total_items: cart.total_items,
        total_amount: cart.total_amount,
        created_at: cart.created_at.with_timezone(&Utc),
        updated_at: cart.updated_at.with_timezone(&Utc),
    })
}

pub(crate) fn cart_item_from_entity(model: CartItemModel) -> CartItem {
    CartItem {
        id: model.id,
        product_id: model.product_id,
        quantity: model.quantity,
        price: model.price,
        lens_type: model.lens_type,
        lens_color: model.lens_color,
        power: model.power,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
