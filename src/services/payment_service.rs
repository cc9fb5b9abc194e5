use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::dto::payments::{PaymentList, PaymentWithOrder, ProcessPaymentRequest, RefundRequest};
use crate::{
    audit::log_audit,
    entity::{
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        payments::{
            ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments,
            Model as PaymentModel,
        },
    },
    error::{AppError, AppResult},
    gateway::ChargeRequest,
    middleware::auth::AuthUser,
    models::{Order, OrderStatus, Payment, PaymentStatus, PaymentSummary},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::order_service::order_from_entity,
    state::AppState,
};

const CURRENCY: &str = "USD";

/// Charges an order. A pending payment row is committed before the
/// gateway is called so every attempt leaves a trace; a failed attempt
/// is kept as-is and a retry creates a fresh record.
pub async fn process_payment(
    state: &AppState,
    user: &AuthUser,
    payload: ProcessPaymentRequest,
) -> AppResult<ApiResponse<PaymentWithOrder>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(payload.order_id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    if order.payment_status == PaymentStatus::Completed {
        return Err(AppError::Conflict("Order is already paid".into()));
    }

    if !payload.payment_details.matches(order.payment_method) {
        return Err(AppError::BadRequest(
            "payment details do not match the order's payment method".into(),
        ));
    }

    let payment = PaymentActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        user_id: Set(user.user_id),
        amount: Set(order.total),
        currency: Set(CURRENCY.to_string()),
        payment_method: Set(order.payment_method),
        payment_status: Set(PaymentStatus::Pending),
        payment_gateway: Set(state.gateway.name().to_string()),
        transaction_id: Set(build_transaction_id()),
        payment_details: Set(payload.payment_details.clone()),
        error_code: Set(None),
        error_message: Set(None),
        payment_date: Set(None),
        refund_amount: Set(None),
        refund_reason: Set(None),
        refund_date: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    let charge = state
        .gateway
        .charge(ChargeRequest {
            transaction_id: &payment.transaction_id,
            amount: payment.amount,
            currency: &payment.currency,
            method: payment.payment_method,
            details: &payment.payment_details,
        })
        .await;

    match charge {
        Ok(()) => {
            let now = Utc::now();
            let txn = state.orm.begin().await?;

            // The order lock was released before the gateway call, so another
            // attempt may have completed in the meantime. Re-check under a
            // fresh lock; the loser is voided instead of double-completing.
            let order = Orders::find_by_id(order.id)
                .lock(LockType::Update)
                .one(&txn)
                .await?
                .ok_or(AppError::NotFound)?;
            if order.payment_status == PaymentStatus::Completed {
                let mut payment_active: PaymentActive = payment.into();
                payment_active.payment_status = Set(PaymentStatus::Failed);
                payment_active.error_code = Set(Some("duplicate_payment".into()));
                payment_active.error_message =
                    Set(Some("order was completed by a concurrent attempt".into()));
                payment_active.updated_at = Set(now.into());
                payment_active.update(&txn).await?;
                txn.commit().await?;
                return Err(AppError::Conflict("Order is already paid".into()));
            }

            let summary = PaymentSummary {
                transaction_id: payment.transaction_id.clone(),
                payment_gateway: payment.payment_gateway.clone(),
                payment_date: now,
            };

            let mut payment_active: PaymentActive = payment.into();
            payment_active.payment_status = Set(PaymentStatus::Completed);
            payment_active.payment_date = Set(Some(now.into()));
            payment_active.updated_at = Set(now.into());
            let payment = payment_active.update(&txn).await?;

            let mut order_active: OrderActive = order.into();
            order_active.payment_status = Set(PaymentStatus::Completed);
            order_active.payment_details = Set(Some(summary));
            order_active.updated_at = Set(now.into());
            let order = order_active.update(&txn).await?;

            txn.commit().await?;

            if let Err(err) = log_audit(
                &state.pool,
                Some(user.user_id),
                "payment_completed",
                Some("payments"),
                Some(serde_json::json!({
                    "order_id": order.id,
                    "payment_id": payment.id,
                    "amount": payment.amount,
                })),
            )
            .await
            {
                tracing::warn!(error = %err, "audit log failed");
            }

            Ok(ApiResponse::success(
                "Payment recorded",
                PaymentWithOrder {
                    payment: payment_from_entity(payment),
                    order: order_from_entity(order),
                },
                Some(Meta::empty()),
            ))
        }
        Err(gateway_err) => {
            tracing::warn!(
                payment_id = %payment.id,
                order_id = %order.id,
                code = %gateway_err.code,
                message = %gateway_err.message,
                "gateway declined charge"
            );

            let now = Utc::now();
            let txn = state.orm.begin().await?;
            let payment_id = payment.id;
            let mut payment_active: PaymentActive = payment.into();
            payment_active.payment_status = Set(PaymentStatus::Failed);
            payment_active.error_code = Set(Some(gateway_err.code));
            payment_active.error_message = Set(Some(gateway_err.message));
            payment_active.updated_at = Set(now.into());
            payment_active.update(&txn).await?;
            txn.commit().await?;

            if let Err(err) = log_audit(
                &state.pool,
                Some(user.user_id),
                "payment_failed",
                Some("payments"),
                Some(serde_json::json!({ "order_id": order.id, "payment_id": payment_id })),
            )
            .await
            {
                tracing::warn!(error = %err, "audit log failed");
            }

            Err(AppError::GatewayFailure(
                "Payment processing failed".into(),
            ))
        }
    }
}

pub async fn get_payment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Payment>> {
    let payment = find_owned_payment(&state.orm, user.user_id, id).await?;
    Ok(ApiResponse::success(
        "OK",
        payment_from_entity(payment),
        Some(Meta::empty()),
    ))
}

pub async fn list_my_payments(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<PaymentList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = Payments::find()
        .filter(PaymentCol::UserId.eq(user.user_id))
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

/// Full refund of a completed payment. Delivered orders are final and
/// cannot be refunded.
pub async fn request_refund(
    state: &AppState,
    user: &AuthUser,
    payment_id: Uuid,
    payload: RefundRequest,
) -> AppResult<ApiResponse<PaymentWithOrder>> {
    let payment = find_owned_payment(&state.orm, user.user_id, payment_id).await?;

    if payment.payment_status != PaymentStatus::Completed {
        return Err(AppError::BadRequest(
            "Only completed payments can be refunded".into(),
        ));
    }

    let order = Orders::find_by_id(payment.order_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("payment references missing order")))?;

    if order.order_status == OrderStatus::Delivered {
        return Err(AppError::BadRequest("Cannot refund delivered orders".into()));
    }

    if let Err(gateway_err) = state
        .gateway
        .refund(&payment.transaction_id, payment.amount)
        .await
    {
        tracing::warn!(
            payment_id = %payment.id,
            code = %gateway_err.code,
            message = %gateway_err.message,
            "gateway declined refund"
        );
        return Err(AppError::GatewayFailure("Refund processing failed".into()));
    }

    let now = Utc::now();
    let txn = state.orm.begin().await?;

    // Re-check under lock: the gateway call ran outside the transaction.
    let locked = Payments::find_by_id(payment.id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    if locked.payment_status != PaymentStatus::Completed {
        return Err(AppError::Conflict("Payment is no longer refundable".into()));
    }

    let amount = locked.amount;
    let mut payment_active: PaymentActive = locked.into();
    payment_active.payment_status = Set(PaymentStatus::Refunded);
    payment_active.refund_amount = Set(Some(amount));
    payment_active.refund_reason = Set(Some(payload.reason.clone()));
    payment_active.refund_date = Set(Some(now.into()));
    payment_active.updated_at = Set(now.into());
    let payment = payment_active.update(&txn).await?;

    let mut order_active: OrderActive = order.into();
    order_active.payment_status = Set(PaymentStatus::Refunded);
    order_active.refunded_at = Set(Some(now.into()));
    order_active.updated_at = Set(now.into());
    let order = order_active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "payment_refunded",
        Some("payments"),
        Some(serde_json::json!({
            "payment_id": payment.id,
            "order_id": order.id,
            "reason": payload.reason,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Refund recorded",
        PaymentWithOrder {
            payment: payment_from_entity(payment),
            order: order_from_entity(order),
        },
        Some(Meta::empty()),
    ))
}

async fn find_owned_payment<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    payment_id: Uuid,
) -> AppResult<PaymentModel> {
    let payment = Payments::find()
        .filter(
            Condition::all()
                .add(PaymentCol::UserId.eq(user_id))
                .add(PaymentCol::Id.eq(payment_id)),
        )
        .one(conn)
        .await?;
    match payment {
        Some(p) => Ok(p),
        None => Err(AppError::NotFound),
    }
}

/// Timestamp plus a UUID-derived suffix; the UUID comes from the OS
/// random source, so collisions are negligible.
fn build_transaction_id() -> String {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("TXN-{}-{}", stamp, &suffix[..12].to_uppercase())
}

pub(crate) fn payment_from_entity(model: PaymentModel) -> Payment {
    Payment {
        id: model.id,
        order_id: model.order_id,
        user_id: model.user_id,
        amount: model.amount,
        currency: model.currency,
        payment_method: model.payment_method,
        payment_status: model.payment_status,
        payment_gateway: model.payment_gateway,
        transaction_id: model.transaction_id,
        error_code: model.error_code,
        error_message: model.error_message,
        payment_date: model.payment_date.map(|dt| dt.with_timezone(&Utc)),
        refund_amount: model.refund_amount,
        refund_reason: model.refund_reason,
        refund_date: model.refund_date.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
    }
}
