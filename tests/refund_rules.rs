use std::sync::Arc;

use optika_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        cart::AddToCartRequest,
        orders::CreateOrderRequest,
        payments::{ProcessPaymentRequest, RefundRequest},
    },
    entity::{products::ActiveModel as ProductActive, users::ActiveModel as UserActive},
    error::AppError,
    gateway::SandboxGateway,
    middleware::auth::AuthUser,
    models::{
        Address, CardDetails, OrderStatus, PaymentDetails, PaymentMethod, PaymentStatus,
        ShippingMethod, ShippingStatus,
    },
    routes::admin::UpdateOrderStatusRequest,
    services::{admin_service, cart_service, order_service, payment_service},
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

fn address() -> Address {
    Address {
        street: "1 Test Street".into(),
        city: "Testville".into(),
        state: "TS".into(),
        country: "US".into(),
        zip_code: "00001".into(),
        phone: "+1000000000".into(),
    }
}

fn card_details() -> PaymentDetails {
    PaymentDetails::CreditCard(CardDetails {
        card_number: "4111111111111111".into(),
        card_holder_name: "Test Holder".into(),
        expiry_date: "12/27".into(),
        card_type: None,
    })
}

// Delivery is final: a completed payment on a delivered order can never
// be refunded.
#[tokio::test]
async fn delivered_orders_cannot_be_refunded() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;
    let user_id = create_user(&state, "user", "refund@example.com").await?;
    let admin_id = create_user(&state, "admin", "refund-admin@example.com").await?;
    let auth_user = AuthUser {
        user_id,
        role: "user".into(),
    };
    let auth_admin = AuthUser {
        user_id: admin_id,
        role: "admin".into(),
    };

    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set("Delivered Frame".into()),
        description: NotSet,
        brand: NotSet,
        gender: NotSet,
        product_type: NotSet,
        price: Set(60_00),
        offer_price: Set(None),
        stock: Set(5),
        is_active: Set(true),
        category_id: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    cart_service::add_to_cart(
        &state,
        &auth_user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 1,
            lens_type: None,
            lens_color: None,
            power: None,
        },
    )
    .await?;

    let order = order_service::create_order(
        &state,
        &auth_user,
        CreateOrderRequest {
            shipping_address: address(),
            billing_address: address(),
            payment_method: PaymentMethod::CreditCard,
            shipping_method: ShippingMethod::Standard,
            notes: None,
        },
    )
    .await?
    .data
    .unwrap()
    .order;

    let paid = payment_service::process_payment(
        &state,
        &auth_user,
        ProcessPaymentRequest {
            order_id: order.id,
            payment_details: card_details(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(paid.payment.payment_status, PaymentStatus::Completed);

    // Walk the order through to delivery.
    for (order_status, shipping_status) in [
        (OrderStatus::Processing, ShippingStatus::Processing),
        (OrderStatus::Shipped, ShippingStatus::Shipped),
        (OrderStatus::Delivered, ShippingStatus::Delivered),
    ] {
        admin_service::update_order_status(
            &state,
            &auth_admin,
            order.id,
            UpdateOrderStatusRequest {
                order_status,
                shipping_status: Some(shipping_status),
                tracking_number: None,
            },
        )
        .await?;
    }

    let delivered = order_service::get_order(&state, &auth_user, order.id)
        .await?
        .data
        .unwrap()
        .order;
    assert_eq!(delivered.order_status, OrderStatus::Delivered);
    assert!(delivered.delivered_at.is_some());

    // The payment is still completed, but delivery closes the refund window.
    let err = payment_service::request_refund(
        &state,
        &auth_user,
        paid.payment.id,
        RefundRequest {
            reason: "too late".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let payment = payment_service::get_payment(&state, &auth_user, paid.payment.id)
        .await?
        .data
        .unwrap();
    assert_eq!(payment.payment_status, PaymentStatus::Completed);
    assert!(payment.refund_amount.is_none());

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE payments, order_items, orders, cart_items, carts, wishlist_items, audit_logs, products, categories, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState {
        pool,
        orm,
        gateway: Arc::new(SandboxGateway),
    })
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set("Test User".into()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}
