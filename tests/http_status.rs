use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use optika_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::auth::Claims,
    dto::cart::AddToCartRequest,
    entity::{products::ActiveModel as ProductActive, users::ActiveModel as UserActive},
    gateway::SandboxGateway,
    middleware::auth::AuthUser,
    routes::create_api_router,
    services::cart_service,
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

const JWT_SECRET: &str = "http-status-test-secret";

fn bearer_token(user_id: Uuid, role: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.into(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {token}")
}

fn address_json() -> Value {
    json!({
        "street": "1 Test Street",
        "city": "Testville",
        "state": "TS",
        "country": "US",
        "zip_code": "00001",
        "phone": "+1000000000"
    })
}

async fn post_json(app: &Router, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::AUTHORIZATION, token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

// Order creation answers 201; a processed payment answers 200 since no
// new addressable resource beyond the payment record is created.
#[tokio::test]
async fn checkout_endpoints_use_expected_status_codes() -> anyhow::Result<()> {
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
    unsafe {
        std::env::set_var("JWT_SECRET", JWT_SECRET);
    }

    let state = setup_state(&database_url).await?;
    let user_id = create_user(&state, "user", "http@example.com").await?;
    let token = bearer_token(user_id, "user");
    let auth_user = AuthUser {
        user_id,
        role: "user".into(),
    };

    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set("Status Frame".into()),
        description: NotSet,
        brand: NotSet,
        gender: NotSet,
        product_type: NotSet,
        price: Set(50_00),
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

    let app = Router::new()
        .nest("/api", create_api_router())
        .with_state(state);

    let (status, body) = post_json(
        &app,
        "/api/orders",
        &token,
        json!({
            "shipping_address": address_json(),
            "billing_address": address_json(),
            "payment_method": "credit_card",
            "shipping_method": "standard",
            "notes": null
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = body["data"]["order"]["id"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        &app,
        "/api/payments",
        &token,
        json!({
            "order_id": order_id,
            "payment_details": {
                "method": "credit_card",
                "card_number": "4111111111111111",
                "card_holder_name": "Test Holder",
                "expiry_date": "12/27"
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["payment"]["payment_status"], "completed");

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
