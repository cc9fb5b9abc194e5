use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use optika_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let admin_id = ensure_user_with_role(&pool, "Admin", "admin@example.com", "admin123", "admin").await?;
    let user_id = ensure_user_with_role(&pool, "Demo User", "user@example.com", "user123", "user").await?;
    seed_catalog(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user_with_role(
    pool: &sqlx::PgPool,
    name: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    Ok(user_id)
}

async fn ensure_category(
    pool: &sqlx::PgPool,
    name: &str,
    slug: &str,
    description: &str,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO categories (id, name, slug, description)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(slug)
    .bind(description)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

struct SeedProduct {
    name: &'static str,
    description: &'static str,
    brand: &'static str,
    gender: &'static str,
    product_type: &'static str,
    price: i64,
    offer_price: Option<i64>,
    stock: i32,
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let eyeglasses = ensure_category(
        pool,
        "Eyeglasses",
        "eyeglasses",
        "Prescription frames and lenses",
    )
    .await?;
    let sunglasses = ensure_category(pool, "Sunglasses", "sunglasses", "UV protection eyewear").await?;

    // Prices are in cents.
    let catalog: &[(Uuid, &[SeedProduct])] = &[
        (
            eyeglasses,
            &[
                SeedProduct {
                    name: "Round Metal Classic",
                    description: "Thin metal frame with adjustable nose pads",
                    brand: "Visor",
                    gender: "unisex",
                    product_type: "full-rim",
                    price: 89_00,
                    offer_price: Some(69_00),
                    stock: 40,
                },
                SeedProduct {
                    name: "Square Acetate Bold",
                    description: "Chunky acetate frame in tortoise finish",
                    brand: "Visor",
                    gender: "men",
                    product_type: "full-rim",
                    price: 119_00,
                    offer_price: None,
                    stock: 25,
                },
                SeedProduct {
                    name: "Featherlight Rimless",
                    description: "Titanium rimless frame, under 10 grams",
                    brand: "Aero",
                    gender: "women",
                    product_type: "rimless",
                    price: 159_00,
                    offer_price: Some(139_00),
                    stock: 15,
                },
            ],
        ),
        (
            sunglasses,
            &[
                SeedProduct {
                    name: "Aviator Polarized",
                    description: "Polarized lenses with gradient tint",
                    brand: "Solis",
                    gender: "unisex",
                    product_type: "aviator",
                    price: 99_00,
                    offer_price: None,
                    stock: 60,
                },
                SeedProduct {
                    name: "Wayfarer Matte Black",
                    description: "Matte black frame with smoke lenses",
                    brand: "Solis",
                    gender: "men",
                    product_type: "wayfarer",
                    price: 79_00,
                    offer_price: Some(59_00),
                    stock: 50,
                },
            ],
        ),
    ];

    for (category_id, products) in catalog {
        for product in *products {
            sqlx::query(
                r#"
                INSERT INTO products
                    (id, name, description, brand, gender, product_type,
                     price, offer_price, stock, category_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (name) DO UPDATE SET
                    price = EXCLUDED.price,
                    offer_price = EXCLUDED.offer_price,
                    stock = EXCLUDED.stock
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(product.name)
            .bind(product.description)
            .bind(product.brand)
            .bind(product.gender)
            .bind(product.product_type)
            .bind(product.price)
            .bind(product.offer_price)
            .bind(product.stock)
            .bind(category_id)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}
