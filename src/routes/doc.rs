use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{AddToCartRequest, CartValidationReport, UpdateCartItemRequest},
        categories::{CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
        orders::{CancelOrderRequest, CreateOrderRequest, OrderList, OrderWithItems},
        payments::{PaymentList, PaymentWithOrder, ProcessPaymentRequest, RefundRequest},
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
        wishlist::{AddWishlistRequest, WishlistProductList},
    },
    models::{
        Address, Cart, CartItem, Category, EyePower, Order, OrderItem, OrderStatus, Payment,
        PaymentDetails, PaymentMethod, PaymentStatus, PaymentSummary, PrescriptionPower, Product,
        ShippingMethod, ShippingStatus, User, WishlistItem,
    },
    response::{ApiResponse, Meta},
    routes::{
        admin, auth, cart, categories, health, orders, params, payments,
        products as product_routes, wishlist,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        product_routes::list_products,
        product_routes::get_product,
        product_routes::create_product,
        product_routes::update_product,
        product_routes::delete_product,
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        cart::get_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_cart_item,
        cart::clear_cart,
        cart::validate_cart,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        payments::process_payment,
        payments::list_payments,
        payments::get_payment,
        payments::request_refund,
        wishlist::list_wishlist,
        wishlist::add_to_wishlist,
        wishlist::remove_from_wishlist,
        admin::get_dashboard_stats,
        admin::list_users,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_all_payments
    ),
    components(
        schemas(
            User,
            Product,
            Category,
            Cart,
            CartItem,
            Order,
            OrderItem,
            Payment,
            WishlistItem,
            Address,
            PrescriptionPower,
            EyePower,
            PaymentDetails,
            PaymentSummary,
            OrderStatus,
            PaymentStatus,
            ShippingStatus,
            PaymentMethod,
            ShippingMethod,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryList,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartValidationReport,
            CreateOrderRequest,
            CancelOrderRequest,
            OrderList,
            OrderWithItems,
            ProcessPaymentRequest,
            RefundRequest,
            PaymentList,
            PaymentWithOrder,
            AddWishlistRequest,
            WishlistProductList,
            admin::UpdateOrderStatusRequest,
            admin::DashboardStats,
            admin::RecentOrder,
            admin::UserList,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<Cart>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<PaymentWithOrder>,
            ApiResponse<PaymentList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Categories", description = "Category endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Payments", description = "Payment endpoints"),
        (name = "Wishlist", description = "Wishlist endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
