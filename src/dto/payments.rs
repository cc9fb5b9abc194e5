use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, Payment, PaymentDetails};

/// The instrument's `method` tag must match the order's payment method.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProcessPaymentRequest {
    pub order_id: Uuid,
    pub payment_details: PaymentDetails,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundRequest {
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentWithOrder {
    pub payment: Payment,
    pub order: Order,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentList {
    pub items: Vec<Payment>,
}
