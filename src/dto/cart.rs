use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{CartItem, PrescriptionPower};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub lens_type: Option<String>,
    pub lens_color: Option<String>,
    pub power: Option<PrescriptionPower>,
}

/// Absent fields leave the item untouched; present fields replace.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub quantity: Option<i32>,
    pub lens_type: Option<String>,
    pub lens_color: Option<String>,
    pub power: Option<PrescriptionPower>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    /// Items whose stored price was re-synced to the live catalog price.
    pub updated_items: Vec<CartItem>,
}
