//! Payment gateway abstraction.
//!
//! The gateway is an injected collaborator so payment and refund outcomes
//! are deterministic in tests. Implementations must never decide success
//! from a random source.

use async_trait::async_trait;

use crate::models::{PaymentDetails, PaymentMethod};

#[derive(Debug, Clone)]
pub struct ChargeRequest<'a> {
    pub transaction_id: &'a str,
    pub amount: i64,
    pub currency: &'a str,
    pub method: PaymentMethod,
    pub details: &'a PaymentDetails,
}

#[derive(Debug, Clone)]
pub struct GatewayError {
    pub code: String,
    pub message: String,
}

impl GatewayError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type GatewayResult = Result<(), GatewayError>;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn charge(&self, request: ChargeRequest<'_>) -> GatewayResult;

    async fn refund(&self, transaction_id: &str, amount: i64) -> GatewayResult;
}

/// Development gateway: approves every well-formed charge and refund.
/// Declines zero/negative amounts so the failure path stays reachable
/// without randomness.
pub struct SandboxGateway;

#[async_trait]
impl PaymentGateway for SandboxGateway {
    fn name(&self) -> &str {
        "sandbox"
    }

    async fn charge(&self, request: ChargeRequest<'_>) -> GatewayResult {
        if request.amount <= 0 {
            return Err(GatewayError::new(
                "invalid_amount",
                "charge amount must be positive",
            ));
        }
        tracing::debug!(
            transaction_id = %request.transaction_id,
            amount = request.amount,
            currency = %request.currency,
            "sandbox charge approved"
        );
        Ok(())
    }

    async fn refund(&self, transaction_id: &str, amount: i64) -> GatewayResult {
        if amount <= 0 {
            return Err(GatewayError::new(
                "invalid_amount",
                "refund amount must be positive",
            ));
        }
        tracing::debug!(transaction_id = %transaction_id, amount, "sandbox refund approved");
        Ok(())
    }
}
