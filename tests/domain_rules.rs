use optika_api::models::{
    BankDetails, CardDetails, EyePower, OrderStatus, PaymentDetails, PaymentMethod,
    PrescriptionPower, Product, UpiDetails,
};
use optika_api::services::category_service::slugify;
use uuid::Uuid;

fn card() -> CardDetails {
    CardDetails {
        card_number: "4111111111111111".into(),
        card_holder_name: "Test Holder".into(),
        expiry_date: "12/27".into(),
        card_type: None,
    }
}

#[test]
fn order_status_allows_only_forward_transitions() {
    use OrderStatus::*;

    assert!(Pending.can_transition_to(Processing));
    assert!(Pending.can_transition_to(Cancelled));
    assert!(Processing.can_transition_to(Shipped));
    assert!(Processing.can_transition_to(Cancelled));
    assert!(Shipped.can_transition_to(Delivered));

    assert!(!Pending.can_transition_to(Shipped));
    assert!(!Pending.can_transition_to(Delivered));
    assert!(!Processing.can_transition_to(Delivered));
    assert!(!Shipped.can_transition_to(Cancelled));
    assert!(!Delivered.can_transition_to(Cancelled));
    assert!(!Cancelled.can_transition_to(Pending));
    // No self-loops.
    assert!(!Processing.can_transition_to(Processing));
}

#[test]
fn terminal_statuses_are_delivered_and_cancelled() {
    assert!(OrderStatus::Delivered.is_terminal());
    assert!(OrderStatus::Cancelled.is_terminal());
    assert!(!OrderStatus::Pending.is_terminal());
    assert!(!OrderStatus::Processing.is_terminal());
    assert!(!OrderStatus::Shipped.is_terminal());
}

#[test]
fn payment_details_tag_is_the_method() {
    assert!(PaymentDetails::CreditCard(card()).matches(PaymentMethod::CreditCard));
    assert!(PaymentDetails::DebitCard(card()).matches(PaymentMethod::DebitCard));
    assert!(
        PaymentDetails::Upi(UpiDetails {
            upi_id: "user@bank".into()
        })
        .matches(PaymentMethod::Upi)
    );
    assert!(
        PaymentDetails::NetBanking(BankDetails {
            bank_name: "Test Bank".into(),
            account_number: "0001".into(),
            ifsc_code: "TEST0000001".into(),
        })
        .matches(PaymentMethod::NetBanking)
    );

    assert!(!PaymentDetails::CreditCard(card()).matches(PaymentMethod::Upi));
    assert!(!PaymentDetails::Upi(UpiDetails {
        upi_id: "user@bank".into()
    })
    .matches(PaymentMethod::NetBanking));
}

#[test]
fn payment_details_rejects_unknown_method_tag() {
    let raw = serde_json::json!({
        "method": "cash_on_delivery",
        "card_number": "4111111111111111"
    });
    assert!(serde_json::from_value::<PaymentDetails>(raw).is_err());
}

#[test]
fn prescription_power_bounds() {
    let valid = PrescriptionPower {
        left_eye: Some(EyePower {
            sphere: -2.5,
            cylinder: -0.75,
            axis: 90,
        }),
        right_eye: Some(EyePower {
            sphere: 20.0,
            cylinder: 6.0,
            axis: 180,
        }),
    };
    assert!(valid.validate().is_ok());

    let bad_sphere = PrescriptionPower {
        left_eye: Some(EyePower {
            sphere: -20.5,
            cylinder: 0.0,
            axis: 0,
        }),
        right_eye: None,
    };
    assert!(bad_sphere.validate().unwrap_err().contains("sphere"));

    let bad_axis = PrescriptionPower {
        left_eye: None,
        right_eye: Some(EyePower {
            sphere: 0.0,
            cylinder: 0.0,
            axis: 181,
        }),
    };
    assert!(bad_axis.validate().unwrap_err().contains("axis"));
}

#[test]
fn effective_price_prefers_lower_offer() {
    let mut product = Product {
        id: Uuid::new_v4(),
        name: "Frame".into(),
        description: None,
        brand: None,
        gender: None,
        product_type: None,
        price: 100_00,
        offer_price: Some(80_00),
        stock: 5,
        is_active: true,
        category_id: None,
        created_at: chrono::Utc::now(),
    };
    assert_eq!(product.effective_price(), 80_00);

    // An offer above the list price is ignored.
    product.offer_price = Some(120_00);
    assert_eq!(product.effective_price(), 100_00);

    product.offer_price = None;
    assert_eq!(product.effective_price(), 100_00);
}

#[test]
fn slugify_normalizes_names() {
    assert_eq!(slugify("Sunglasses"), "sunglasses");
    assert_eq!(slugify("Blue Light Glasses"), "blue-light-glasses");
    assert_eq!(slugify("  Kids'  Frames!  "), "kids-frames");
    assert_eq!(slugify("Ray--Ban / Aviator"), "ray-ban-aviator");
}
