//! Declarative field checks run before any store is touched.
//!
//! Every rule is evaluated and all failures are returned together, so callers
//! can show field-level messages in one round trip.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::product::{PhotoUpload, ProductFields};

pub const NAME_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;

/// Largest value a `numeric(10,2)` column holds.
pub fn money_max() -> Decimal {
    Decimal::new(9_999_999_999, 2)
}

/// One failed rule, keyed by the public (camelCase) field name.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check the editable product fields against the catalog rules.
pub fn validate_product(fields: &ProductFields) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if fields.category_id <= 0 {
        errors.push(FieldError::new("categoryId", "category is required"));
    }

    if fields.name.trim().is_empty() {
        errors.push(FieldError::new("name", "name is required"));
    } else if fields.name.chars().count() > NAME_MAX_CHARS {
        errors.push(FieldError::new(
            "name",
            format!("name must be at most {} characters", NAME_MAX_CHARS),
        ));
    }

    if let Some(description) = &fields.description {
        if description.chars().count() > DESCRIPTION_MAX_CHARS {
            errors.push(FieldError::new(
                "description",
                format!("description must be at most {} characters", DESCRIPTION_MAX_CHARS),
            ));
        }
    }

    if fields.quantity < 0 {
        errors.push(FieldError::new("quantity", "quantity cannot be negative"));
    }

    check_money(&mut errors, "costValue", fields.cost_value);
    check_money(&mut errors, "saleValue", fields.sale_value);

    errors
}

/// Reject photos larger than `max_bytes`. Empty payloads are treated as "no photo"
/// by the service and never reach this check.
pub fn validate_photo(photo: &PhotoUpload, max_bytes: usize) -> Option<FieldError> {
    (photo.bytes.len() > max_bytes).then(|| {
        FieldError::new(
            "photo",
            format!("photo must be at most {} bytes", max_bytes),
        )
    })
}

fn check_money(errors: &mut Vec<FieldError>, field: &str, value: Decimal) {
    if value.is_sign_negative() && !value.is_zero() {
        errors.push(FieldError::new(field, "value cannot be negative"));
    } else if value > money_max() {
        errors.push(FieldError::new(
            field,
            format!("value must be at most {}", money_max()),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::str::FromStr;

    fn widget() -> ProductFields {
        ProductFields {
            category_id: 1,
            name: "Widget".into(),
            description: None,
            quantity: 5,
            cost_value: Decimal::from_str("3.00").unwrap(),
            sale_value: Decimal::from_str("9.99").unwrap(),
            featured: false,
        }
    }

    fn fields_of(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn valid_product_has_no_errors() {
        assert!(validate_product(&widget()).is_empty());
    }

    #[test]
    fn collects_every_failure() {
        let fields = ProductFields {
            category_id: 0,
            name: "   ".into(),
            description: Some("d".repeat(DESCRIPTION_MAX_CHARS + 1)),
            quantity: -1,
            cost_value: Decimal::from_str("-0.01").unwrap(),
            sale_value: Decimal::from_str("100000000.00").unwrap(),
            featured: true,
        };

        let errors = validate_product(&fields);
        assert_eq!(
            fields_of(&errors),
            vec![
                "categoryId",
                "name",
                "description",
                "quantity",
                "costValue",
                "saleValue"
            ]
        );
    }

    #[test]
    fn name_length_counts_characters_not_bytes() {
        let mut fields = widget();
        fields.name = "ç".repeat(NAME_MAX_CHARS);
        assert!(validate_product(&fields).is_empty());

        fields.name.push('ç');
        assert_eq!(fields_of(&validate_product(&fields)), vec!["name"]);
    }

    #[test]
    fn money_bounds_are_inclusive() {
        let mut fields = widget();
        fields.cost_value = Decimal::ZERO;
        fields.sale_value = money_max();
        assert!(validate_product(&fields).is_empty());
        assert_eq!(money_max().to_string(), "99999999.99");
    }

    #[test]
    fn oversized_photo_is_rejected() {
        let photo = PhotoUpload {
            file_name: Some("a.png".into()),
            content_type: None,
            bytes: Bytes::from(vec![0u8; 11]),
        };
        assert!(validate_photo(&photo, 11).is_none());
        assert_eq!(
            validate_photo(&photo, 10).map(|e| e.field),
            Some("photo".to_string())
        );
    }
}
