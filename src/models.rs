//! Domain status enums shared by services, handlers, and tests.
//!
//! Entities persist these as plain strings (the storage layer stays
//! schema-agnostic); the enums live at the DTO boundary so unknown values are
//! rejected before they reach the database.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Kitchen-facing lifecycle of an order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Completed,
    Cancelled,
}

/// Settlement state of the order's payment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

/// Transaction status codes pushed by the payment gateway.
///
/// The webhook schema only admits these seven values; anything else is a
/// malformed payload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionStatus {
    Capture,
    Settlement,
    Pending,
    Deny,
    Cancel,
    Expire,
    Refund,
}

/// Fraud screening verdict that accompanies capture/settlement notifications.
pub const FRAUD_ACCEPT: &str = "accept";

/// Maps a gateway (transaction_status, fraud_status) pair onto the internal
/// (payment_status, order status) pair.
///
/// Returns `None` for combinations that must not touch the order, e.g. a
/// capture whose fraud screening did not accept.
pub fn map_gateway_status(
    transaction_status: TransactionStatus,
    fraud_status: Option<&str>,
) -> Option<(PaymentStatus, OrderStatus)> {
    use TransactionStatus::*;

    match transaction_status {
        Capture | Settlement => match fraud_status {
            None => Some((PaymentStatus::Paid, OrderStatus::Confirmed)),
            Some(fraud) if fraud == FRAUD_ACCEPT => {
                Some((PaymentStatus::Paid, OrderStatus::Confirmed))
            }
            Some(_) => None,
        },
        Pending => Some((PaymentStatus::Pending, OrderStatus::Pending)),
        Deny | Cancel | Expire => Some((PaymentStatus::Failed, OrderStatus::Cancelled)),
        Refund => Some((PaymentStatus::Refunded, OrderStatus::Cancelled)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn statuses_round_trip_as_lowercase_strings() {
        assert_eq!(OrderStatus::Confirmed.to_string(), "confirmed");
        assert_eq!(OrderStatus::from_str("cancelled").unwrap(), OrderStatus::Cancelled);
        assert_eq!(PaymentStatus::Paid.to_string(), "paid");
        assert_eq!(PaymentStatus::from_str("refunded").unwrap(), PaymentStatus::Refunded);
        assert!(OrderStatus::from_str("shipped").is_err());
    }

    #[test]
    fn settlement_with_accepted_fraud_confirms_the_order() {
        assert_eq!(
            map_gateway_status(TransactionStatus::Settlement, Some("accept")),
            Some((PaymentStatus::Paid, OrderStatus::Confirmed))
        );
        assert_eq!(
            map_gateway_status(TransactionStatus::Capture, None),
            Some((PaymentStatus::Paid, OrderStatus::Confirmed))
        );
    }

    #[test]
    fn capture_with_other_fraud_status_is_a_no_op() {
        assert_eq!(map_gateway_status(TransactionStatus::Capture, Some("challenge")), None);
        assert_eq!(map_gateway_status(TransactionStatus::Settlement, Some("deny")), None);
    }

    #[test]
    fn remaining_statuses_follow_the_mapping_table() {
        assert_eq!(
            map_gateway_status(TransactionStatus::Pending, None),
            Some((PaymentStatus::Pending, OrderStatus::Pending))
        );
        for status in [
            TransactionStatus::Deny,
            TransactionStatus::Cancel,
            TransactionStatus::Expire,
        ] {
            assert_eq!(
                map_gateway_status(status, None),
                Some((PaymentStatus::Failed, OrderStatus::Cancelled))
            );
        }
        assert_eq!(
            map_gateway_status(TransactionStatus::Refund, None),
            Some((PaymentStatus::Refunded, OrderStatus::Cancelled))
        );
    }
}
