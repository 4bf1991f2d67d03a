use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle position of an order, from placement to a terminal outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    Accepted,
    Preparing,
    ReadyForPickup,
    RiderAssigned,
    RiderAtRestaurant,
    OutForDelivery,
    ArrivedAtCustomer,
    Delivered,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    /// Terminal orders accept no further status transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Rejected | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Placed => "placed",
            Self::Accepted => "accepted",
            Self::Preparing => "preparing",
            Self::ReadyForPickup => "ready_for_pickup",
            Self::RiderAssigned => "rider_assigned",
            Self::RiderAtRestaurant => "rider_at_restaurant",
            Self::OutForDelivery => "out_for_delivery",
            Self::ArrivedAtCustomer => "arrived_at_customer",
            Self::Delivered => "delivered",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::OutForDelivery.is_terminal());
        assert!(!OrderStatus::Placed.is_terminal());
    }

    #[test]
    fn test_wire_name_matches_display() {
        let json = serde_json::to_string(&OrderStatus::ReadyForPickup).unwrap();
        assert_eq!(json, "\"ready_for_pickup\"");
        assert_eq!(OrderStatus::ReadyForPickup.to_string(), "ready_for_pickup");
    }
}
