use serde::{Deserialize, Serialize};
use std::fmt;

/// The party issuing an event. Identity is established upstream (bearer
/// token); the engine only checks that the role fits the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    Customer { id: String },
    Restaurant { id: String },
    Rider { id: String, name: String },
    Operator { id: String },
    /// Timers, sweeps and gateway webhooks.
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Restaurant,
    Rider,
    Operator,
    System,
}

impl Actor {
    pub fn role(&self) -> Role {
        match self {
            Actor::Customer { .. } => Role::Customer,
            Actor::Restaurant { .. } => Role::Restaurant,
            Actor::Rider { .. } => Role::Rider,
            Actor::Operator { .. } => Role::Operator,
            Actor::System => Role::System,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Actor::Customer { id }
            | Actor::Restaurant { id }
            | Actor::Rider { id, .. }
            | Actor::Operator { id } => Some(id),
            Actor::System => None,
        }
    }

    pub fn is_restaurant(&self, restaurant_id: &str) -> bool {
        matches!(self, Actor::Restaurant { id } if id == restaurant_id)
    }

    pub fn is_rider(&self, rider_id: &str) -> bool {
        matches!(self, Actor::Rider { id, .. } if id == rider_id)
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, Actor::Operator { .. } | Actor::System)
    }
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Restaurant => "RESTAURANT",
            Role::Rider => "RIDER",
            Role::Operator => "OPERATOR",
            Role::System => "SYSTEM",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
