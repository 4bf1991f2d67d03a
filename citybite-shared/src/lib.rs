pub mod models;
pub mod pii;

pub use models::events::{Audience, NotificationEvent, NotificationKind};
pub use models::status::OrderStatus;
