pub mod order;
pub mod status;

pub use order::{
    DeliveryAddress, ItemModifier, Order, OrderItem, OrderTotals, StatusChange, Tracking,
    TrackingEntry, TrackingStep,
};
pub use status::{OrderStatus, PaymentStatus};
