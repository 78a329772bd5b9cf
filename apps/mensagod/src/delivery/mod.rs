pub mod bounce;
pub mod queue;
pub mod worker;

pub use bounce::BounceReason;
pub use queue::{DeliveryQueue, MessageInfo};
pub use worker::notify;
