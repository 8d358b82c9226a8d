// src/broadcast/mod.rs
mod broadcaster;
mod message;

pub use broadcaster::{Broadcaster, DeliveryError, PublishReport, SubscriberId, Subscription};
pub use message::{MonitoringUpdate, ServerMessage};
