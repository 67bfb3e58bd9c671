//! Subscription layer: the deduplicating topic registry and the scoped
//! handles consumers hold on to.

pub mod guard;
pub mod registry;

pub use guard::{SubscriptionGuard, TopicStream};
pub use registry::{SubscriptionHandle, SubscriptionRegistry};
