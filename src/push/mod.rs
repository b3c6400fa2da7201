pub mod error;
pub mod key;
pub mod manager;
pub mod platform;
pub mod subscription;
pub mod worker;

pub use error::{PushError, PushStep};
pub use manager::PushSubscriptionManager;
pub use platform::{ConfiguredPushPlatform, PushPlatform, UnsupportedPushPlatform};
pub use subscription::PushSubscription;
