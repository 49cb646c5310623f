pub mod bus;
pub mod console;
pub mod credentials;
pub mod effects;
pub mod endpoint;
pub mod error;
pub mod manager;
pub mod surface;
pub mod transport;
pub mod types;

pub use bus::{LocalBus, LocalSignal, Subscription, Topic};
pub use endpoint::HubEndpoint;
pub use error::{ClientError, SurfaceError};
pub use manager::{ConnectionManager, ReconnectPolicy};
pub use surface::NotificationSurface;
pub use types::{ConnectionState, DesktopPermission, NegotiationMode, StateTransition};
