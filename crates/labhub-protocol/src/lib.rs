pub mod frames;
pub mod handshake;
pub mod methods;
pub mod notification;

pub use frames::{EventFrame, InboundFrame, ReqFrame, ResFrame};
pub use notification::NotificationEvent;
