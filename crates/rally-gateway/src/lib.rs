//! Live channel bookkeeping and event fanout.

pub mod dispatcher;
pub mod registry;

pub use dispatcher::{Connection, DeliveryReport, Dispatcher, DispatcherConfig, PresenceChange};
pub use registry::{ChannelDead, ChannelHandle, ChannelId, ConnectionRegistry, Frame};
