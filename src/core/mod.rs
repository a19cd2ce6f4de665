pub mod frame;
pub mod heartbeat;
pub mod message_buffer;
pub mod reconnect;
pub mod types;

pub use frame::*;
pub use heartbeat::*;
pub use message_buffer::*;
pub use reconnect::*;
pub use types::*;
