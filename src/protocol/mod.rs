//! Chat-room wire protocol: outbound envelopes, inbound classification, shared models.

pub mod envelope;
pub mod inbound;
pub mod model;

pub use envelope::*;
pub use inbound::*;
pub use model::*;
