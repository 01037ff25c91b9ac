//! Method channel wire types
//!
//! The shapes carried between a caller and the RTC bridge: dynamic values,
//! method calls, their results, and pushed events. Frames are bincode-encoded
//! and length-prefixed (see [`stream`]).

pub mod error;
pub mod message;
pub mod stream;
pub mod value;

pub use error::{ProtocolError, Result};
pub use message::{ChannelMessage, EventMessage, MethodCall, MethodResult};
pub use stream::{ChannelRead, ChannelWrite, DEFAULT_MAX_MESSAGE_SIZE};
pub use value::{Arguments, Payload, Value};
