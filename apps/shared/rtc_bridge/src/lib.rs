//! RTC Bridge
//!
//! Connects a method channel caller to a stateful real-time communication
//! engine. Commands flow in, get validated and run against the engine; engine
//! callbacks flow out as named events. Everything the caller receives is
//! delivered on one thread, in order.
//!
//! # Architecture
//!
//! - **CommandDispatcher**: method name + arguments → engine operation → result
//! - **EventForwarder**: engine callback → named event payload
//! - **Marshaller / DeliveryLoop**: the single ordered delivery thread
//! - **SurfaceRegistry**: caller view ids → rendering surfaces
//! - **EngineSession**: the one live engine instance, created by `create`

pub mod codec;
pub mod command;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod marshaller;
pub mod session;
pub mod surface;

pub use command::{Command, CommandKind};
pub use dispatcher::CommandDispatcher;
pub use engine::loopback::{LoopbackEngine, LoopbackFactory};
pub use engine::{EngineCallback, EngineError, EngineFactory, RtcEngine};
pub use error::{BridgeError, Result};
pub use events::{EventForwarder, EventSink};
pub use marshaller::{DeliveryLoop, Marshaller, MarshallerClosed};
pub use session::EngineSession;
pub use surface::{HeadlessSurface, RenderSurface, SurfaceHandle, SurfaceRegistry};
