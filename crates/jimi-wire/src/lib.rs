#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Wire: the in-process message bus broadcasting engine events.
//!
//! A single engine serves many user turns; subscribers (UI, IDE plugin,
//! hook engine) all consume the same stream. The bus is resettable: each
//! run seals the previous stream and installs a fresh one so late
//! subscribers never replay stale output.

mod bus;
mod message;

pub use bus::{DEFAULT_WIRE_CAPACITY, Wire, WireReceiver};
pub use message::WireMessage;
