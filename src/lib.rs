//! # Crossbar
//!
//! Control service for broadcast video/audio matrix routers speaking the
//! SW-P-08 (Pro-Bel) serial control protocol.
//!
//! ## Architecture
//!
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Client Fan-out (WebSocket, JSON)                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │        Session / Router State (tally cache, take, dump)        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │        Link Layer (ACK/NAK, one in flight, retransmit)         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │        Frame Codec (DLE/STX/ETX, stuffing, checksum)           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │           Transport (TCP / serial 8-E-1 @ 38k4)                │
//! └─────────────────────────────────────────────────────────────────┘
//!
//! Received bytes flow upward through the stack; commands flow downward.
//! Everything below the session layer is bit-exact to the SW-P-08
//! specification.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow stylistic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]      // Many functions can't be const due to trait bounds
#![allow(clippy::doc_markdown)]              // ASCII diagrams in docs
#![allow(clippy::cast_possible_truncation)]  // Intentional wire-byte packing
#![allow(clippy::match_same_arms)]           // Explicit arm per variant is clearer
#![allow(clippy::option_if_let_else)]        // More readable in context
#![allow(clippy::use_self)]                  // Explicit type names in matches
#![allow(clippy::cognitive_complexity)]      // Protocol state machines
#![allow(clippy::too_many_lines)]            // Complete implementations
#![allow(clippy::future_not_send)]           // Async internals
#![allow(clippy::return_self_not_must_use)]  // Builder methods don't need must_use
#![allow(clippy::ignored_unit_patterns)]     // Ok(_) vs Ok(()) is stylistic

pub mod cli;
pub mod config;
pub mod error;
pub mod link;
pub mod protocol;
pub mod router;
pub mod server;
pub mod transport;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default SW-P-08 TCP control port
pub const DEFAULT_ROUTER_PORT: u16 = 2000;

/// Default client fan-out port
pub const DEFAULT_CLIENT_PORT: u16 = 3001;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::link::{LinkEvent, LinkHandle};
    pub use crate::protocol::{CommandCode, DecoderEvent, Frame, FrameDecoder, Message};
    pub use crate::router::{Router, RouterEvent};
    pub use crate::server::{ClientEvent, ClientRequest, ServerState};
    pub use crate::transport::{Transport, TransportKind};
    pub use crate::types::*;
}
