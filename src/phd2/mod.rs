//! L2: the PHD2 autoguider client (§2, §4.5-§4.6).
//!
//! [`transport`] owns the socket, the reader task and the pending-RPC
//! table; [`events`] is the tagged-union event stream it decodes into;
//! [`client`] is the high-level façade workflows are built on.

mod transport;

pub mod client;
pub mod error;
pub mod events;

pub use client::{Client, Profile, SettleFuture, SettleParameters, SettleResult};
pub use error::Phd2Error;
pub use events::{AppState, Event, EventCommon};
