//! L1: the ASCOM Alpaca HTTP client (§2, §4.1-§4.4).
//!
//! [`pool`] and [`transaction`] are the shared plumbing; [`transport`]
//! turns one logical operation into one HTTP round-trip; [`device`] binds
//! a transport to one device and exposes the generic property/method
//! trio; [`camera`], [`telescope`] and [`focuser`] add the per-device
//! operation tables on top of it; [`image_array`] decodes camera frames;
//! [`discovery`] is the CIDR TCP-probe discovery stub.

mod camera;
mod device;
mod focuser;
mod image_array;
mod pool;
mod telescope;
mod transaction;
mod transport;

pub mod discovery;

pub use device::{AlpacaDeviceClient, DeviceDescriptor, DeviceKind};
pub use image_array::ImageElement;
pub use pool::{Pool, MAX_IDLE_AGE};
pub use transport::{AlpacaResponse, Metrics, ParamValue, Transport, Verb};
