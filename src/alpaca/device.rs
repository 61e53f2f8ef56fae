//! The typed Alpaca device client (§4.3): a `DeviceDescriptor` plus a
//! transport reference, with generic `get_property`/`set_property`/
//! `invoke_method` and per-device operation tables built on top of them.
//!
//! "Device client" is a struct bundling the transport and the device
//! descriptor by composition, not a subclass of the transport (§9 "Deep
//! inheritance").

use crate::alpaca::transport::{ParamValue, Transport, Verb};
use crate::errors::ErrorKind;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// The kind of Alpaca device, fixing its URL segment (§1, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Camera,
    Telescope,
    Focuser,
    FilterWheel,
    Dome,
    Rotator,
}

impl DeviceKind {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Telescope => "telescope",
            Self::Focuser => "focuser",
            Self::FilterWheel => "filterwheel",
            Self::Dome => "dome",
            Self::Rotator => "rotator",
        }
    }
}

/// Identity of an Alpaca device (§3 `DeviceDescriptor`). Immutable once
/// connected; two descriptors compare equal iff every field matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    pub name: String,
    pub kind: DeviceKind,
    pub device_number: u32,
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Typed facade over the transport, bound to one [`DeviceDescriptor`]
/// (§4.3). Cheaply clonable: the transport is shared via `Arc`.
#[derive(Debug, Clone)]
pub struct AlpacaDeviceClient {
    transport: Arc<Transport>,
    descriptor: DeviceDescriptor,
}

impl AlpacaDeviceClient {
    #[must_use]
    pub fn new(transport: Arc<Transport>, descriptor: DeviceDescriptor) -> Self {
        Self {
            transport,
            descriptor,
        }
    }

    #[must_use]
    pub const fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    fn device_path(&self, endpoint: &str) -> String {
        format!(
            "{device_type}/{device_number}/{endpoint}",
            device_type = self.descriptor.kind.as_str(),
            device_number = self.descriptor.device_number,
        )
    }

    async fn request(
        &self,
        verb: Verb,
        endpoint: &str,
        params: &[(&str, ParamValue)],
    ) -> Result<serde_json::Value, ErrorKind> {
        let path = self.device_path(endpoint);
        let response = self
            .transport
            .perform_request(
                &self.descriptor.host,
                self.descriptor.port,
                self.descriptor.tls,
                verb,
                &path,
                params,
            )
            .await?;
        if response.has_error() {
            return Err(response.error_kind());
        }
        Ok(response.value)
    }

    /// `GET {endpoint}/{name}`, pulling the `Value` field and coercing it
    /// to `T` (§4.3).
    pub async fn get_property<T: DeserializeOwned>(&self, name: &str) -> Result<T, ErrorKind> {
        let value = self.request(Verb::Get, name, &[]).await?;
        serde_json::from_value(value).map_err(|_| ErrorKind::ParseError)
    }

    /// `PUT {endpoint}/{name}` with body parameter `{name: value}` (§4.3).
    pub async fn set_property(
        &self,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), ErrorKind> {
        self.request(Verb::Put, name, &[(name, value.into())])
            .await?;
        Ok(())
    }

    /// `PUT {endpoint}/{name}` with each `kv` pair as a form parameter
    /// (§4.3).
    pub async fn invoke_method(
        &self,
        name: &str,
        params: &[(&str, ParamValue)],
    ) -> Result<serde_json::Value, ErrorKind> {
        self.request(Verb::Put, name, params).await
    }
}
