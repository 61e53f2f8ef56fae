//! Focuser-specific operations (§4.3 table).
//!
//! §9's open question flags the original's `FocuserClient` async path and
//! `HardwareInterface::getCurrentPosition` as declared but not implemented
//! upstream. This core wires them through the generic property/method
//! trio below — that generic plumbing *is* the core's contract (§11.2).

use crate::alpaca::device::AlpacaDeviceClient;
use crate::errors::ErrorKind;

impl AlpacaDeviceClient {
    /// Current focuser position in steps (`GET position`).
    pub async fn position(&self) -> Result<i32, ErrorKind> {
        self.get_property("position").await
    }

    /// Move the focuser to an absolute position in steps (`PUT move`).
    pub async fn move_to(&self, position: i32) -> Result<(), ErrorKind> {
        self.invoke_method("move", &[("Position", position.into())])
            .await?;
        Ok(())
    }

    /// Focuser temperature in degrees Celsius, if the device reports one
    /// (`GET temperature`).
    pub async fn temperature(&self) -> Result<f64, ErrorKind> {
        self.get_property("temperature").await
    }

    /// Whether temperature compensation is currently enabled
    /// (`GET tempcomp`).
    pub async fn temp_comp(&self) -> Result<bool, ErrorKind> {
        self.get_property("tempcomp").await
    }

    /// Enable or disable temperature compensation (`PUT tempcomp`).
    pub async fn set_temp_comp(&self, enabled: bool) -> Result<(), ErrorKind> {
        self.set_property("TempComp", enabled).await
    }

    /// Whether this focuser supports temperature compensation at all
    /// (`GET tempcompavailable`).
    pub async fn temp_comp_available(&self) -> Result<bool, ErrorKind> {
        self.get_property("tempcompavailable").await
    }
}
