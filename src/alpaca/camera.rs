//! Camera-specific operations (§4.3 table).

use crate::alpaca::device::AlpacaDeviceClient;
use crate::alpaca::image_array::ImageElement;
use crate::errors::ErrorKind;

impl AlpacaDeviceClient {
    /// CCD temperature in degrees Celsius (`GET ccdtemperature`).
    pub async fn ccd_temperature(&self) -> Result<f64, ErrorKind> {
        self.get_property("ccdtemperature").await
    }

    /// Whether the thermoelectric cooler is engaged (`GET cooleron`).
    pub async fn cooler_on(&self) -> Result<bool, ErrorKind> {
        self.get_property("cooleron").await
    }

    /// Engage or disengage the thermoelectric cooler (`PUT cooleron`).
    pub async fn set_cooler_on(&self, enabled: bool) -> Result<(), ErrorKind> {
        self.set_property("CoolerOn", enabled).await
    }

    /// Begin an exposure (`PUT startexposure`): `duration_s` seconds, `light`
    /// true for a light frame, false for a dark frame.
    pub async fn start_exposure(&self, duration_s: f64, light: bool) -> Result<(), ErrorKind> {
        self.invoke_method(
            "startexposure",
            &[
                ("Duration", duration_s.into()),
                ("Light", light.into()),
            ],
        )
        .await?;
        Ok(())
    }

    /// Abort an in-progress exposure (`PUT abortexposure`).
    pub async fn abort_exposure(&self) -> Result<(), ErrorKind> {
        self.invoke_method("abortexposure", &[]).await?;
        Ok(())
    }

    /// Whether the current exposure's image data is ready to retrieve
    /// (`GET imageready`), for polling.
    pub async fn image_ready(&self) -> Result<bool, ErrorKind> {
        self.get_property("imageready").await
    }

    /// Retrieve and decode the current frame (`GET imagearray`) as a dense
    /// row-major pixel sequence of element type `T` (§4.4).
    pub async fn image_array<T: ImageElement>(&self) -> Result<Vec<T>, ErrorKind> {
        crate::alpaca::image_array::get_image_array(self).await
    }
}
