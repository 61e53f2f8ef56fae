//! Telescope-specific operations (§4.3 table).

use crate::alpaca::device::AlpacaDeviceClient;
use crate::errors::ErrorKind;

impl AlpacaDeviceClient {
    /// Right ascension of the mount's current position, in hours
    /// (`GET rightascension`).
    pub async fn right_ascension(&self) -> Result<f64, ErrorKind> {
        self.get_property("rightascension").await
    }

    /// Declination of the mount's current position, in degrees
    /// (`GET declination`).
    pub async fn declination(&self) -> Result<f64, ErrorKind> {
        self.get_property("declination").await
    }

    /// Slew to the given coordinates asynchronously on the server
    /// (`PUT slewtocoordinates`); poll [`Self::slewing`] for completion.
    pub async fn slew_to_coordinates(&self, ra_hours: f64, dec_degrees: f64) -> Result<(), ErrorKind> {
        self.invoke_method(
            "slewtocoordinates",
            &[
                ("RightAscension", ra_hours.into()),
                ("Declination", dec_degrees.into()),
            ],
        )
        .await?;
        Ok(())
    }

    /// Abort an in-progress slew (`PUT abortslew`).
    pub async fn abort_slew(&self) -> Result<(), ErrorKind> {
        self.invoke_method("abortslew", &[]).await?;
        Ok(())
    }

    /// Whether the mount is currently slewing (`GET slewing`), for polling.
    pub async fn slewing(&self) -> Result<bool, ErrorKind> {
        self.get_property("slewing").await
    }

    /// Park the mount at its designated park position (`PUT park`).
    pub async fn park(&self) -> Result<(), ErrorKind> {
        self.invoke_method("park", &[]).await?;
        Ok(())
    }

    /// Unpark the mount (`PUT unpark`).
    pub async fn unpark(&self) -> Result<(), ErrorKind> {
        self.invoke_method("unpark", &[]).await?;
        Ok(())
    }

    /// Whether the mount is currently parked (`GET atpark`).
    pub async fn at_park(&self) -> Result<bool, ErrorKind> {
        self.get_property("atpark").await
    }
}
