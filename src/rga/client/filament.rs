use super::{RgaClient, ensure_readback};
use crate::error::{DeviceError, RgaError};
use crate::rga::params::{self, EMISSION_CURRENT_STEP_MA};
use crate::rga::protocol::CommandArg;
use crate::types::{FilamentOff, Setting};
use log::{error, info, warn};

const EMISSION_DECIMALS: usize = 2;

impl RgaClient {
    /// Store the emission current used by the next [`turn_on_filament`].
    ///
    /// Nothing is sent to the head. The value must be a multiple of 0.02 mA
    /// in 0..=3.5 mA; `Setting::Default` selects 1 mA.
    ///
    /// [`turn_on_filament`]: RgaClient::turn_on_filament
    pub fn set_emission_current(&mut self, setting: Setting<f64>) -> Result<f64, RgaError> {
        let current = match setting {
            Setting::Default => params::EMISSION_CURRENT_DEFAULT_MA,
            Setting::Value(ma) => params::check_emission_current(ma)?,
        };
        info!("Emission current setpoint {current:.2} mA");
        self.emission_current_ma = current;
        Ok(current)
    }

    /// Emission current reported by the head, in mA.
    pub fn get_emission_current(&mut self) -> Result<f64, RgaError> {
        self.query_float("FL")
    }

    /// Whether the head reports at least one step of emission current.
    pub fn get_filament_status(&mut self) -> Result<bool, RgaError> {
        let current = self.get_emission_current()?;
        Ok(current >= EMISSION_CURRENT_STEP_MA)
    }

    /// Switch the filament on at the stored setpoint.
    ///
    /// The session only considers the filament on once the head reports an
    /// emission current within 0.02 mA of the setpoint.
    ///
    /// # Examples
    /// ```no_run
    /// use rusty_rga::{RgaClient, Setting};
    ///
    /// let mut rga = RgaClient::new_serial("/dev/ttyUSB0")?;
    /// rga.set_emission_current(Setting::Value(0.5))?;
    /// let emission = rga.turn_on_filament()?;
    /// println!("Filament on, {emission:.2} mA");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn turn_on_filament(&mut self) -> Result<f64, RgaError> {
        let setpoint = self.emission_current_ma;
        if setpoint < EMISSION_CURRENT_STEP_MA {
            return Err(RgaError::Validation(format!(
                "Emission current setpoint {setpoint:.2} mA would leave the filament off"
            )));
        }

        info!("Turning on filament at {setpoint:.2} mA...");
        self.send_command("FL", CommandArg::Float(setpoint, EMISSION_DECIMALS))?;

        let actual = self.get_emission_current()?;
        ensure_readback(
            "Emission current",
            setpoint,
            actual,
            actual >= EMISSION_CURRENT_STEP_MA
                && params::within_band(setpoint, actual, EMISSION_CURRENT_STEP_MA),
        )?;
        self.filament_on = true;
        info!("Filament on, emission current {actual:.2} mA");
        Ok(actual)
    }

    /// Switch the filament off and confirm it from the emission readback.
    ///
    /// A readback of one step or more is a hard failure and the filament stays
    /// marked on. If the readback itself cannot be obtained, the off command
    /// still counts and the outcome is [`FilamentOff::Unconfirmed`].
    pub fn turn_off_filament(&mut self) -> Result<FilamentOff, RgaError> {
        info!("Turning off filament...");
        self.send_command("FL", CommandArg::Float(0.0, EMISSION_DECIMALS))?;

        match self.get_emission_current() {
            Ok(current) if current < EMISSION_CURRENT_STEP_MA => {
                self.filament_on = false;
                info!("Filament off");
                Ok(FilamentOff::Confirmed(current))
            }
            Ok(current) => {
                self.filament_on = true;
                error!("Filament still emitting {current:.2} mA after turn-off");
                Err(DeviceError::FilamentStillOn(current).into())
            }
            Err(e) => {
                self.filament_on = false;
                error!("Could not confirm the filament is off: {e}");
                warn!("Check the emission current before venting");
                Ok(FilamentOff::Unconfirmed(e.to_string()))
            }
        }
    }

    /// Filament state known to the session.
    pub fn filament_on(&self) -> bool {
        self.filament_on
    }

    pub fn emission_setpoint(&self) -> f64 {
        self.emission_current_ma
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{DeviceError, RgaError};
    use crate::rga::mock::{FakeRga, connect};
    use crate::types::{FilamentOff, Setting};

    #[test]
    fn test_setpoint_is_local() {
        let (mut client, mock) = connect(FakeRga::default());
        assert_eq!(client.emission_setpoint(), 1.0);
        assert_eq!(client.set_emission_current(Setting::Value(0.5)).unwrap(), 0.5);
        assert!(matches!(
            client.set_emission_current(Setting::Value(0.51)),
            Err(RgaError::Validation(_))
        ));
        assert!(client.set_emission_current(Setting::Value(3.6)).is_err());
        assert_eq!(client.emission_setpoint(), 0.5);
        assert!(mock.device().take_written().is_empty());
    }

    #[test]
    fn test_turn_on_and_off() {
        let (mut client, mock) = connect(FakeRga::default());
        assert_eq!(client.turn_on_filament().unwrap(), 1.0);
        assert!(client.filament_on());
        assert!(client.get_filament_status().unwrap());

        assert_eq!(
            client.turn_off_filament().unwrap(),
            FilamentOff::Confirmed(0.0)
        );
        assert!(!client.filament_on());
        assert_eq!(
            mock.device().take_written(),
            vec!["FL1.00", "FL?", "FL?", "FL0.00", "FL?"]
        );
    }

    #[test]
    fn test_zero_setpoint_refused() {
        let (mut client, mock) = connect(FakeRga::default());
        client.set_emission_current(Setting::Value(0.0)).unwrap();
        assert!(matches!(
            client.turn_on_filament(),
            Err(RgaError::Validation(_))
        ));
        assert!(!client.filament_on());
        assert!(mock.device().take_written().is_empty());
    }

    #[test]
    fn test_silent_turn_on_is_not_on() {
        let (mut client, mock) = connect(FakeRga::default());
        mock.device().ignore_sets.push("FL");
        assert!(matches!(
            client.turn_on_filament(),
            Err(RgaError::ReadbackMismatch { .. })
        ));
        assert!(!client.filament_on());
    }

    #[test]
    fn test_lingering_current_is_hard_failure() {
        let (mut client, mock) = connect(FakeRga::default());
        client.turn_on_filament().unwrap();
        mock.device().lingering_emission = Some(0.4);
        assert!(matches!(
            client.turn_off_filament(),
            Err(RgaError::Device(DeviceError::FilamentStillOn(c))) if c == 0.4
        ));
        assert!(client.filament_on());
    }

    #[test]
    fn test_unconfirmed_turn_off() {
        let (mut client, mock) = connect(FakeRga::default());
        client.turn_on_filament().unwrap();
        mock.device().mute_queries.push("FL");
        let outcome = client.turn_off_filament().unwrap();
        assert!(!outcome.is_confirmed());
        assert!(matches!(outcome, FilamentOff::Unconfirmed(_)));
        assert!(!client.filament_on());
    }

    #[test]
    fn test_filament_error_in_status() {
        let (mut client, mock) = connect(FakeRga::default());
        mock.device().status = 0b0000_0010;
        assert!(matches!(
            client.turn_on_filament(),
            Err(RgaError::Device(DeviceError::Status("FIL_ERR")))
        ));
        assert!(!client.filament_on());
    }
}
