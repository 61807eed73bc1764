use super::{RgaClient, STATUS_ATTEMPTS};
use crate::error::RgaError;
use crate::rga::protocol::{CommandArg, STATUS_ECHO_SIZE};
use crate::types::RgaModel;
use log::{debug, info};

impl RgaClient {
    /// Query the identification string of the head.
    ///
    /// # Examples
    /// ```no_run
    /// use rusty_rga::RgaClient;
    ///
    /// let mut rga = RgaClient::new_serial("/dev/ttyUSB0")?;
    /// println!("{}", rga.get_device_id()?); // e.g. SRSRGA200VER0.24SN19254
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn get_device_id(&mut self) -> Result<String, RgaError> {
        self.send_command("ID", CommandArg::Query)?;
        self.read_line()
    }

    /// Query the id and derive the model, and with it the mass ceiling.
    pub fn identify(&mut self) -> Result<RgaModel, RgaError> {
        let id = self.get_device_id()?;
        let model = RgaModel::from_device_id(&id)?;
        debug!("Detected model {model} (max {} AMU)", model.max_mass());
        self.device_id = id;
        self.model = model;
        Ok(model)
    }

    /// Ask the head whether an electron multiplier is installed.
    ///
    /// The reply is a 3 byte echo; bit 0 of the first byte is set when the
    /// multiplier is missing.
    pub fn get_cdem_presence(&mut self) -> Result<bool, RgaError> {
        self.send_command("EM", CommandArg::Query)?;
        let reply = self.read_bytes(STATUS_ECHO_SIZE, STATUS_ATTEMPTS)?;
        let present = reply[0] & 0x01 == 0;
        info!(
            "Electron multiplier {}",
            if present { "installed" } else { "not installed" }
        );
        Ok(present)
    }

    /// Run the internal calibration of the electrometer and drop whatever the
    /// head leaves in the buffer afterwards.
    pub fn calibrate_all(&mut self) -> Result<(), RgaError> {
        info!("Calibrating electrometer...");
        self.send_command("CA", CommandArg::None)?;
        self.flush_input()?;
        Ok(())
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn model(&self) -> RgaModel {
        self.model
    }

    /// Multiplier presence as detected when the session was opened.
    pub fn cdem_present(&self) -> bool {
        self.cdem_present
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{DeviceError, RgaError};
    use crate::rga::mock::{FakeRga, connect};
    use crate::types::RgaModel;

    #[test]
    fn test_identify() {
        let (mut client, mock) = connect(FakeRga {
            id: "SRSRGA300VER0.24SN00042".to_string(),
            ..FakeRga::default()
        });
        assert_eq!(client.model(), RgaModel::Rga300);
        assert_eq!(client.device_id(), "SRSRGA300VER0.24SN00042");
        assert_eq!(client.identify().unwrap(), RgaModel::Rga300);
        assert_eq!(mock.device().take_written(), vec!["ID?"]);
    }

    #[test]
    fn test_cdem_presence() {
        let (mut client, mock) = connect(FakeRga::default());
        assert!(client.get_cdem_presence().unwrap());
        mock.device().cdem_present = false;
        assert!(!client.get_cdem_presence().unwrap());
    }

    #[test]
    fn test_calibrate_drains_residue() {
        let (mut client, mock) = connect(FakeRga::default());
        mock.device().calibration_residue = b"0\n\r0\n\r".to_vec();
        client.calibrate_all().unwrap();
        assert_eq!(mock.device().take_written(), vec!["CA"]);
        // Nothing from the calibration leaks into the next reply.
        assert_eq!(client.get_noise_floor().unwrap(), 4);
    }

    #[test]
    fn test_calibrate_reports_status_error() {
        let (mut client, mock) = connect(FakeRga::default());
        mock.device().status = 0b0001_0000;
        assert!(matches!(
            client.calibrate_all(),
            Err(RgaError::Device(DeviceError::Status("QMF_ERR")))
        ));
    }
}
