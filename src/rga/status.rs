use crate::error::DeviceError;

/// Error name for each status bit, least significant bit first.
/// Bits 2 and 7 are reserved.
pub const STATUS_FLAGS: [Option<&str>; 8] = [
    Some("RS232_ERR"),
    Some("FIL_ERR"),
    None,
    Some("CEM_ERR"),
    Some("QMF_ERR"),
    Some("DET_ERR"),
    Some("PS_ERR"),
    None,
];

/// Bit that only carries meaning when an electron multiplier is installed.
pub const CEM_ERROR_BIT: u8 = 3;

/// Status echo returned after status-reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusByte {
    raw: u8,
}

impl StatusByte {
    /// Interpret `raw`, masking the CDEM bit when no multiplier is fitted.
    pub fn new(raw: u8, cdem_present: bool) -> Self {
        let raw = if cdem_present {
            raw
        } else {
            raw & !(1 << CEM_ERROR_BIT)
        };
        Self { raw }
    }

    /// The byte after masking.
    pub fn raw(&self) -> u8 {
        self.raw
    }

    pub fn flags(&self) -> [bool; 8] {
        std::array::from_fn(|bit| self.raw & (1 << bit) != 0)
    }

    /// Names of all set bits that map to an error.
    pub fn active_errors(&self) -> Vec<&'static str> {
        self.flags()
            .iter()
            .zip(STATUS_FLAGS)
            .filter_map(|(&set, name)| if set { name } else { None })
            .collect()
    }

    /// Fail on the first live error flag.
    pub fn check(&self) -> Result<(), DeviceError> {
        match self.active_errors().first().copied() {
            Some(name) => Err(DeviceError::Status(name)),
            None => Ok(()),
        }
    }
}
