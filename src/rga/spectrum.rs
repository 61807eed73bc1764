use super::protocol::{Protocol, SAMPLE_SIZE};
use crate::error::{ProtocolError, RgaError};
use crate::types::{ScanWindow, Spectrum};

/// Exponent of the raw current mantissa, in amperes.
pub const CURRENT_MULTIPLIER: f64 = 1e-16;

/// Decode a raw current sample into amperes.
pub fn decode_current(bytes: &[u8]) -> Result<f64, ProtocolError> {
    Ok(Protocol::decode_sample(bytes)? as f64 * CURRENT_MULTIPLIER)
}

/// Ion current (A) to pressure (Torr) for a sensitivity in mA/Torr.
pub fn current_to_pressure(current_a: f64, sensitivity_ma_per_torr: f64) -> f64 {
    current_a / sensitivity_ma_per_torr * 1000.0
}

/// Mass axis of a scan: `min`, `min + 1/res`, ... `max`, rounded to 0.01 AMU.
pub fn mass_axis(window: &ScanWindow) -> Vec<f64> {
    let points = window.points();
    let step = 1.0 / window.resolution as f64;
    let mut axis: Vec<f64> = (0..points.saturating_sub(1))
        .map(|i| round_mass(window.min as f64 + step * i as f64))
        .collect();
    axis.push(window.max as f64);
    axis
}

fn round_mass(mass: f64) -> f64 {
    (mass * 100.0).round() / 100.0
}

/// Byte length of an analog scan payload: one sample per mass plus the
/// trailing total pressure sample.
pub fn expected_payload_len(window: &ScanWindow) -> usize {
    SAMPLE_SIZE * (window.points() + 1)
}

/// Decode a complete analog scan payload.
///
/// Every frame but the last is a partial pressure sample, the last one is the
/// total pressure. The payload must match the window exactly.
pub fn decode_spectrum(
    payload: &[u8],
    window: &ScanWindow,
    partial_sens: f64,
    total_sens: f64,
) -> Result<Spectrum, RgaError> {
    if payload.is_empty() || payload.len() % SAMPLE_SIZE != 0 {
        return Err(ProtocolError::Malformed(format!(
            "Scan payload of {} bytes is not a whole number of samples",
            payload.len()
        ))
        .into());
    }

    let frames: Vec<&[u8]> = payload.chunks_exact(SAMPLE_SIZE).collect();
    let (total_frame, mass_frames) = frames
        .split_last()
        .ok_or_else(|| ProtocolError::Malformed("Empty scan payload".to_string()))?;

    let masses = mass_axis(window);
    let pressures = mass_frames
        .iter()
        .map(|frame| decode_current(frame).map(|i| current_to_pressure(i, partial_sens)))
        .collect::<Result<Vec<f64>, ProtocolError>>()?;

    if masses.len() != pressures.len() {
        return Err(ProtocolError::Malformed(format!(
            "Cannot parse spectrum: {} masses but {} pressure samples",
            masses.len(),
            pressures.len()
        ))
        .into());
    }

    let total_pressure = current_to_pressure(decode_current(total_frame)?, total_sens);

    Ok(Spectrum {
        window: *window,
        masses,
        pressures,
        total_pressure,
    })
}
