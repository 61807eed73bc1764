use textplots::{Chart, Plot, Shape};

use crate::types::Spectrum;

/// Scale and SI prefix that bring `max_value` into a readable range.
fn determine_scale(max_value: f64) -> (f64, &'static str) {
    if max_value >= 1.0 || max_value == 0.0 {
        (1.0, "")
    } else if max_value >= 1e-3 {
        (1e3, "m")
    } else if max_value >= 1e-6 {
        (1e6, "μ")
    } else if max_value >= 1e-9 {
        (1e9, "n")
    } else if max_value >= 1e-12 {
        (1e12, "p")
    } else {
        (1e15, "f")
    }
}

/// Format a pressure with an SI prefix, e.g. `4.000 nTorr`.
pub fn format_pressure(torr: f64) -> String {
    let (scale, prefix) = determine_scale(torr.abs());
    format!("{:.3} {prefix}Torr", torr * scale)
}

/// Print a spectrum as a terminal line plot, mass on the x axis.
///
/// # Examples
/// ```
/// use rusty_rga::plotting::plot_spectrum;
/// use rusty_rga::{ScanWindow, Spectrum};
///
/// let spectrum = Spectrum {
///     window: ScanWindow::new(1, 2, 10),
///     masses: (0..=10).map(|i| 1.0 + i as f64 / 10.0).collect(),
///     pressures: vec![1e-9; 11],
///     total_pressure: 2e-8,
/// };
/// plot_spectrum(&spectrum, None, None).unwrap();
/// ```
pub fn plot_spectrum(
    spectrum: &Spectrum,
    width: Option<usize>,
    height: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    if spectrum.is_empty() || spectrum.masses.len() != spectrum.pressures.len() {
        return Err("Cannot plot an empty or inconsistent spectrum".into());
    }

    let width = width.unwrap_or(140);
    let height = height.unwrap_or(60);

    let max_pressure = spectrum
        .pressures
        .iter()
        .fold(0.0f64, |acc, p| acc.max(p.abs()));
    let (scale, prefix) = determine_scale(max_pressure);

    let points: Vec<(f32, f32)> = spectrum
        .masses
        .iter()
        .zip(&spectrum.pressures)
        .map(|(&m, &p)| (m as f32, (p * scale) as f32))
        .collect();

    println!("Spectrum {}", spectrum.window);
    println!("X-axis: Mass (AMU) | Y-axis: Partial pressure ({prefix}Torr)");
    println!(
        "Total pressure: {} | Peak: {}",
        format_pressure(spectrum.total_pressure),
        spectrum
            .peak()
            .map(|(m, p)| format!("{} at {m:.2} AMU", format_pressure(p)))
            .unwrap_or_default()
    );
    println!("{}", "─".repeat(width));

    Chart::new(
        width as u32,
        height as u32,
        spectrum.window.min as f32,
        spectrum.window.max as f32,
    )
    .lineplot(&Shape::Lines(&points))
    .nice();

    Ok(())
}

/// Plot repeated readings of one quantity against the reading index.
pub fn plot_trend(
    values: &[f64],
    title: &str,
    unit: &str,
    width: Option<usize>,
    height: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    if values.len() < 2 {
        return Err("Need at least two readings to plot a trend".into());
    }

    let width = width.unwrap_or(140);
    let height = height.unwrap_or(40);
    let max_abs = values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    let (scale, prefix) = determine_scale(max_abs);

    let points: Vec<(f32, f32)> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f32, (v * scale) as f32))
        .collect();

    println!("{title}");
    println!("X-axis: Reading | Y-axis: {prefix}{unit}");
    println!("{}", "─".repeat(width));
    Chart::new(width as u32, height as u32, 0.0, (values.len() - 1) as f32)
        .lineplot(&Shape::Lines(&points))
        .nice();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScanWindow;

    #[test]
    fn test_determine_scale() {
        assert_eq!(determine_scale(5.0), (1.0, ""));
        assert_eq!(determine_scale(0.0), (1.0, ""));
        assert_eq!(determine_scale(0.005), (1e3, "m"));
        assert_eq!(determine_scale(5e-6), (1e6, "μ"));
        assert_eq!(determine_scale(5e-9), (1e9, "n"));
        assert_eq!(determine_scale(5e-12), (1e12, "p"));
        assert_eq!(determine_scale(5e-14), (1e15, "f"));
    }

    #[test]
    fn test_format_pressure() {
        assert_eq!(format_pressure(4e-9), "4.000 nTorr");
        assert_eq!(format_pressure(2.5e-6), "2.500 μTorr");
    }

    #[test]
    fn test_plot_spectrum() {
        let spectrum = Spectrum {
            window: ScanWindow::new(1, 2, 10),
            masses: (0..=10).map(|i| 1.0 + i as f64 / 10.0).collect(),
            pressures: (0..=10).map(|i| i as f64 * 1e-10).collect(),
            total_pressure: 5e-9,
        };
        assert!(plot_spectrum(&spectrum, Some(80), Some(30)).is_ok());
    }

    #[test]
    fn test_plot_rejects_bad_input() {
        let empty = Spectrum {
            window: ScanWindow::default(),
            masses: vec![],
            pressures: vec![],
            total_pressure: 0.0,
        };
        assert!(plot_spectrum(&empty, None, None).is_err());
        assert!(plot_trend(&[1e-9], "Mass 28", "Torr", None, None).is_err());
        assert!(plot_trend(&[1e-9, 2e-9], "Mass 28", "Torr", None, None).is_ok());
    }
}
