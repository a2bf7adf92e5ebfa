//! Color negotiation between the Controller's and Backend's representations.
//!
//! The Controller speaks chromaticity pairs or Kelvin temperatures; the
//! Backend accepts either, but a given device usually supports only one.
//! Everything here is a pure function over the capability snapshot.

use super::message::ColorMode;
use super::session::CapabilitySnapshot;

/// Chromaticity tolerance for preset-echo suppression, per axis.
pub const ECHO_TOLERANCE: f64 = 0.005;

/// The wire representation chosen for a color command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorRepresentation {
    Temperature(u32),
    Chromaticity(f64, f64),
}

/// Choose the wire representation for a color request.
///
/// Honors the requested mode when the device supports it; otherwise falls
/// back to whichever representation the device does support, converting
/// across the CCT/chromaticity divide. Returns `None` when the device has no
/// color support at all.
pub fn choose_representation(
    x: f64,
    y: f64,
    requested: ColorMode,
    caps: &CapabilitySnapshot,
) -> Option<ColorRepresentation> {
    let (min_k, max_k) = caps.color_temp_range;

    match requested {
        ColorMode::FullColor => {
            if caps.supports_full_color {
                Some(ColorRepresentation::Chromaticity(x, y))
            } else if caps.supports_color_temperature {
                Some(ColorRepresentation::Temperature(
                    xy_to_kelvin(x, y).clamp(min_k, max_k),
                ))
            } else {
                None
            }
        }
        ColorMode::ColorTemperature => {
            // Kelvin rides in the x coordinate for temperature requests.
            let kelvin = x.max(0.0) as u32;
            if caps.supports_color_temperature {
                Some(ColorRepresentation::Temperature(kelvin.clamp(min_k, max_k)))
            } else if caps.supports_full_color {
                let (cx, cy) = kelvin_to_xy(kelvin);
                Some(ColorRepresentation::Chromaticity(cx, cy))
            } else {
                None
            }
        }
    }
}

/// Linear dim-to-warm blend between the dim and on presets.
///
/// Evaluated once per brightness command, never incrementally. The caller
/// only invokes this with brightness > 0 (the power-off path never fades).
pub fn interpolate(dim: (f64, f64), on: (f64, f64), brightness_pct: u8) -> (f64, f64) {
    let t = f64::from(brightness_pct.min(100)) / 100.0;
    (
        dim.0 + (on.0 - dim.0) * t,
        dim.1 + (on.1 - dim.1) * t,
    )
}

/// Whether a requested chromaticity is an echo of one of the fade presets.
///
/// The Backend-facing proxy periodically re-sends the nominal preset colors
/// to correct drift; forwarding those would overwrite the continuously
/// interpolated fade color with a stale fixed value, causing visible
/// stepping.
pub fn should_suppress_echo(
    requested: (f64, f64),
    on_color: Option<(f64, f64)>,
    dim_color: Option<(f64, f64)>,
    tolerance: f64,
) -> bool {
    let near = |preset: (f64, f64)| {
        (requested.0 - preset.0).abs() < tolerance && (requested.1 - preset.1).abs() < tolerance
    };
    on_color.is_some_and(near) || dim_color.is_some_and(near)
}

/// Approximate the chromaticity of a blackbody at the given temperature
/// (Kim et al. cubic spline, valid 1667K-25000K; clamped outside).
pub fn kelvin_to_xy(kelvin: u32) -> (f64, f64) {
    let t = f64::from(kelvin.clamp(1667, 25000));

    let x = if t <= 4000.0 {
        -0.2661239e9 / (t * t * t) - 0.2343589e6 / (t * t) + 0.8776956e3 / t + 0.179910
    } else {
        -3.0258469e9 / (t * t * t) + 2.1070379e6 / (t * t) + 0.2226347e3 / t + 0.240390
    };

    let x2 = x * x;
    let x3 = x2 * x;
    let y = if t <= 2222.0 {
        -1.1063814 * x3 - 1.34811020 * x2 + 2.18555832 * x - 0.20219683
    } else if t <= 4000.0 {
        -0.9549476 * x3 - 1.37418593 * x2 + 2.09137015 * x - 0.16748867
    } else {
        3.0817580 * x3 - 5.87338670 * x2 + 3.75112997 * x - 0.37001483
    };

    (x, y)
}

/// Approximate the correlated color temperature of a chromaticity
/// (McCamy's formula).
pub fn xy_to_kelvin(x: f64, y: f64) -> u32 {
    let n = (x - 0.3320) / (0.1858 - y);
    let cct = 449.0 * n * n * n + 3525.0 * n * n + 6823.3 * n + 5520.33;
    cct.clamp(1000.0, 40000.0) as u32
}
