//! Axis descriptions and the value mapping from raw device units.

use bitflags::bitflags;

/// What an axis measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum AxisUse {
    Ignore = 0,
    X = 1,
    Y = 2,
    Pressure = 3,
    XTilt = 4,
    YTilt = 5,
    Wheel = 6,
    Distance = 7,
    Rotation = 8,
    Slider = 9,
}

impl AxisUse {
    pub const ALL: [AxisUse; 10] = [
        AxisUse::Ignore,
        AxisUse::X,
        AxisUse::Y,
        AxisUse::Pressure,
        AxisUse::XTilt,
        AxisUse::YTilt,
        AxisUse::Wheel,
        AxisUse::Distance,
        AxisUse::Rotation,
        AxisUse::Slider,
    ];

    pub fn flag(self) -> AxisFlags {
        AxisFlags::from_bits_retain(1 << self as u32)
    }

    /// Normalized output range for values of this use.
    ///
    /// X and Y get `(0, 0)`, meaning "match the window".
    pub fn normalized_range(self) -> (f64, f64) {
        match self {
            AxisUse::X | AxisUse::Y => (0., 0.),
            AxisUse::XTilt | AxisUse::YTilt => (-1., 1.),
            _ => (0., 1.),
        }
    }
}

bitflags! {
    /// Set of axis uses present on a device or advertised by a tool.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AxisFlags: u32 {
        const X = 1 << 1;
        const Y = 1 << 2;
        const PRESSURE = 1 << 3;
        const XTILT = 1 << 4;
        const YTILT = 1 << 5;
        const WHEEL = 1 << 6;
        const DISTANCE = 1 << 7;
        const ROTATION = 1 << 8;
        const SLIDER = 1 << 9;
    }
}

impl AxisFlags {
    /// Uses in axis order.
    pub fn uses(self) -> impl Iterator<Item = AxisUse> {
        AxisUse::ALL
            .into_iter()
            .filter(move |axis_use| *axis_use != AxisUse::Ignore && self.contains(axis_use.flag()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisInfo {
    pub label: Option<String>,
    pub axis_use: AxisUse,
    /// Normalized output range.
    pub min_axis: f64,
    pub max_axis: f64,
    /// Raw range reported by the device.
    pub min_value: f64,
    pub max_value: f64,
    pub resolution: f64,
}

impl AxisInfo {
    pub fn new(
        label: Option<String>,
        axis_use: AxisUse,
        min_value: f64,
        max_value: f64,
        resolution: f64,
    ) -> Self {
        let (min_axis, max_axis) = axis_use.normalized_range();
        Self {
            label,
            axis_use,
            min_axis,
            max_axis,
            min_value,
            max_value,
            resolution,
        }
    }

    pub fn set_use(&mut self, axis_use: AxisUse) {
        self.axis_use = axis_use;
        (self.min_axis, self.max_axis) = axis_use.normalized_range();
    }

    /// Linear remap of a raw value onto the normalized range.
    pub fn translate(&self, value: f64) -> f64 {
        let width = self.max_value - self.min_value;
        (self.max_axis * (value - self.min_value) + self.min_axis * (self.max_value - value))
            / width
    }
}

/// Pixel sizes needed to map absolute device coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordSpace {
    pub window_width: f64,
    pub window_height: f64,
    pub screen_width: f64,
    pub screen_height: f64,
}

/// Maps a raw X or Y value into `space`, preserving the device aspect ratio
/// and centering the device area in the window.
pub(super) fn translate_window_coord(
    axis: &AxisInfo,
    x_info: &AxisInfo,
    y_info: &AxisInfo,
    value: f64,
    space: CoordSpace,
) -> f64 {
    let mut device_width = x_info.max_value - x_info.min_value;
    let mut device_height = y_info.max_value - y_info.min_value;

    let x_min = if device_width > 0. {
        x_info.min_value
    } else {
        device_width = space.screen_width;
        0.
    };
    let y_min = if device_height > 0. {
        y_info.min_value
    } else {
        device_height = space.screen_height;
        0.
    };

    let (mut x_resolution, mut y_resolution) = (x_info.resolution, y_info.resolution);

    // Some drivers report a zero resolution. Only the ratio matters, so
    // assume square units.
    if x_resolution == 0. || y_resolution == 0. {
        x_resolution = 1.;
        y_resolution = 1.;
    }

    let device_aspect = (device_height * y_resolution) / (device_width * x_resolution);

    let (x_scale, y_scale, x_offset, y_offset);
    if device_aspect * space.window_width >= space.window_height {
        // Device taller than window.
        x_scale = space.window_width / device_width;
        y_scale = (x_scale * x_resolution) / y_resolution;
        x_offset = 0.;
        y_offset = -(device_height * y_scale - space.window_height) / 2.;
    } else {
        // Window taller than device.
        y_scale = space.window_height / device_height;
        x_scale = (y_scale * y_resolution) / x_resolution;
        y_offset = 0.;
        x_offset = -(device_width * x_scale - space.window_width) / 2.;
    }

    if axis.axis_use == AxisUse::X {
        x_offset + x_scale * (value - x_min)
    } else {
        y_offset + y_scale * (value - y_min)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn flags_follow_use_discriminants() {
        assert_eq!(AxisUse::X.flag(), AxisFlags::X);
        assert_eq!(AxisUse::Slider.flag(), AxisFlags::SLIDER);
        let flags = AxisFlags::PRESSURE | AxisFlags::X | AxisFlags::YTILT;
        assert_eq!(
            flags.uses().collect::<Vec<_>>(),
            [AxisUse::X, AxisUse::Pressure, AxisUse::YTilt]
        );
    }

    #[test]
    fn translate_pressure_and_tilt() {
        let pressure = AxisInfo::new(None, AxisUse::Pressure, 0., 65535., 0.);
        assert_abs_diff_eq!(pressure.translate(0.), 0.);
        assert_abs_diff_eq!(pressure.translate(65535.), 1.);
        assert_abs_diff_eq!(pressure.translate(16383.75), 0.25, epsilon = 1e-9);

        let tilt = AxisInfo::new(None, AxisUse::XTilt, -90., 90., 0.);
        assert_abs_diff_eq!(tilt.translate(-90.), -1.);
        assert_abs_diff_eq!(tilt.translate(0.), 0.);
        assert_abs_diff_eq!(tilt.translate(45.), 0.5);
    }

    #[test]
    fn window_coord_wide_device_fills_height() {
        // 2:1 device into a square window: the height constrains the scale
        // and the device overhangs the window on both sides.
        let x = AxisInfo::new(None, AxisUse::X, 0., 2000., 10.);
        let y = AxisInfo::new(None, AxisUse::Y, 0., 1000., 10.);
        let space = CoordSpace {
            window_width: 100.,
            window_height: 100.,
            screen_width: 1920.,
            screen_height: 1080.,
        };

        assert_abs_diff_eq!(translate_window_coord(&x, &x, &y, 1000., space), 50.);
        assert_abs_diff_eq!(translate_window_coord(&x, &x, &y, 0., space), -50.);
        assert_abs_diff_eq!(translate_window_coord(&y, &x, &y, 0., space), 0.);
        assert_abs_diff_eq!(translate_window_coord(&y, &x, &y, 1000., space), 100.);
    }

    #[test]
    fn window_coord_zero_resolution_uses_raw_ratio() {
        let x = AxisInfo::new(None, AxisUse::X, 0., 100., 0.);
        let y = AxisInfo::new(None, AxisUse::Y, 0., 400., 20.);
        let space = CoordSpace {
            window_width: 100.,
            window_height: 100.,
            screen_width: 1920.,
            screen_height: 1080.,
        };

        // Tall device into a square window: the width constrains the scale
        // and the device is centered vertically.
        assert_abs_diff_eq!(translate_window_coord(&x, &x, &y, 50., space), 50.);
        assert_abs_diff_eq!(translate_window_coord(&y, &x, &y, 200., space), 50.);
        assert_abs_diff_eq!(translate_window_coord(&y, &x, &y, 400., space), 250.);
    }
}
