//! Input devices.
//!
//! A [`Device`] is one input endpoint. Devices live in the
//! [`DeviceManager`](crate::device_manager::DeviceManager), which owns them and
//! performs the operations that touch more than one device (pairing masters,
//! attaching slaves). Relations between devices are stored as [`DeviceId`]s.

use std::fmt;
use std::rc::Rc;

use tracing::warn;

use crate::error::InputError;
use crate::event::ModifierType;
use crate::seat::SeatId;

pub mod axis;
pub mod tool;

pub use axis::{AxisFlags, AxisInfo, AxisUse, CoordSpace};
pub use tool::{DeviceTool, DeviceToolType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device {}", self.0)
    }
}

/// Role of a device in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// Logical pointer or keyboard, paired with a master of the other kind.
    Master,
    /// Physical device routing its events through a master.
    Slave,
    /// Physical device attached to no master.
    Floating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSource {
    Mouse,
    Pen,
    Eraser,
    Cursor,
    Keyboard,
    Touchscreen,
    Touchpad,
    Trackpoint,
    TabletPad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputMode {
    Disabled,
    Screen,
    Window,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceKey {
    pub keyval: u32,
    pub modifiers: ModifierType,
}

/// One motion history sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeCoord {
    pub time: u32,
    pub axes: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Device {
    id: DeviceId,
    name: String,
    device_type: DeviceType,
    source: InputSource,
    mode: InputMode,
    has_cursor: bool,
    vendor_id: Option<String>,
    product_id: Option<String>,
    axes: Vec<AxisInfo>,
    axis_flags: AxisFlags,
    keys: Vec<DeviceKey>,
    num_touches: u32,
    associated: Option<DeviceId>,
    slaves: Vec<DeviceId>,
    seat: Option<SeatId>,
    last_tool: Option<Rc<DeviceTool>>,
}

impl Device {
    pub fn new(
        id: DeviceId,
        name: impl Into<String>,
        device_type: DeviceType,
        source: InputSource,
        mode: InputMode,
        has_cursor: bool,
    ) -> Self {
        // Nothing is attached yet.
        let device_type = match device_type {
            DeviceType::Slave => DeviceType::Floating,
            other => other,
        };

        Self {
            id,
            name: name.into(),
            device_type,
            source,
            mode,
            has_cursor,
            vendor_id: None,
            product_id: None,
            axes: Vec::new(),
            axis_flags: AxisFlags::empty(),
            keys: Vec::new(),
            num_touches: 0,
            associated: None,
            slaves: Vec::new(),
            seat: None,
            last_tool: None,
        }
    }

    pub fn with_ids(mut self, vendor_id: Option<String>, product_id: Option<String>) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    pub fn with_num_touches(mut self, num_touches: u32) -> Self {
        self.num_touches = num_touches;
        self
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Human-readable name. Not unique.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn source(&self) -> InputSource {
        self.source
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn has_cursor(&self) -> bool {
        self.has_cursor
    }

    pub fn is_master(&self) -> bool {
        self.device_type == DeviceType::Master
    }

    pub fn is_keyboard(&self) -> bool {
        self.source == InputSource::Keyboard
    }

    /// Vendor id as four hex digits; masters have none.
    pub fn vendor_id(&self) -> Option<&str> {
        if self.is_master() {
            warn!("{} is a master and has no vendor id", self.id);
            return None;
        }
        self.vendor_id.as_deref()
    }

    pub fn product_id(&self) -> Option<&str> {
        if self.is_master() {
            warn!("{} is a master and has no product id", self.id);
            return None;
        }
        self.product_id.as_deref()
    }

    pub fn num_touches(&self) -> u32 {
        self.num_touches
    }

    /// For a master, its paired master; for a slave, its master.
    pub fn associated_device(&self) -> Option<DeviceId> {
        self.associated
    }

    pub fn seat(&self) -> Option<SeatId> {
        self.seat
    }

    pub fn last_tool(&self) -> Option<&Rc<DeviceTool>> {
        self.last_tool.as_ref()
    }

    /// Slaves routing through this master.
    pub fn list_slave_devices(&self) -> &[DeviceId] {
        if !self.is_master() {
            warn!("list_slave_devices called on non-master {}", self.id);
            return &[];
        }
        &self.slaves
    }

    /// Sets the input mode; masters cannot be disabled.
    pub fn set_mode(&mut self, mode: InputMode) -> bool {
        if self.mode == mode {
            return true;
        }

        if mode == InputMode::Disabled && self.is_master() {
            return false;
        }

        self.mode = mode;
        true
    }

    // =========================================================================
    // Keys
    // =========================================================================

    pub fn n_keys(&self) -> usize {
        self.keys.len()
    }

    /// Resets the macro-button table to `num_keys` unset entries.
    pub fn set_keys(&mut self, num_keys: usize) {
        self.keys = vec![DeviceKey::default(); num_keys];
    }

    pub fn set_key(&mut self, index: usize, keyval: u32, modifiers: ModifierType) {
        let Some(key) = self.keys.get_mut(index) else {
            warn!("key index {index} out of range for {}", self.id);
            return;
        };
        *key = DeviceKey { keyval, modifiers };
    }

    /// The mapping of macro button `index`, if set.
    pub fn get_key(&self, index: usize) -> Option<DeviceKey> {
        let key = *self.keys.get(index)?;
        if key.keyval == 0 && key.modifiers.is_empty() {
            return None;
        }
        Some(key)
    }

    // =========================================================================
    // Axes
    // =========================================================================

    pub fn n_axes(&self) -> usize {
        self.axes.len()
    }

    pub fn axes(&self) -> &[AxisInfo] {
        &self.axes
    }

    /// Uses present among the axes.
    pub fn axis_flags(&self) -> AxisFlags {
        self.axis_flags
    }

    pub fn axis_info(&self, index: usize) -> Option<&AxisInfo> {
        self.axes.get(index)
    }

    pub fn axis_use(&self, index: usize) -> AxisUse {
        self.axes
            .get(index)
            .map_or(AxisUse::Ignore, |info| info.axis_use)
    }

    /// Appends an axis and returns its index.
    pub fn add_axis(
        &mut self,
        label: Option<String>,
        axis_use: AxisUse,
        min_value: f64,
        max_value: f64,
        resolution: f64,
    ) -> Result<usize, InputError> {
        if self.is_keyboard() {
            return Err(InputError::InvalidDevice {
                device: self.id,
                reason: "keyboards have no axes",
            });
        }

        self.axes.push(AxisInfo::new(
            label, axis_use, min_value, max_value, resolution,
        ));
        self.axis_flags |= axis_use.flag();
        Ok(self.axes.len() - 1)
    }

    pub fn reset_axes(&mut self) {
        self.axes.clear();
        self.axis_flags = AxisFlags::empty();
    }

    pub fn set_axis_use(&mut self, index: usize, axis_use: AxisUse) {
        let Some(info) = self.axes.get_mut(index) else {
            warn!("axis index {index} out of range for {}", self.id);
            return;
        };
        info.set_use(axis_use);
        self.axis_flags = self
            .axes
            .iter()
            .fold(AxisFlags::empty(), |flags, info| flags | info.axis_use.flag());
    }

    /// Axis labels in axis order.
    pub fn list_axes(&self) -> Vec<Option<&str>> {
        self.axes.iter().map(|info| info.label.as_deref()).collect()
    }

    /// Value of the axis labelled `label` in `axes`.
    pub fn get_axis_value(&self, axes: &[f64], label: &str) -> Option<f64> {
        if self.is_keyboard() {
            warn!("get_axis_value called on keyboard {}", self.id);
            return None;
        }

        let index = self
            .axes
            .iter()
            .position(|info| info.label.as_deref() == Some(label))?;
        axes.get(index).copied()
    }

    /// Value of the first axis with `axis_use` in `axes`.
    pub fn get_axis(&self, axes: &[f64], axis_use: AxisUse) -> Option<f64> {
        if self.is_keyboard() {
            warn!("get_axis called on keyboard {}", self.id);
            return None;
        }

        let index = self.axes.iter().position(|info| info.axis_use == axis_use)?;
        axes.get(index).copied()
    }

    /// Maps a raw X or Y value into window coordinates.
    pub fn translate_window_coord(
        &self,
        index: usize,
        value: f64,
        space: CoordSpace,
    ) -> Option<f64> {
        let info = self.axes.get(index)?;
        if !matches!(info.axis_use, AxisUse::X | AxisUse::Y) {
            return None;
        }

        let x_info = self.axes.iter().find(|info| info.axis_use == AxisUse::X)?;
        let y_info = self.axes.iter().find(|info| info.axis_use == AxisUse::Y)?;
        Some(axis::translate_window_coord(
            info, x_info, y_info, value, space,
        ))
    }

    /// Maps a raw X or Y value from screen units into a window whose root
    /// origin is `(window_root_x, window_root_y)`. Only meaningful in Screen
    /// mode.
    pub fn translate_screen_coord(
        &self,
        index: usize,
        value: f64,
        window_root_x: f64,
        window_root_y: f64,
        space: CoordSpace,
    ) -> Option<f64> {
        if self.mode != InputMode::Screen {
            return None;
        }

        let info = self.axes.get(index)?;
        let axis_width = info.max_value - info.min_value;
        let (scale, offset) = match info.axis_use {
            AxisUse::X => {
                let scale = if axis_width > 0. {
                    space.screen_width / axis_width
                } else {
                    1.
                };
                (scale, -window_root_x)
            }
            AxisUse::Y => {
                let scale = if axis_width > 0. {
                    space.screen_height / axis_width
                } else {
                    1.
                };
                (scale, -window_root_y)
            }
            _ => return None,
        };

        Some(offset + scale * (value - info.min_value))
    }

    /// Remaps a raw non-positional value onto the normalized range of its use.
    pub fn translate_axis(&self, index: usize, value: f64) -> Option<f64> {
        let info = self.axes.get(index)?;
        if matches!(info.axis_use, AxisUse::X | AxisUse::Y) {
            return None;
        }
        Some(info.translate(value))
    }

    // =========================================================================
    // Hierarchy, mutated through the device manager
    // =========================================================================

    /// Sets the associated device. On non-masters this also flips the role
    /// between Slave and Floating.
    pub(crate) fn set_associated(&mut self, associated: Option<DeviceId>) {
        self.associated = associated;

        if !self.is_master() {
            self.device_type = if associated.is_some() {
                DeviceType::Slave
            } else {
                DeviceType::Floating
            };
        }
    }

    pub(crate) fn add_slave(&mut self, slave: DeviceId) {
        if !self.is_master() {
            warn!("cannot attach {slave} to non-master {}", self.id);
            return;
        }
        if !self.slaves.contains(&slave) {
            self.slaves.insert(0, slave);
        }
    }

    pub(crate) fn remove_slave(&mut self, slave: DeviceId) {
        self.slaves.retain(|id| *id != slave);
    }

    pub(crate) fn set_seat(&mut self, seat: Option<SeatId>) {
        self.seat = seat;
    }

    /// Returns whether the tool changed.
    pub(crate) fn set_last_tool(&mut self, tool: Option<Rc<DeviceTool>>) -> bool {
        let same = match (&self.last_tool, &tool) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if same {
            return false;
        }

        self.last_tool = tool;
        true
    }

    pub(crate) fn set_axes(&mut self, axes: Vec<AxisInfo>) {
        self.axis_flags = axes
            .iter()
            .fold(AxisFlags::empty(), |flags, info| flags | info.axis_use.flag());
        self.axes = axes;
    }
}
