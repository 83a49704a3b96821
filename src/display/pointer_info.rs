use std::rc::Rc;

use crate::device::{DeviceId, DeviceTool};
use crate::event::ModifierType;
use crate::window::WindowId;

/// Per-pointer bookkeeping for crossing synthesis.
#[derive(Debug, Default, Clone)]
pub struct PointerWindowInfo {
    pub toplevel_under_pointer: Option<WindowId>,
    pub window_under_pointer: Option<WindowId>,
    /// Last position, relative to `toplevel_under_pointer`.
    pub toplevel_x: f64,
    pub toplevel_y: f64,
    pub state: ModifierType,
    pub button: u32,
    /// Slave that most recently drove this pointer.
    pub last_slave: Option<DeviceId>,
    pub last_tool: Option<Rc<DeviceTool>>,
    /// An Enter is owed on the next press, after a touchscreen ungrab.
    pub need_touch_press_enter: bool,
}
