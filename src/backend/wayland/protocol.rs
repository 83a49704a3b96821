//! Wayland input traffic as the backend consumes it.
//!
//! The connection itself (object ids, marshalling, listeners) belongs to the
//! client library. What reaches [`WaylandBackend`](super::WaylandBackend) is
//! one [`WlEvent`] per protocol event, already resolved to windows and to
//! the seat it arrived on, plus the handful of requests made through
//! [`Compositor`].

use bitflags::bitflags;

use crate::cursor::CursorBuffer;
use crate::window::WindowId;

/// `wl_pointer.frame` first appeared in this `wl_seat` version.
pub const POINTER_HAS_FRAME: u32 = 5;

/// evdev button codes.
pub mod buttons {
    pub const BTN_LEFT: u32 = 0x110;
    pub const BTN_RIGHT: u32 = 0x111;
    pub const BTN_MIDDLE: u32 = 0x112;
    pub const BTN_STYLUS3: u32 = 0x149;
    pub const BTN_STYLUS: u32 = 0x14b;
    pub const BTN_STYLUS2: u32 = 0x14c;
}

/// Name of a `wl_seat` global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalName(pub u32);

/// A `zwp_tablet_v2` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabletId(pub u32);

/// A `zwp_tablet_tool_v2` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToolId(pub u32);

/// A `zwp_tablet_pad_v2` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PadId(pub u32);

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capability: u32 {
        const POINTER = 1;
        const KEYBOARD = 2;
        const TOUCH = 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Released,
    Pressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Released,
    Pressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    VerticalScroll,
    HorizontalScroll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisSource {
    Wheel,
    Finger,
    Continuous,
    WheelTilt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    Enter {
        serial: u32,
        surface: WindowId,
        surface_x: f64,
        surface_y: f64,
    },
    Leave {
        serial: u32,
        surface: WindowId,
    },
    Motion {
        time: u32,
        surface_x: f64,
        surface_y: f64,
    },
    Button {
        serial: u32,
        time: u32,
        button: u32,
        state: ButtonState,
    },
    Axis {
        time: u32,
        axis: Axis,
        value: f64,
    },
    Frame,
    AxisSource(AxisSource),
    AxisStop {
        time: u32,
        axis: Axis,
    },
    AxisDiscrete {
        axis: Axis,
        discrete: i32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyboardEvent {
    /// `format` 1 is xkb v1; the keymap arrives already read from its fd.
    Keymap {
        format: u32,
        data: Vec<u8>,
    },
    Enter {
        serial: u32,
        surface: WindowId,
        keys: Vec<u32>,
    },
    Leave {
        serial: u32,
        surface: WindowId,
    },
    Key {
        serial: u32,
        time: u32,
        key: u32,
        state: KeyState,
    },
    Modifiers {
        serial: u32,
        depressed: u32,
        latched: u32,
        locked: u32,
        group: u32,
    },
    /// `rate` in characters per second, `delay` in milliseconds.
    RepeatInfo {
        rate: i32,
        delay: i32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TouchEvent {
    Down {
        serial: u32,
        time: u32,
        surface: WindowId,
        id: i32,
        x: f64,
        y: f64,
    },
    Up {
        serial: u32,
        time: u32,
        id: i32,
    },
    Motion {
        time: u32,
        id: i32,
        x: f64,
        y: f64,
    },
    Frame,
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwipeEvent {
    Begin {
        serial: u32,
        time: u32,
        surface: WindowId,
        fingers: u32,
    },
    Update {
        time: u32,
        dx: f64,
        dy: f64,
    },
    End {
        serial: u32,
        time: u32,
        cancelled: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PinchEvent {
    Begin {
        serial: u32,
        time: u32,
        surface: WindowId,
        fingers: u32,
    },
    /// `rotation` is in degrees.
    Update {
        time: u32,
        dx: f64,
        dy: f64,
        scale: f64,
        rotation: f64,
    },
    End {
        serial: u32,
        time: u32,
        cancelled: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TabletEvent {
    Name(String),
    Id { vid: u32, pid: u32 },
    Path(String),
    Done,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolType {
    Pen,
    Eraser,
    Brush,
    Pencil,
    Airbrush,
    Finger,
    Mouse,
    Lens,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCapability {
    Tilt,
    Pressure,
    Distance,
    Rotation,
    Slider,
    Wheel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    Type(ToolType),
    HardwareSerial { hi: u32, lo: u32 },
    HardwareIdWacom { hi: u32, lo: u32 },
    Capability(ToolCapability),
    Done,
    Removed,
    ProximityIn {
        serial: u32,
        tablet: TabletId,
        surface: WindowId,
    },
    ProximityOut,
    Down { serial: u32 },
    Up,
    Motion { x: f64, y: f64 },
    /// 0..=65535.
    Pressure(u32),
    /// 0..=65535.
    Distance(u32),
    /// Degrees.
    Tilt { x: f64, y: f64 },
    /// Degrees.
    Rotation(f64),
    /// -65535..=65535.
    Slider(i32),
    Wheel { degrees: f64, clicks: i32 },
    Button {
        serial: u32,
        button: u32,
        state: ButtonState,
    },
    Frame { time: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PadEvent {
    /// Announces a group; `group` is its index in announcement order.
    Group { group: u32 },
    Path(String),
    Buttons(u32),
    Done,
    Button {
        time: u32,
        button: u32,
        state: ButtonState,
    },
    Enter {
        serial: u32,
        tablet: TabletId,
        surface: WindowId,
    },
    Leave {
        serial: u32,
        surface: WindowId,
    },
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PadGroupEvent {
    Buttons(Vec<u32>),
    /// Announces a ring of the group, in order.
    Ring,
    /// Announces a strip of the group, in order.
    Strip,
    Modes(u32),
    Done,
    ModeSwitch { time: u32, serial: u32, mode: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingSource {
    Finger,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PadRingEvent {
    Source(RingSource),
    /// Degrees, or -1 when the finger lifted.
    Angle(f64),
    Stop,
    Frame { time: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PadStripEvent {
    Source(RingSource),
    /// 0..=65535, or -1 when the finger lifted.
    Position(u32),
    Stop,
    Frame { time: u32 },
}

/// Everything a seat may report.
#[derive(Debug, Clone, PartialEq)]
pub enum SeatEvent {
    Capabilities(Capability),
    Name(String),
    Pointer(PointerEvent),
    Keyboard(KeyboardEvent),
    Touch(TouchEvent),
    Swipe(SwipeEvent),
    Pinch(PinchEvent),
    TabletAdded(TabletId),
    Tablet(TabletId, TabletEvent),
    ToolAdded(ToolId),
    Tool(ToolId, ToolEvent),
    PadAdded(PadId),
    Pad(PadId, PadEvent),
    PadGroup {
        pad: PadId,
        group: u32,
        event: PadGroupEvent,
    },
    PadRing {
        pad: PadId,
        group: u32,
        ring: u32,
        event: PadRingEvent,
    },
    PadStrip {
        pad: PadId,
        group: u32,
        strip: u32,
        event: PadStripEvent,
    },
    /// `wl_data_device.selection`: the clipboard changed hands.
    Selection,
    /// `zwp_primary_selection_device_v1.selection`.
    PrimarySelection,
    /// The `wl_display.sync` requested after a key repeat completed.
    RepeatSyncDone,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WlEvent {
    /// A `wl_seat` global was announced.
    SeatGlobal { name: GlobalName, version: u32 },
    SeatGlobalRemoved(GlobalName),
    Seat(GlobalName, SeatEvent),
}

/// Which cursor surface a request is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorTarget {
    Pointer(GlobalName),
    Tool(GlobalName, ToolId),
}

/// Requests the backend makes on the connection.
pub trait Compositor {
    /// Whether `zwp_pointer_gestures_v1` is bound.
    fn has_pointer_gestures(&self) -> bool {
        false
    }

    /// Issues a `wl_display.sync` whose `done` is reported back as
    /// [`SeatEvent::RepeatSyncDone`] on `seat`.
    fn repeat_sync(&mut self, seat: GlobalName);

    /// Attaches `buffer` to the cursor surface of `target`, or hides the
    /// cursor when there is none. `serial` is the enter (or proximity)
    /// serial the compositor checks.
    fn set_cursor(&mut self, target: CursorTarget, serial: u32, buffer: Option<CursorBuffer>);
}
