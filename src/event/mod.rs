//! Normalized input events.
//!
//! Every backend translates its native traffic into [`Event`]s. An event names
//! its window, device, source device, seat and tool by handle; a copy of an
//! event holds the same handles and the tool by shared reference.

use std::rc::Rc;

use crate::device::tool::DeviceTool;
use crate::device::{AxisUse, Device, DeviceId};
use crate::seat::SeatId;
use crate::window::WindowId;

pub mod types;

pub use types::{
    CrossingMode, EventMask, EventSequence, EventType, ModifierType, NotifyType, OwnerChange,
    PadAxisSource, ScrollDirection, TouchpadGesturePhase,
};

/// Button numbers with a fixed meaning.
pub const BUTTON_PRIMARY: u32 = 1;
pub const BUTTON_MIDDLE: u32 = 2;
pub const BUTTON_SECONDARY: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventType,
    pub window: Option<WindowId>,
    /// Whether the event was sent by another client rather than the server.
    pub send_event: bool,
    pub device: Option<DeviceId>,
    pub source_device: Option<DeviceId>,
    pub seat: Option<SeatId>,
    pub tool: Option<Rc<DeviceTool>>,
    pub pointer_emulated: bool,
    pub data: EventData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    None,
    Motion(MotionEvent),
    Button(ButtonEvent),
    Key(KeyEvent),
    Crossing(CrossingEvent),
    Focus(FocusEvent),
    Scroll(ScrollEvent),
    Proximity(ProximityEvent),
    Touch(TouchEvent),
    TouchpadSwipe(TouchpadSwipeEvent),
    TouchpadPinch(TouchpadPinchEvent),
    PadButton(PadButtonEvent),
    PadAxis(PadAxisEvent),
    PadGroupMode(PadGroupModeEvent),
    GrabBroken(GrabBrokenEvent),
    OwnerChange(OwnerChangeEvent),
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MotionEvent {
    pub time: u32,
    pub x: f64,
    pub y: f64,
    pub axes: Option<Vec<f64>>,
    pub state: ModifierType,
    pub is_hint: bool,
    pub x_root: f64,
    pub y_root: f64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ButtonEvent {
    pub time: u32,
    pub x: f64,
    pub y: f64,
    pub axes: Option<Vec<f64>>,
    pub state: ModifierType,
    pub button: u32,
    pub x_root: f64,
    pub y_root: f64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct KeyEvent {
    pub time: u32,
    pub state: ModifierType,
    pub keyval: u32,
    /// Text produced by the key, already folded for control combinations.
    pub string: String,
    pub hardware_keycode: u16,
    pub group: u8,
    pub is_modifier: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossingEvent {
    pub subwindow: Option<WindowId>,
    pub time: u32,
    pub x: f64,
    pub y: f64,
    pub x_root: f64,
    pub y_root: f64,
    pub mode: CrossingMode,
    pub detail: NotifyType,
    pub focus: bool,
    pub state: ModifierType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusEvent {
    pub is_in: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrollEvent {
    pub time: u32,
    pub x: f64,
    pub y: f64,
    pub state: ModifierType,
    pub direction: ScrollDirection,
    pub x_root: f64,
    pub y_root: f64,
    pub delta_x: f64,
    pub delta_y: f64,
    pub is_stop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProximityEvent {
    pub time: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TouchEvent {
    pub time: u32,
    pub x: f64,
    pub y: f64,
    pub axes: Option<Vec<f64>>,
    pub state: ModifierType,
    pub sequence: EventSequence,
    pub emulating_pointer: bool,
    pub x_root: f64,
    pub y_root: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TouchpadSwipeEvent {
    pub phase: TouchpadGesturePhase,
    pub n_fingers: u32,
    pub time: u32,
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
    pub x_root: f64,
    pub y_root: f64,
    pub state: ModifierType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TouchpadPinchEvent {
    pub phase: TouchpadGesturePhase,
    pub n_fingers: u32,
    pub time: u32,
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
    /// Angle change in radians.
    pub angle_delta: f64,
    pub scale: f64,
    pub x_root: f64,
    pub y_root: f64,
    pub state: ModifierType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadButtonEvent {
    pub time: u32,
    pub group: u32,
    pub button: u32,
    pub mode: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PadAxisEvent {
    pub time: u32,
    pub group: u32,
    /// Index of the ring or strip among all rings or strips of the pad.
    pub index: u32,
    pub mode: u32,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadGroupModeEvent {
    pub time: u32,
    pub group: u32,
    pub mode: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrabBrokenEvent {
    pub keyboard: bool,
    pub implicit: bool,
    /// The window taking over the grab, if any.
    pub grab_window: Option<WindowId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerChangeEvent {
    pub owner: Option<WindowId>,
    pub reason: OwnerChange,
    pub selection: String,
    pub time: u32,
    pub selection_time: u32,
}

impl Event {
    pub fn new(kind: EventType, window: Option<WindowId>, data: EventData) -> Self {
        Self {
            kind,
            window,
            send_event: false,
            device: None,
            source_device: None,
            seat: None,
            tool: None,
            pointer_emulated: false,
            data,
        }
    }

    pub fn with_devices(mut self, device: DeviceId, source_device: Option<DeviceId>) -> Self {
        self.device = Some(device);
        self.source_device = source_device;
        self
    }

    pub fn with_seat(mut self, seat: Option<SeatId>) -> Self {
        self.seat = seat;
        self
    }

    /// Event time in milliseconds, or 0 for kinds without a timestamp.
    pub fn time(&self) -> u32 {
        match &self.data {
            EventData::Motion(ev) => ev.time,
            EventData::Button(ev) => ev.time,
            EventData::Key(ev) => ev.time,
            EventData::Crossing(ev) => ev.time,
            EventData::Scroll(ev) => ev.time,
            EventData::Proximity(ev) => ev.time,
            EventData::Touch(ev) => ev.time,
            EventData::TouchpadSwipe(ev) => ev.time,
            EventData::TouchpadPinch(ev) => ev.time,
            EventData::PadButton(ev) => ev.time,
            EventData::PadAxis(ev) => ev.time,
            EventData::PadGroupMode(ev) => ev.time,
            EventData::OwnerChange(ev) => ev.time,
            EventData::None | EventData::Focus(_) | EventData::GrabBroken(_) => 0,
        }
    }

    /// Window-relative coordinates.
    pub fn coords(&self) -> Option<(f64, f64)> {
        match &self.data {
            EventData::Motion(ev) => Some((ev.x, ev.y)),
            EventData::Button(ev) => Some((ev.x, ev.y)),
            EventData::Crossing(ev) => Some((ev.x, ev.y)),
            EventData::Scroll(ev) => Some((ev.x, ev.y)),
            EventData::Touch(ev) => Some((ev.x, ev.y)),
            EventData::TouchpadSwipe(ev) => Some((ev.x, ev.y)),
            EventData::TouchpadPinch(ev) => Some((ev.x, ev.y)),
            _ => None,
        }
    }

    pub fn set_coords(&mut self, x: f64, y: f64) {
        let (ex, ey) = match &mut self.data {
            EventData::Motion(ev) => (&mut ev.x, &mut ev.y),
            EventData::Button(ev) => (&mut ev.x, &mut ev.y),
            EventData::Crossing(ev) => (&mut ev.x, &mut ev.y),
            EventData::Scroll(ev) => (&mut ev.x, &mut ev.y),
            EventData::Touch(ev) => (&mut ev.x, &mut ev.y),
            EventData::TouchpadSwipe(ev) => (&mut ev.x, &mut ev.y),
            EventData::TouchpadPinch(ev) => (&mut ev.x, &mut ev.y),
            _ => return,
        };
        *ex = x;
        *ey = y;
    }

    pub fn root_coords(&self) -> Option<(f64, f64)> {
        match &self.data {
            EventData::Motion(ev) => Some((ev.x_root, ev.y_root)),
            EventData::Button(ev) => Some((ev.x_root, ev.y_root)),
            EventData::Crossing(ev) => Some((ev.x_root, ev.y_root)),
            EventData::Scroll(ev) => Some((ev.x_root, ev.y_root)),
            EventData::Touch(ev) => Some((ev.x_root, ev.y_root)),
            EventData::TouchpadSwipe(ev) => Some((ev.x_root, ev.y_root)),
            EventData::TouchpadPinch(ev) => Some((ev.x_root, ev.y_root)),
            _ => None,
        }
    }

    pub fn state(&self) -> Option<ModifierType> {
        match &self.data {
            EventData::Motion(ev) => Some(ev.state),
            EventData::Button(ev) => Some(ev.state),
            EventData::Key(ev) => Some(ev.state),
            EventData::Crossing(ev) => Some(ev.state),
            EventData::Scroll(ev) => Some(ev.state),
            EventData::Touch(ev) => Some(ev.state),
            EventData::TouchpadSwipe(ev) => Some(ev.state),
            EventData::TouchpadPinch(ev) => Some(ev.state),
            _ => None,
        }
    }

    pub fn button(&self) -> Option<u32> {
        match &self.data {
            EventData::Button(ev) => Some(ev.button),
            _ => None,
        }
    }

    pub fn sequence(&self) -> Option<EventSequence> {
        match &self.data {
            EventData::Touch(ev) => Some(ev.sequence),
            _ => None,
        }
    }

    pub fn axes(&self) -> Option<&[f64]> {
        match &self.data {
            EventData::Motion(ev) => ev.axes.as_deref(),
            EventData::Button(ev) => ev.axes.as_deref(),
            EventData::Touch(ev) => ev.axes.as_deref(),
            _ => None,
        }
    }

    /// Looks up the value of the axis with `axis_use` in this event's axes.
    ///
    /// X and Y fall back to the event coordinates.
    pub fn get_axis(&self, device: &Device, axis_use: AxisUse) -> Option<f64> {
        if let Some(axes) = self.axes() {
            if let Some(value) = device.get_axis(axes, axis_use) {
                return Some(value);
            }
        }

        let (x, y) = self.coords()?;
        match axis_use {
            AxisUse::X => Some(x),
            AxisUse::Y => Some(y),
            _ => None,
        }
    }

    pub fn crossing(&self) -> Option<&CrossingEvent> {
        match &self.data {
            EventData::Crossing(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn scroll(&self) -> Option<&ScrollEvent> {
        match &self.data {
            EventData::Scroll(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn touch(&self) -> Option<&TouchEvent> {
        match &self.data {
            EventData::Touch(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&KeyEvent> {
        match &self.data {
            EventData::Key(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn grab_broken(&self) -> Option<&GrabBrokenEvent> {
        match &self.data {
            EventData::GrabBroken(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn focus(&self) -> Option<&FocusEvent> {
        match &self.data {
            EventData::Focus(ev) => Some(ev),
            _ => None,
        }
    }

    /// Whether this event was produced by a finger emulating the pointer.
    pub fn emulating_pointer(&self) -> bool {
        match &self.data {
            EventData::Touch(ev) => ev.emulating_pointer,
            _ => false,
        }
    }

    /// Whether this event ends the implicit grab started by a press.
    pub fn is_last_button_release(&self) -> bool {
        let EventData::Button(ev) = &self.data else {
            return false;
        };

        self.kind == EventType::ButtonRelease
            && (ev.state & ModifierType::BUTTONS & !ModifierType::for_button(ev.button))
                .is_empty()
    }
}
