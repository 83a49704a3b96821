//! Enumerations and masks shared by every event.
//!
//! Discriminants and bit positions are fixed: widget code stores and compares
//! them numerically.

use bitflags::bitflags;

/// Kind of an [`Event`](super::Event).
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Nothing = -1,
    Delete = 0,
    Destroy = 1,
    Expose = 2,
    MotionNotify = 3,
    ButtonPress = 4,
    DoubleButtonPress = 5,
    TripleButtonPress = 6,
    ButtonRelease = 7,
    KeyPress = 8,
    KeyRelease = 9,
    EnterNotify = 10,
    LeaveNotify = 11,
    FocusChange = 12,
    Configure = 13,
    Map = 14,
    Unmap = 15,
    PropertyNotify = 16,
    SelectionClear = 17,
    SelectionRequest = 18,
    SelectionNotify = 19,
    ProximityIn = 20,
    ProximityOut = 21,
    DragEnter = 22,
    DragLeave = 23,
    DragMotion = 24,
    DragStatus = 25,
    DropStart = 26,
    DropFinished = 27,
    ClientEvent = 28,
    VisibilityNotify = 29,
    Scroll = 31,
    WindowState = 32,
    Setting = 33,
    OwnerChange = 34,
    GrabBroken = 35,
    Damage = 36,
    TouchBegin = 37,
    TouchUpdate = 38,
    TouchEnd = 39,
    TouchCancel = 40,
    TouchpadSwipe = 41,
    TouchpadPinch = 42,
    PadButtonPress = 43,
    PadButtonRelease = 44,
    PadRing = 45,
    PadStrip = 46,
    PadGroupMode = 47,
}

impl EventType {
    pub fn is_button_press(self) -> bool {
        matches!(
            self,
            Self::ButtonPress | Self::DoubleButtonPress | Self::TripleButtonPress
        )
    }

    pub fn is_touch(self) -> bool {
        matches!(
            self,
            Self::TouchBegin | Self::TouchUpdate | Self::TouchEnd | Self::TouchCancel
        )
    }

    pub fn is_crossing(self) -> bool {
        matches!(self, Self::EnterNotify | Self::LeaveNotify)
    }

    /// Whether events of this kind travel through a pointing device.
    pub fn is_pointing(self) -> bool {
        matches!(
            self,
            Self::MotionNotify
                | Self::ButtonPress
                | Self::DoubleButtonPress
                | Self::TripleButtonPress
                | Self::ButtonRelease
                | Self::Scroll
                | Self::EnterNotify
                | Self::LeaveNotify
                | Self::ProximityIn
                | Self::ProximityOut
                | Self::TouchpadSwipe
                | Self::TouchpadPinch
        ) || self.is_touch()
    }

    /// The event mask bit a window has to select to receive this kind.
    pub fn mask(self) -> EventMask {
        match self {
            Self::Expose => EventMask::EXPOSURE,
            Self::MotionNotify => EventMask::POINTER_MOTION,
            Self::ButtonPress | Self::DoubleButtonPress | Self::TripleButtonPress => {
                EventMask::BUTTON_PRESS
            }
            Self::ButtonRelease => EventMask::BUTTON_RELEASE,
            Self::KeyPress => EventMask::KEY_PRESS,
            Self::KeyRelease => EventMask::KEY_RELEASE,
            Self::EnterNotify => EventMask::ENTER_NOTIFY,
            Self::LeaveNotify => EventMask::LEAVE_NOTIFY,
            Self::FocusChange => EventMask::FOCUS_CHANGE,
            Self::Configure | Self::Map | Self::Unmap | Self::WindowState => EventMask::STRUCTURE,
            Self::PropertyNotify => EventMask::PROPERTY_CHANGE,
            Self::VisibilityNotify => EventMask::VISIBILITY_NOTIFY,
            Self::ProximityIn => EventMask::PROXIMITY_IN,
            Self::ProximityOut => EventMask::PROXIMITY_OUT,
            Self::Scroll => EventMask::SCROLL | EventMask::SMOOTH_SCROLL,
            Self::TouchBegin | Self::TouchUpdate | Self::TouchEnd | Self::TouchCancel => {
                EventMask::TOUCH
            }
            Self::TouchpadSwipe | Self::TouchpadPinch => EventMask::TOUCHPAD_GESTURE,
            Self::PadButtonPress
            | Self::PadButtonRelease
            | Self::PadRing
            | Self::PadStrip
            | Self::PadGroupMode => EventMask::TABLET_PAD,
            _ => EventMask::empty(),
        }
    }
}

bitflags! {
    /// Keyboard modifiers and pointer buttons held at the time of an event.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModifierType: u32 {
        const SHIFT = 1 << 0;
        const LOCK = 1 << 1;
        const CONTROL = 1 << 2;
        const MOD1 = 1 << 3;
        const MOD2 = 1 << 4;
        const MOD3 = 1 << 5;
        const MOD4 = 1 << 6;
        const MOD5 = 1 << 7;
        const BUTTON1 = 1 << 8;
        const BUTTON2 = 1 << 9;
        const BUTTON3 = 1 << 10;
        const BUTTON4 = 1 << 11;
        const BUTTON5 = 1 << 12;
        const SUPER = 1 << 26;
        const HYPER = 1 << 27;
        const META = 1 << 28;
        const RELEASE = 1 << 30;

        // Group bits and anything else the server reports pass through.
        const _ = !0;
    }
}

impl ModifierType {
    pub const BUTTONS: Self = Self::BUTTON1
        .union(Self::BUTTON2)
        .union(Self::BUTTON3)
        .union(Self::BUTTON4)
        .union(Self::BUTTON5);

    /// Mask bit for a held pointer button; buttons past 5 have none.
    pub fn for_button(button: u32) -> Self {
        match button {
            1..=5 => Self::from_bits_retain(1 << (8 + button - 1)),
            _ => Self::empty(),
        }
    }
}

bitflags! {
    /// Event kinds selected by a window or a grab.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        const EXPOSURE = 1 << 1;
        const POINTER_MOTION = 1 << 2;
        const POINTER_MOTION_HINT = 1 << 3;
        const BUTTON_MOTION = 1 << 4;
        const BUTTON1_MOTION = 1 << 5;
        const BUTTON2_MOTION = 1 << 6;
        const BUTTON3_MOTION = 1 << 7;
        const BUTTON_PRESS = 1 << 8;
        const BUTTON_RELEASE = 1 << 9;
        const KEY_PRESS = 1 << 10;
        const KEY_RELEASE = 1 << 11;
        const ENTER_NOTIFY = 1 << 12;
        const LEAVE_NOTIFY = 1 << 13;
        const FOCUS_CHANGE = 1 << 14;
        const STRUCTURE = 1 << 15;
        const PROPERTY_CHANGE = 1 << 16;
        const VISIBILITY_NOTIFY = 1 << 17;
        const PROXIMITY_IN = 1 << 18;
        const PROXIMITY_OUT = 1 << 19;
        const SUBSTRUCTURE = 1 << 20;
        const SCROLL = 1 << 21;
        const TOUCH = 1 << 22;
        const SMOOTH_SCROLL = 1 << 23;
        const TOUCHPAD_GESTURE = 1 << 24;
        const TABLET_PAD = 1 << 25;
    }
}

impl EventMask {
    pub const ALL_EVENTS: Self = Self::all();

    /// Whether a motion event with `state` held is selected by this mask.
    pub fn selects_motion(self, state: ModifierType) -> bool {
        if self.contains(Self::POINTER_MOTION) {
            return true;
        }

        let buttons = state & ModifierType::BUTTONS;
        if buttons.is_empty() {
            return false;
        }

        self.contains(Self::BUTTON_MOTION)
            || (self.contains(Self::BUTTON1_MOTION) && buttons.contains(ModifierType::BUTTON1))
            || (self.contains(Self::BUTTON2_MOTION) && buttons.contains(ModifierType::BUTTON2))
            || (self.contains(Self::BUTTON3_MOTION) && buttons.contains(ModifierType::BUTTON3))
    }
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrollDirection {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
    Smooth = 4,
}

/// Why a crossing event was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrossingMode {
    Normal,
    Grab,
    Ungrab,
    ToolkitGrab,
    ToolkitUngrab,
    StateChanged,
    TouchBegin,
    TouchEnd,
    DeviceSwitch,
}

/// Relation between the crossed window and the other end of the crossing,
/// after X's LeaveNotify taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyType {
    Ancestor = 0,
    Virtual = 1,
    Inferior = 2,
    Nonlinear = 3,
    NonlinearVirtual = 4,
    Unknown = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchpadGesturePhase {
    Begin,
    Update,
    End,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerChange {
    NewOwner,
    Destroy,
    Close,
}

/// Opaque handle of one touch sequence.
///
/// Backends pick the value; consumers only compare it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventSequence(pub u64);

/// Which kind of pad control produced a pad axis event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadAxisSource {
    Unknown,
    Finger,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_values() {
        assert_eq!(EventType::Nothing as i32, -1);
        assert_eq!(EventType::DoubleButtonPress as i32, 5);
        assert_eq!(EventType::VisibilityNotify as i32, 29);
        assert_eq!(EventType::Scroll as i32, 31);
        assert_eq!(EventType::GrabBroken as i32, 35);
        assert_eq!(EventType::TouchCancel as i32, 40);
        assert_eq!(EventType::PadGroupMode as i32, 47);
    }

    #[test]
    fn scroll_direction_values() {
        assert_eq!(ScrollDirection::Up as u32, 0);
        assert_eq!(ScrollDirection::Smooth as u32, 4);
    }

    #[test]
    fn button_modifiers() {
        assert_eq!(ModifierType::for_button(1), ModifierType::BUTTON1);
        assert_eq!(ModifierType::for_button(5), ModifierType::BUTTON5);
        assert_eq!(ModifierType::for_button(8), ModifierType::empty());
        assert_eq!(ModifierType::BUTTON3.bits(), 1 << 10);
    }

    #[test]
    fn button_motion_selection() {
        let mask = EventMask::BUTTON1_MOTION;
        assert!(mask.selects_motion(ModifierType::BUTTON1));
        assert!(!mask.selects_motion(ModifierType::BUTTON2));
        assert!(!mask.selects_motion(ModifierType::empty()));
        assert!(EventMask::POINTER_MOTION.selects_motion(ModifierType::empty()));
    }
}
