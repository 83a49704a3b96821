//! XInput2 traffic as the backend consumes it.
//!
//! The wire protocol belongs to the connection library. These are the decoded
//! requests and events the backend exchanges with an [`XServer`].

use bitflags::bitflags;

use crate::cursor::Cursor;
use crate::window::WindowId;

/// `XIAllDevices`.
pub const ALL_DEVICES: u16 = 0;
/// `XIAllMasterDevices`.
pub const ALL_MASTER_DEVICES: u16 = 1;

/// Set when the server emulates pointer events from another input.
pub const POINTER_EMULATED: u32 = 1 << 16;
/// Set on touch events of the touch that drives the pointer.
pub const TOUCH_EMULATING_POINTER: u32 = 1 << 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(pub u32);

impl Atom {
    pub const NONE: Atom = Atom(0);
}

/// Whether bit `bit` of an XI mask is set.
pub fn mask_is_set(mask: &[u8], bit: usize) -> bool {
    mask.get(bit >> 3).is_some_and(|byte| byte & (1 << (bit & 7)) != 0)
}

/// Builds an XI mask with the given bits set.
pub fn mask_from_bits(bits: impl IntoIterator<Item = usize>) -> Vec<u8> {
    let mut mask = Vec::new();
    for bit in bits {
        let byte = bit >> 3;
        if mask.len() <= byte {
            mask.resize(byte + 1, 0);
        }
        mask[byte] |= 1 << (bit & 7);
    }
    mask
}

// =============================================================================
// Devices
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceUse {
    MasterPointer,
    MasterKeyboard,
    SlavePointer,
    SlaveKeyboard,
    FloatingSlave,
}

impl DeviceUse {
    pub fn is_master(self) -> bool {
        matches!(self, Self::MasterPointer | Self::MasterKeyboard)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuatorMode {
    Relative,
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollType {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchMode {
    /// Touchscreen: touches land where they are.
    Direct,
    /// Touchpad: touches follow the pointer.
    Dependent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceClass {
    Key {
        keycodes: Vec<u32>,
    },
    Button {
        labels: Vec<Atom>,
    },
    Valuator {
        number: u16,
        label: Atom,
        min: f64,
        max: f64,
        value: f64,
        resolution: i32,
        mode: ValuatorMode,
    },
    Scroll {
        number: u16,
        scroll_type: ScrollType,
        increment: f64,
    },
    Touch {
        mode: TouchMode,
        num_touches: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct XiDeviceInfo {
    pub deviceid: u16,
    pub name: String,
    pub device_use: DeviceUse,
    /// Paired master for masters, master for attached slaves.
    pub attachment: u16,
    pub enabled: bool,
    pub classes: Vec<DeviceClass>,
}

/// A device property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProperty {
    pub property_type: Atom,
    /// 8, 16 or 32.
    pub format: u8,
    pub items: Vec<u32>,
}

// =============================================================================
// Replies
// =============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ModifierState {
    pub base: u32,
    pub latched: u32,
    pub locked: u32,
    pub effective: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GroupState {
    pub base: u8,
    pub latched: u8,
    pub locked: u8,
    pub effective: u8,
}

/// `XIQueryPointer` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerReply {
    pub root: WindowId,
    pub child: Option<WindowId>,
    pub root_x: f64,
    pub root_y: f64,
    pub win_x: f64,
    pub win_y: f64,
    pub buttons: Vec<u8>,
    pub mods: ModifierState,
    pub group: GroupState,
}

/// Grab reply codes.
pub mod grab_reply {
    pub const SUCCESS: u8 = 0;
    pub const ALREADY_GRABBED: u8 = 1;
    pub const INVALID_TIME: u8 = 2;
    pub const NOT_VIEWABLE: u8 = 3;
    pub const FROZEN: u8 = 4;
}

/// A protocol error delivered for request `serial`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolError {
    pub serial: u64,
    pub error_code: u8,
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum XiEventType {
    DeviceChanged = 1,
    KeyPress = 2,
    KeyRelease = 3,
    ButtonPress = 4,
    ButtonRelease = 5,
    Motion = 6,
    Enter = 7,
    Leave = 8,
    FocusIn = 9,
    FocusOut = 10,
    HierarchyChanged = 11,
    PropertyEvent = 12,
    TouchBegin = 18,
    TouchUpdate = 19,
    TouchEnd = 20,
}

bitflags! {
    /// Event selection for one device, one bit per [`XiEventType`].
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct XiEventBits: u32 {
        const DEVICE_CHANGED = 1 << XiEventType::DeviceChanged as u32;
        const KEY_PRESS = 1 << XiEventType::KeyPress as u32;
        const KEY_RELEASE = 1 << XiEventType::KeyRelease as u32;
        const BUTTON_PRESS = 1 << XiEventType::ButtonPress as u32;
        const BUTTON_RELEASE = 1 << XiEventType::ButtonRelease as u32;
        const MOTION = 1 << XiEventType::Motion as u32;
        const ENTER = 1 << XiEventType::Enter as u32;
        const LEAVE = 1 << XiEventType::Leave as u32;
        const FOCUS_IN = 1 << XiEventType::FocusIn as u32;
        const FOCUS_OUT = 1 << XiEventType::FocusOut as u32;
        const HIERARCHY_CHANGED = 1 << XiEventType::HierarchyChanged as u32;
        const PROPERTY_EVENT = 1 << XiEventType::PropertyEvent as u32;
        const TOUCH_BEGIN = 1 << XiEventType::TouchBegin as u32;
        const TOUCH_UPDATE = 1 << XiEventType::TouchUpdate as u32;
        const TOUCH_END = 1 << XiEventType::TouchEnd as u32;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XiEventMask {
    pub deviceid: u16,
    pub mask: XiEventBits,
}

/// Valuators present in an event: `values` holds one entry per set bit of
/// `mask`, in bit order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValuatorState {
    pub mask: Vec<u8>,
    pub values: Vec<f64>,
}

impl ValuatorState {
    /// Valuator numbers paired with their values.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        (0..self.mask.len() * 8)
            .filter(|bit| mask_is_set(&self.mask, *bit))
            .zip(self.values.iter().copied())
    }
}

/// Key, button, motion and touch events.
#[derive(Debug, Clone, PartialEq)]
pub struct XiDeviceEvent {
    pub evtype: XiEventType,
    pub serial: u64,
    pub send_event: bool,
    pub time: u32,
    pub deviceid: u16,
    pub sourceid: u16,
    /// Keycode, button number or touch id.
    pub detail: u32,
    pub root: WindowId,
    pub event: WindowId,
    pub child: Option<WindowId>,
    pub root_x: f64,
    pub root_y: f64,
    pub event_x: f64,
    pub event_y: f64,
    pub flags: u32,
    pub buttons: Vec<u8>,
    pub valuators: ValuatorState,
    pub mods: ModifierState,
    pub group: GroupState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XiNotifyMode {
    Normal,
    Grab,
    Ungrab,
    WhileGrabbed,
    PassiveGrab,
    PassiveUngrab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XiNotifyDetail {
    Ancestor,
    Virtual,
    Inferior,
    Nonlinear,
    NonlinearVirtual,
    Pointer,
    PointerRoot,
    DetailNone,
}

/// Enter, leave and focus events.
#[derive(Debug, Clone, PartialEq)]
pub struct XiEnterEvent {
    pub evtype: XiEventType,
    pub serial: u64,
    pub send_event: bool,
    pub time: u32,
    pub deviceid: u16,
    pub sourceid: u16,
    pub detail: XiNotifyDetail,
    pub root: WindowId,
    pub event: WindowId,
    pub child: Option<WindowId>,
    pub root_x: f64,
    pub root_y: f64,
    pub event_x: f64,
    pub event_y: f64,
    pub mode: XiNotifyMode,
    pub focus: bool,
    pub buttons: Vec<u8>,
    pub mods: ModifierState,
    pub group: GroupState,
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HierarchyFlags: u32 {
        const MASTER_ADDED = 1 << 0;
        const MASTER_REMOVED = 1 << 1;
        const SLAVE_ADDED = 1 << 2;
        const SLAVE_REMOVED = 1 << 3;
        const SLAVE_ATTACHED = 1 << 4;
        const SLAVE_DETACHED = 1 << 5;
        const DEVICE_ENABLED = 1 << 6;
        const DEVICE_DISABLED = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierarchyInfo {
    pub deviceid: u16,
    pub attachment: u16,
    pub device_use: DeviceUse,
    pub enabled: bool,
    pub flags: HierarchyFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct XiHierarchyEvent {
    pub serial: u64,
    pub time: u32,
    pub flags: HierarchyFlags,
    pub info: Vec<HierarchyInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct XiDeviceChangedEvent {
    pub serial: u64,
    pub time: u32,
    pub deviceid: u16,
    pub sourceid: u16,
    pub classes: Vec<DeviceClass>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyChange {
    Deleted,
    Created,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XiPropertyEvent {
    pub serial: u64,
    pub time: u32,
    pub deviceid: u16,
    pub property: Atom,
    pub what: PropertyChange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XiEvent {
    Device(XiDeviceEvent),
    Enter(XiEnterEvent),
    Hierarchy(XiHierarchyEvent),
    DeviceChanged(XiDeviceChangedEvent),
    Property(XiPropertyEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreEventType {
    KeyPress,
    KeyRelease,
    ButtonPress,
    ButtonRelease,
    MotionNotify,
    EnterNotify,
    LeaveNotify,
    FocusIn,
    FocusOut,
}

/// A core protocol input event. Fields not carried by a given type are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreEvent {
    pub event_type: CoreEventType,
    pub serial: u64,
    pub send_event: bool,
    pub time: u32,
    pub window: WindowId,
    pub subwindow: Option<WindowId>,
    pub x: f64,
    pub y: f64,
    pub x_root: f64,
    pub y_root: f64,
    /// Core state: modifiers, buttons and the group in bits 13-14.
    pub state: u32,
    /// Keycode or button.
    pub detail: u32,
    pub is_hint: bool,
    pub mode: XiNotifyMode,
    pub notify_detail: XiNotifyDetail,
    pub focus: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionNotifySubtype {
    SetOwner,
    WindowDestroy,
    ClientClose,
}

/// XFixes selection owner notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionNotify {
    pub serial: u64,
    pub window: WindowId,
    pub subtype: SelectionNotifySubtype,
    pub owner: Option<WindowId>,
    pub selection: Atom,
    pub timestamp: u32,
    pub selection_timestamp: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XEvent {
    Xi(XiEvent),
    Core(CoreEvent),
    SelectionNotify(SelectionNotify),
    Error(ProtocolError),
}

// =============================================================================
// Connection
// =============================================================================

/// The X connection as seen by the backend.
pub trait XServer {
    fn intern_atom(&self, name: &str) -> Atom;

    fn atom_name(&self, atom: Atom) -> Option<String>;

    /// Negotiated XInput2 minor version.
    fn xi_minor_version(&self) -> u32;

    /// `XIQueryDevice`; [`ALL_DEVICES`] lists every device.
    fn query_device(&self, deviceid: u16) -> Vec<XiDeviceInfo>;

    fn get_device_property(&mut self, deviceid: u16, property: Atom) -> Option<DeviceProperty>;

    fn client_pointer(&self) -> u16;

    fn query_pointer(&self, deviceid: u16, window: WindowId) -> Option<PointerReply>;

    fn select_events(&mut self, window: WindowId, masks: &[XiEventMask]);

    /// `XIGrabDevice`; returns one of the [`grab_reply`] codes.
    #[allow(clippy::too_many_arguments)]
    fn grab_device(
        &mut self,
        deviceid: u16,
        window: WindowId,
        time: u32,
        cursor: Option<&Cursor>,
        owner_events: bool,
        mask: XiEventMask,
    ) -> u8;

    fn ungrab_device(&mut self, deviceid: u16, time: u32);

    fn warp_pointer(&mut self, deviceid: u16, root: WindowId, x: i32, y: i32);

    fn define_cursor(&mut self, deviceid: u16, window: WindowId, cursor: Option<&Cursor>);

    /// Updates `_NET_WM_USER_TIME` on a toplevel.
    fn set_user_time(&mut self, window: WindowId, time: u32);

    /// Serial the next request will carry.
    fn next_request(&self) -> u64;

    fn last_processed(&self) -> u64;

    /// Round-trips and returns the errors received meanwhile.
    fn sync(&mut self) -> Vec<ProtocolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks() {
        let mask = mask_from_bits([0, 3, 9]);
        assert_eq!(mask, [0b1001, 0b10]);
        assert!(mask_is_set(&mask, 9));
        assert!(!mask_is_set(&mask, 8));
        assert!(!mask_is_set(&mask, 40));
    }

    #[test]
    fn valuator_values_follow_mask_bits() {
        let state = ValuatorState {
            mask: mask_from_bits([1, 4]),
            values: vec![10., 20.],
        };
        assert_eq!(state.iter().collect::<Vec<_>>(), [(1, 10.), (4, 20.)]);
    }
}
