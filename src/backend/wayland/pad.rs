//! Tablet pads: buttons, rings and strips grouped by mode.

use tracing::{debug, trace, warn};

use crate::device::{DeviceId, InputSource};
use crate::display::Display;
use crate::event::{
    Event, EventData, EventType, PadAxisEvent, PadButtonEvent, PadGroupModeEvent,
};

use super::protocol::{
    ButtonState, GlobalName, PadEvent, PadGroupEvent, PadId, PadRingEvent, PadStripEvent,
};
use super::seat::{add_slave, new_slave, PadAxisData, PadData, PadGroupData, WaylandSeat};
use super::{find_seat_mut, WaylandBackend};

/// Strips report this position when the finger lifts.
const STRIP_LIFTED: u32 = u32::MAX;

fn pad_event(seat: &WaylandSeat, pad: &PadData, kind: EventType, data: EventData) -> Option<Event> {
    let window = seat.keyboard_focus?;
    let device = pad.device?;
    Some(
        Event::new(kind, Some(window), data)
            .with_devices(device, Some(device))
            .with_seat(Some(seat.id)),
    )
}

/// Index of `index` among all rings (or strips) of the pad, counting the
/// ones of earlier groups first.
fn feature_index(
    groups: &[PadGroupData],
    group: u32,
    index: u32,
    count: impl Fn(&PadGroupData) -> usize,
) -> u32 {
    let before: usize = groups.iter().take(group as usize).map(count).sum();
    before as u32 + index
}

fn axis_mut(
    seat: &mut WaylandSeat,
    pad: PadId,
    group: u32,
    index: u32,
    strip: bool,
) -> Option<&mut PadAxisData> {
    let group = seat.pad_mut(pad)?.groups.get_mut(group as usize)?;
    let axes = if strip {
        &mut group.strips
    } else {
        &mut group.rings
    };
    axes.get_mut(index as usize)
}

impl WaylandBackend {
    /// Serial of the last mode switch of `group` on the pad `device`, to
    /// pass along when setting feedback strings for that mode.
    pub fn pad_mode_switch_serial(&self, device: DeviceId, group: u32) -> Option<u32> {
        self.seats
            .iter()
            .flat_map(|seat| &seat.pads)
            .find(|pad| pad.device == Some(device))
            .and_then(|pad| pad.groups.get(group as usize))
            .map(|group| group.mode_switch_serial)
    }

    pub(super) fn handle_pad_added(&mut self, name: GlobalName, pad: PadId) {
        if let Some(seat) = find_seat_mut(&mut self.seats, name) {
            seat.pads.push(PadData {
                id: pad,
                device: None,
                path: String::new(),
                n_buttons: 0,
                groups: Vec::new(),
                current_tablet: None,
            });
        }
    }

    pub(super) fn handle_pad_event(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        pad: PadId,
        event: PadEvent,
    ) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };

        match event {
            PadEvent::Group { group } => {
                let Some(data) = seat.pad_mut(pad) else {
                    return;
                };
                if group as usize != data.groups.len() {
                    warn!("pad group {group} announced out of order");
                }
                data.groups.push(PadGroupData::default());
            }
            PadEvent::Path(path) => {
                if let Some(data) = seat.pad_mut(pad) {
                    data.path = path;
                }
            }
            PadEvent::Buttons(n_buttons) => {
                if let Some(data) = seat.pad_mut(pad) {
                    data.n_buttons = n_buttons;
                }
            }
            PadEvent::Done => {
                let master = seat.master_keyboard;
                let Some(data) = seat.pad_mut(pad) else {
                    return;
                };
                if data.device.is_some() {
                    return;
                }
                let device = new_slave(display, "Pad device", InputSource::TabletPad, false);
                data.device = Some(add_slave(display, master, device));
                debug!(
                    "pad {:?} ready: {} buttons in {} groups",
                    data.path,
                    data.n_buttons,
                    data.groups.len()
                );
            }
            PadEvent::Button {
                time,
                button,
                state,
            } => {
                let Some(data) = seat.pad(pad) else {
                    return;
                };
                let (group, mode) = data
                    .button_group(button)
                    .map_or((0, 0), |(index, group)| (index, group.current_mode));
                let kind = match state {
                    ButtonState::Pressed => EventType::PadButtonPress,
                    ButtonState::Released => EventType::PadButtonRelease,
                };
                let event = EventData::PadButton(PadButtonEvent {
                    time,
                    group,
                    button,
                    mode,
                });
                if let Some(event) = pad_event(seat, data, kind, event) {
                    self.deliver(display, event);
                }
            }
            PadEvent::Enter { tablet, surface, .. } => {
                trace!("pad {pad:?} entered {surface:?}");
                if let Some(data) = seat.pad_mut(pad) {
                    data.current_tablet = Some(tablet);
                }
                if let Some(tablet) = seat.tablet_mut(tablet) {
                    if !tablet.pads.contains(&pad) {
                        tablet.pads.push(pad);
                    }
                }
            }
            PadEvent::Leave { .. } => {
                let Some(data) = seat.pad_mut(pad) else {
                    return;
                };
                if let Some(tablet) = data.current_tablet.take() {
                    if let Some(tablet) = seat.tablet_mut(tablet) {
                        tablet.pads.retain(|&id| id != pad);
                    }
                }
            }
            PadEvent::Removed => self.remove_pad(display, name, pad),
        }
    }

    pub(super) fn remove_pad(&mut self, display: &mut Display, name: GlobalName, pad: PadId) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(index) = seat.pads.iter().position(|data| data.id == pad) else {
            return;
        };
        let data = seat.pads.remove(index);
        for tablet in &mut seat.tablets {
            tablet.pads.retain(|&id| id != pad);
        }

        if let Some(device) = data.device {
            display.devices_mut().remove_device(device);
        }
        debug!("pad {:?} removed", data.path);
    }

    pub(super) fn handle_pad_group_event(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        pad: PadId,
        group: u32,
        event: PadGroupEvent,
    ) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(data) = seat
            .pad_mut(pad)
            .and_then(|data| data.groups.get_mut(group as usize))
        else {
            return;
        };

        match event {
            PadGroupEvent::Buttons(buttons) => data.buttons = buttons,
            PadGroupEvent::Ring => data.rings.push(PadAxisData::default()),
            PadGroupEvent::Strip => data.strips.push(PadAxisData::default()),
            PadGroupEvent::Modes(n_modes) => data.n_modes = n_modes,
            PadGroupEvent::Done => (),
            PadGroupEvent::ModeSwitch { time, serial, mode } => {
                if data.n_modes != 0 && mode >= data.n_modes {
                    warn!("pad group {group} switched to mode {mode} of {}", data.n_modes);
                }
                data.current_mode = mode;
                data.mode_switch_serial = serial;
                trace!("pad group {group} now in mode {mode}");

                let event = EventData::PadGroupMode(PadGroupModeEvent { time, group, mode });
                let Some(pad) = seat.pad(pad) else {
                    return;
                };
                if let Some(event) = pad_event(seat, pad, EventType::PadGroupMode, event) {
                    self.deliver(display, event);
                }
            }
        }
    }

    pub(super) fn handle_pad_ring_event(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        pad: PadId,
        group: u32,
        ring: u32,
        event: PadRingEvent,
    ) {
        let value = match event {
            // Only fingers drive rings.
            PadRingEvent::Source(_) => return,
            PadRingEvent::Angle(angle) => Some(angle),
            PadRingEvent::Stop => None,
            PadRingEvent::Frame { time } => {
                self.pad_axis_frame(display, name, pad, group, ring, false, time);
                return;
            }
        };
        self.set_pad_axis(name, pad, group, ring, false, value);
    }

    pub(super) fn handle_pad_strip_event(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        pad: PadId,
        group: u32,
        strip: u32,
        event: PadStripEvent,
    ) {
        let value = match event {
            PadStripEvent::Source(_) => return,
            PadStripEvent::Position(STRIP_LIFTED) => Some(-1.),
            PadStripEvent::Position(position) => Some(f64::from(position) / 65535.),
            PadStripEvent::Stop => None,
            PadStripEvent::Frame { time } => {
                self.pad_axis_frame(display, name, pad, group, strip, true, time);
                return;
            }
        };
        self.set_pad_axis(name, pad, group, strip, true, value);
    }

    /// Records a new value, or the end of the interaction when `value` is
    /// `None`.
    fn set_pad_axis(
        &mut self,
        name: GlobalName,
        pad: PadId,
        group: u32,
        index: u32,
        strip: bool,
        value: Option<f64>,
    ) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(axis) = axis_mut(seat, pad, group, index, strip) else {
            return;
        };
        match value {
            Some(value) => axis.value = value,
            None => axis.is_stop = true,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn pad_axis_frame(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        pad: PadId,
        group: u32,
        index: u32,
        strip: bool,
        time: u32,
    ) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(axis) = axis_mut(seat, pad, group, index, strip) else {
            return;
        };
        let value = axis.value;
        axis.is_stop = false;

        let Some(data) = seat.pad(pad) else {
            return;
        };
        let mode = data.groups[group as usize].current_mode;
        let (kind, index) = if strip {
            let index = feature_index(&data.groups, group, index, |group| group.strips.len());
            (EventType::PadStrip, index)
        } else {
            let index = feature_index(&data.groups, group, index, |group| group.rings.len());
            (EventType::PadRing, index)
        };
        let event = EventData::PadAxis(PadAxisEvent {
            time,
            group,
            index,
            mode,
            value,
        });

        if let Some(event) = pad_event(seat, data, kind, event) {
            trace!("pad {kind:?} {index} at {value}");
            self.deliver(display, event);
        }
    }
}
