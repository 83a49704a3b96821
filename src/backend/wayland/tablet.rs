//! `zwp_tablet_v2` and `zwp_tablet_tool_v2`.
//!
//! Each tablet gets its own master pointer with a stylus and an eraser
//! slave. Tools are announced separately and bound to a tablet while in
//! proximity; the axes of the slave in use are rebuilt from the tool's
//! capabilities on every proximity in and copied to the master.

use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::backend::TimerKind;
use crate::device::{AxisFlags, AxisUse, DeviceTool, DeviceToolType, InputSource};
use crate::display::Display;
use crate::event::{
    ButtonEvent, CrossingEvent, CrossingMode, Event, EventData, EventType, ModifierType,
    MotionEvent, NotifyType, ProximityEvent, ScrollDirection, ScrollEvent, BUTTON_MIDDLE,
    BUTTON_PRIMARY, BUTTON_SECONDARY,
};
use crate::seat::SeatCapabilities;
use crate::signals::Signal;
use crate::window::WindowId;

use super::protocol::{
    buttons, ButtonState, GlobalName, TabletEvent, TabletId, ToolCapability, ToolEvent, ToolId,
    ToolType,
};
use super::seat::{add_master, add_slave, new_slave, PointerData, TabletData, ToolData, WaylandSeat};
use super::{find_seat, find_seat_mut, WaylandBackend};

fn device_tool_type(tool_type: Option<ToolType>) -> DeviceToolType {
    match tool_type {
        Some(ToolType::Pen) => DeviceToolType::Pen,
        Some(ToolType::Eraser) => DeviceToolType::Eraser,
        Some(ToolType::Brush) => DeviceToolType::Brush,
        Some(ToolType::Pencil) => DeviceToolType::Pencil,
        Some(ToolType::Airbrush) => DeviceToolType::Airbrush,
        Some(ToolType::Mouse) => DeviceToolType::Mouse,
        Some(ToolType::Lens) => DeviceToolType::Lens,
        Some(ToolType::Finger) | None => DeviceToolType::Unknown,
    }
}

fn capability_axes(capability: ToolCapability) -> AxisFlags {
    match capability {
        ToolCapability::Tilt => AxisFlags::XTILT | AxisFlags::YTILT,
        ToolCapability::Pressure => AxisFlags::PRESSURE,
        ToolCapability::Distance => AxisFlags::DISTANCE,
        ToolCapability::Rotation => AxisFlags::ROTATION,
        ToolCapability::Slider => AxisFlags::SLIDER,
        ToolCapability::Wheel => AxisFlags::WHEEL,
    }
}

/// Stylus buttons as pointer buttons; 8 is "back".
fn stylus_button(code: u32) -> Option<u32> {
    match code {
        buttons::BTN_STYLUS => Some(BUTTON_SECONDARY),
        buttons::BTN_STYLUS2 => Some(BUTTON_MIDDLE),
        buttons::BTN_STYLUS3 => Some(8),
        _ => None,
    }
}

/// Axes a tool reports, in the order the slave lists them.
fn tool_axis_layout(axes: AxisFlags) -> Vec<(AxisUse, f64, f64)> {
    let mut layout = vec![(AxisUse::X, 0., 0.), (AxisUse::Y, 0., 0.)];
    if axes.intersects(AxisFlags::XTILT | AxisFlags::YTILT) {
        layout.push((AxisUse::XTilt, -90., 90.));
        layout.push((AxisUse::YTilt, -90., 90.));
    }
    if axes.contains(AxisFlags::DISTANCE) {
        layout.push((AxisUse::Distance, 0., 65535.));
    }
    if axes.contains(AxisFlags::PRESSURE) {
        layout.push((AxisUse::Pressure, 0., 65535.));
    }
    if axes.contains(AxisFlags::ROTATION) {
        layout.push((AxisUse::Rotation, 0., 360.));
    }
    if axes.contains(AxisFlags::SLIDER) {
        layout.push((AxisUse::Slider, -65535., 65535.));
    }
    layout
}

fn set_event_time(event: &mut Event, time: u32) {
    match &mut event.data {
        EventData::Motion(motion) => motion.time = time,
        EventData::Button(button) => button.time = time,
        EventData::Proximity(proximity) => proximity.time = time,
        _ => (),
    }
}

/// Tablet a tool is in proximity of, with the tool's device tool.
fn current_tablet(seat: &WaylandSeat, tool: ToolId) -> Option<(&TabletData, Option<Rc<DeviceTool>>)> {
    let data = seat.tool(tool)?;
    let tablet = seat.tablet(data.current_tablet?)?;
    Some((tablet, data.tool.clone()))
}

impl WaylandBackend {
    pub(super) fn handle_tablet_added(&mut self, name: GlobalName, tablet: TabletId) {
        if let Some(seat) = find_seat_mut(&mut self.seats, name) {
            seat.tablets.push(TabletData::new(tablet));
        }
    }

    pub(super) fn handle_tablet_event(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        tablet: TabletId,
        event: TabletEvent,
    ) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let (seat_id, master_keyboard) = (seat.id, seat.master_keyboard);
        let Some(data) = seat.tablet_mut(tablet) else {
            return;
        };

        match event {
            TabletEvent::Name(tablet_name) => data.name = tablet_name,
            TabletEvent::Id { vid, pid } => {
                data.vid = vid;
                data.pid = pid;
            }
            TabletEvent::Path(path) => data.path = path,
            TabletEvent::Done => {
                let master = add_master(
                    display,
                    seat_id,
                    master_keyboard,
                    format!("Master pointer for {}", data.name),
                    SeatCapabilities::TABLET_STYLUS,
                );
                let vid = Some(format!("{:04x}", data.vid));
                let pid = Some(format!("{:04x}", data.pid));

                let stylus = new_slave(display, &data.name, InputSource::Pen, false)
                    .with_ids(vid.clone(), pid.clone());
                let eraser = new_slave(
                    display,
                    &format!("{} (Eraser)", data.name),
                    InputSource::Eraser,
                    false,
                )
                .with_ids(vid, pid);

                data.master = Some(master);
                data.stylus = Some(add_slave(display, master, stylus));
                data.eraser = Some(add_slave(display, master, eraser));
                debug!("tablet {:?} ({}) is {master}", data.name, data.path);
            }
            TabletEvent::Removed => self.remove_tablet(display, name, tablet),
        }
    }

    pub(super) fn remove_tablet(&mut self, display: &mut Display, name: GlobalName, tablet: TabletId) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(index) = seat.tablets.iter().position(|data| data.id == tablet) else {
            return;
        };
        let data = seat.tablets.remove(index);

        for tool in &mut seat.tools {
            if tool.current_tablet == Some(tablet) {
                tool.current_tablet = None;
            }
        }
        for pad in &mut seat.pads {
            if pad.current_tablet == Some(tablet) {
                pad.current_tablet = None;
            }
        }

        if let Some(master) = data.master {
            self.scheduler
                .cancel(TimerKind::CursorAnimation(master));
        }
        let devices = display.devices_mut();
        for device in [data.stylus, data.eraser, data.master].into_iter().flatten() {
            devices.remove_device(device);
        }
        debug!("tablet {:?} removed", data.name);
    }

    pub(super) fn handle_tool_added(&mut self, name: GlobalName, tool: ToolId) {
        if let Some(seat) = find_seat_mut(&mut self.seats, name) {
            seat.tools.push(ToolData {
                id: tool,
                tool_type: None,
                hardware_serial: 0,
                hardware_id: 0,
                axes: AxisFlags::empty(),
                tool: None,
                current_tablet: None,
            });
        }
    }

    pub(super) fn handle_tool_event(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        tool: ToolId,
        event: ToolEvent,
    ) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let seat_id = seat.id;
        let Some(data) = seat.tool_mut(tool) else {
            return;
        };

        match event {
            ToolEvent::Type(tool_type) => data.tool_type = Some(tool_type),
            ToolEvent::HardwareSerial { hi, lo } => {
                data.hardware_serial = (u64::from(hi) << 32) | u64::from(lo);
            }
            ToolEvent::HardwareIdWacom { hi, lo } => {
                data.hardware_id = (u64::from(hi) << 32) | u64::from(lo);
            }
            ToolEvent::Capability(capability) => data.axes |= capability_axes(capability),
            ToolEvent::Done => {
                let device_tool = Rc::new(DeviceTool::new(
                    data.hardware_serial,
                    data.hardware_id,
                    device_tool_type(data.tool_type),
                    data.axes,
                ));
                data.tool = Some(device_tool.clone());
                display.devices_mut().seat_add_tool(seat_id, device_tool);
            }
            ToolEvent::Removed => {
                let removed = seat.tools.iter().position(|data| data.id == tool);
                if let Some(device_tool) = removed.and_then(|index| seat.tools.remove(index).tool) {
                    display.devices_mut().seat_remove_tool(seat_id, &device_tool);
                }
            }
            ToolEvent::ProximityIn {
                serial,
                tablet,
                surface,
            } => self.tool_proximity_in(display, name, tool, serial, tablet, surface),
            ToolEvent::ProximityOut => self.tool_proximity_out(display, name, tool),
            ToolEvent::Down { serial } => {
                let Some(pointer) = seat.tablet_pointer_mut(tool) else {
                    return;
                };
                pointer.press_serial = serial;
                self.tool_button(display, name, tool, BUTTON_PRIMARY, true);
            }
            ToolEvent::Up => self.tool_button(display, name, tool, BUTTON_PRIMARY, false),
            ToolEvent::Motion { x, y } => self.tool_motion(display, name, tool, x, y),
            ToolEvent::Pressure(pressure) => {
                self.set_tablet_axis(display, name, tool, AxisUse::Pressure, f64::from(pressure))
            }
            ToolEvent::Distance(distance) => {
                self.set_tablet_axis(display, name, tool, AxisUse::Distance, f64::from(distance))
            }
            ToolEvent::Tilt { x, y } => {
                self.set_tablet_axis(display, name, tool, AxisUse::XTilt, x);
                self.set_tablet_axis(display, name, tool, AxisUse::YTilt, y);
            }
            ToolEvent::Rotation(degrees) => {
                self.set_tablet_axis(display, name, tool, AxisUse::Rotation, degrees)
            }
            ToolEvent::Slider(position) => {
                self.set_tablet_axis(display, name, tool, AxisUse::Slider, f64::from(position))
            }
            ToolEvent::Wheel { degrees, clicks } => {
                trace!("tool wheel {degrees} degrees, {clicks} clicks");
                if clicks != 0 {
                    self.tool_wheel(display, name, tool, clicks);
                }
            }
            ToolEvent::Button {
                serial,
                button,
                state,
            } => {
                let Some(pointer) = seat.tablet_pointer_mut(tool) else {
                    return;
                };
                if pointer.focus.is_none() {
                    return;
                }
                pointer.press_serial = serial;
                if let Some(button) = stylus_button(button) {
                    self.tool_button(display, name, tool, button, state == ButtonState::Pressed);
                }
            }
            ToolEvent::Frame { time } => self.tool_frame(display, name, tool, time),
        }
    }

    fn tool_proximity_in(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        tool: ToolId,
        serial: u32,
        tablet: TabletId,
        surface: WindowId,
    ) {
        if !Self::is_known_window(display, surface) {
            return;
        }
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(tool_data) = seat.tool_mut(tool) else {
            return;
        };
        tool_data.current_tablet = Some(tablet);
        let device_tool = tool_data.tool.clone();
        let is_eraser = tool_data.tool_type == Some(ToolType::Eraser);
        let axes = tool_data.axes;

        let Some(data) = seat.tablet_mut(tablet) else {
            return;
        };
        let (Some(master), Some(current)) = (
            data.master,
            if is_eraser { data.eraser } else { data.stylus },
        ) else {
            return;
        };
        data.current_tool = Some(tool);
        data.current_device = Some(current);
        data.pointer.enter_serial = serial;
        data.pointer.focus = Some(surface);

        let devices = display.devices_mut();
        devices.update_tool(current, device_tool.clone());
        devices.update_tool(master, device_tool.clone());

        // Rebuild the slave's axes for this tool and mirror them on the
        // master.
        data.axis_indices.clear();
        let mut cloned = Vec::new();
        if let Some(device) = devices.device_mut(current) {
            device.reset_axes();
            for (axis_use, min, max) in tool_axis_layout(axes) {
                match device.add_axis(None, axis_use, min, max, 0.) {
                    Ok(index) => {
                        if !matches!(axis_use, AxisUse::X | AxisUse::Y) {
                            data.axis_indices.insert(axis_use, index);
                        }
                    }
                    Err(err) => warn!("error adding tablet axis: {err}"),
                }
            }
            cloned = device.axes().to_vec();
        }
        data.axes = vec![0.; cloned.len()];
        if let Some(device) = devices.device_mut(master) {
            device.set_axes(cloned);
        }
        devices.emit(Signal::Changed(master));

        let mut event = Event::new(
            EventType::ProximityIn,
            Some(surface),
            EventData::Proximity(ProximityEvent { time: 0 }),
        )
        .with_devices(master, Some(current))
        .with_seat(Some(seat.id));
        event.tool = device_tool;
        trace!("proximity in on {surface:?} for {tool:?}");

        self.queue_tablet_event(display, name, tablet, event);
    }

    fn tool_proximity_out(&mut self, display: &mut Display, name: GlobalName, tool: ToolId) {
        let Some(seat) = find_seat(&self.seats, name) else {
            return;
        };
        let Some((tablet, device_tool)) = current_tablet(seat, tool) else {
            return;
        };
        let (Some(master), Some(current), Some(focus)) =
            (tablet.master, tablet.current_device, tablet.pointer.focus)
        else {
            return;
        };
        let tablet_id = tablet.id;

        let mut event = Event::new(
            EventType::ProximityOut,
            Some(focus),
            EventData::Proximity(ProximityEvent { time: 0 }),
        )
        .with_devices(master, Some(current))
        .with_seat(Some(seat.id));
        event.tool = device_tool;
        trace!("proximity out of {focus:?} for {tool:?}");
        self.queue_tablet_event(display, name, tablet_id, event);

        self.stop_cursor_animation(master);
        self.update_cursor(master);
        if let Some(data) = find_seat_mut(&mut self.seats, name).and_then(|seat| seat.tablet_mut(tablet_id)) {
            data.pointer.focus = None;
            data.pointer.animation.clear();
        }
        let devices = display.devices_mut();
        devices.update_tool(current, None);
        devices.update_tool(master, None);
    }

    fn tool_motion(&mut self, display: &mut Display, name: GlobalName, tool: ToolId, x: f64, y: f64) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(pointer) = seat.tablet_pointer_mut(tool) else {
            return;
        };
        pointer.surface_x = x;
        pointer.surface_y = y;

        let Some((tablet, device_tool)) = current_tablet(seat, tool) else {
            return;
        };
        let (Some(master), Some(window)) = (tablet.master, tablet.pointer.focus) else {
            return;
        };
        let (x, y, x_root, y_root) = tablet.pointer.coords(display.windows());

        let mut event = Event::new(
            EventType::MotionNotify,
            Some(window),
            EventData::Motion(MotionEvent {
                time: tablet.pointer.time,
                x,
                y,
                axes: None,
                state: seat.modifiers(master),
                is_hint: false,
                x_root,
                y_root,
            }),
        )
        .with_devices(master, tablet.current_device)
        .with_seat(Some(seat.id));
        event.tool = device_tool;
        let tablet_id = tablet.id;

        self.queue_tablet_event(display, name, tablet_id, event);
    }

    fn tool_button(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        tool: ToolId,
        button: u32,
        pressed: bool,
    ) {
        let Some(seat) = find_seat(&self.seats, name) else {
            return;
        };
        let Some((tablet, device_tool)) = current_tablet(seat, tool) else {
            return;
        };
        let (Some(master), Some(window)) = (tablet.master, tablet.pointer.focus) else {
            return;
        };
        let (x, y, x_root, y_root) = tablet.pointer.coords(display.windows());
        let kind = if pressed {
            EventType::ButtonPress
        } else {
            EventType::ButtonRelease
        };

        let mut event = Event::new(
            kind,
            Some(window),
            EventData::Button(ButtonEvent {
                time: tablet.pointer.time,
                x,
                y,
                axes: None,
                state: seat.modifiers(master),
                button,
                x_root,
                y_root,
            }),
        )
        .with_devices(master, tablet.current_device)
        .with_seat(Some(seat.id));
        event.tool = device_tool;
        let tablet_id = tablet.id;
        self.queue_tablet_event(display, name, tablet_id, event);

        if let Some(pointer) = find_seat_mut(&mut self.seats, name).and_then(|seat| seat.tablet_pointer_mut(tool)) {
            let modifier = ModifierType::for_button(button);
            if pressed {
                pointer.button_modifiers |= modifier;
            } else {
                pointer.button_modifiers &= !modifier;
            }
        }
    }

    /// Wheel clicks scroll at once, outside the tool frame.
    fn tool_wheel(&mut self, display: &mut Display, name: GlobalName, tool: ToolId, clicks: i32) {
        let Some(seat) = find_seat(&self.seats, name) else {
            return;
        };
        let Some((tablet, device_tool)) = current_tablet(seat, tool) else {
            return;
        };
        let (Some(master), Some(window)) = (tablet.master, tablet.pointer.focus) else {
            return;
        };
        let (x, y, x_root, y_root) = tablet.pointer.coords(display.windows());

        let scroll = |direction, delta_y, emulated| {
            let mut event = Event::new(
                EventType::Scroll,
                Some(window),
                EventData::Scroll(ScrollEvent {
                    time: tablet.pointer.time,
                    x,
                    y,
                    state: seat.modifiers(master),
                    direction,
                    x_root,
                    y_root,
                    delta_x: 0.,
                    delta_y,
                    is_stop: false,
                }),
            )
            .with_devices(master, tablet.current_device)
            .with_seat(Some(seat.id));
            event.tool = device_tool.clone();
            event.pointer_emulated = emulated;
            event
        };

        let direction = if clicks > 0 {
            ScrollDirection::Down
        } else {
            ScrollDirection::Up
        };
        let events = vec![
            scroll(ScrollDirection::Smooth, f64::from(clicks), false),
            scroll(direction, 0., true),
        ];
        self.deliver_all(display, events);
    }

    /// Stores a raw axis report of `tool`, normalized by the slave in use.
    fn set_tablet_axis(
        &mut self,
        display: &Display,
        name: GlobalName,
        tool: ToolId,
        axis_use: AxisUse,
        value: f64,
    ) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(tablet) = seat.tool(tool).and_then(|data| data.current_tablet) else {
            return;
        };
        let Some(data) = seat.tablet_mut(tablet) else {
            return;
        };
        let (Some(device), Some(&index)) = (data.current_device, data.axis_indices.get(&axis_use))
        else {
            return;
        };

        let translated = display
            .devices()
            .device(device)
            .and_then(|device| device.translate_axis(index, value));
        if let (Some(translated), Some(axis)) = (translated, data.axes.get_mut(index)) {
            *axis = translated;
        }
        trace!("tool {axis_use:?} at {value}");
    }

    fn tool_frame(&mut self, display: &mut Display, name: GlobalName, tool: ToolId, time: u32) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(tablet) = seat.tool(tool).and_then(|data| data.current_tablet) else {
            return;
        };
        let Some(data) = seat.tablet_mut(tablet) else {
            return;
        };
        data.pointer.time = time;

        let leaving = data
            .pointer
            .frame
            .event
            .as_ref()
            .is_some_and(|event| event.kind == EventType::ProximityOut);
        if leaving {
            data.current_tool = None;
            if let Some(tool) = seat.tool_mut(tool) {
                tool.current_tablet = None;
            }
        }

        self.flush_tablet_frame(display, name, tablet, time);
    }

    /// Holds `event` until the tool frame, flushing a pending event of
    /// another type first.
    fn queue_tablet_event(&mut self, display: &mut Display, name: GlobalName, tablet: TabletId, event: Event) {
        let Some(data) = find_seat(&self.seats, name).and_then(|seat| seat.tablet(tablet)) else {
            return;
        };
        let pending = data.pointer.frame.event.as_ref().map(|pending| pending.kind);
        if pending.is_some_and(|kind| kind != event.kind) {
            let time = display.clock().now_ms();
            self.flush_tablet_frame(display, name, tablet, time);
        }

        if let Some(data) = find_seat_mut(&mut self.seats, name).and_then(|seat| seat.tablet_mut(tablet)) {
            data.pointer.frame.event = Some(event);
        }
    }

    fn flush_tablet_frame(&mut self, display: &mut Display, name: GlobalName, tablet: TabletId, time: u32) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let seat_id = seat.id;
        let Some(data) = seat.tablet_mut(tablet) else {
            return;
        };
        let Some(mut event) = data.pointer.frame.event.take() else {
            return;
        };
        set_event_time(&mut event, time);

        // Motion and buttons carry a snapshot of the tool axes.
        match &mut event.data {
            EventData::Motion(motion) => motion.axes = Some(data.axes.clone()),
            EventData::Button(button) => button.axes = Some(data.axes.clone()),
            _ => (),
        }

        let crossing = |kind| {
            let window = event.window?;
            let (x, y) = (data.pointer.surface_x, data.pointer.surface_y);
            let (x_root, y_root) = display.windows().root_coords(window, x, y);
            let crossing = Event::new(
                kind,
                Some(window),
                EventData::Crossing(CrossingEvent {
                    subwindow: None,
                    time,
                    x,
                    y,
                    x_root,
                    y_root,
                    mode: CrossingMode::Normal,
                    detail: NotifyType::Nonlinear,
                    focus: true,
                    state: ModifierType::empty(),
                }),
            )
            .with_devices(event.device?, event.source_device)
            .with_seat(Some(seat_id));
            Some(crossing)
        };

        // Crossings bracket the proximity: Enter right before ProximityIn,
        // Leave right before ProximityOut.
        let mut events = Vec::new();
        match event.kind {
            EventType::ProximityIn => events.extend(crossing(EventType::EnterNotify)),
            EventType::ProximityOut => events.extend(crossing(EventType::LeaveNotify)),
            _ => (),
        }
        events.push(event);

        self.deliver_all(display, events);
    }
}

impl WaylandSeat {
    /// Pointer state of the tablet `tool` is in proximity of.
    fn tablet_pointer_mut(&mut self, tool: ToolId) -> Option<&mut PointerData> {
        let tablet = self.tool(tool)?.current_tablet?;
        self.tablet_mut(tablet).map(|data| &mut data.pointer)
    }
}
