//! The path every translated event takes before it reaches the queue.
//!
//! Backends hand native-window events to [`Display::process_event`]. The
//! pipeline retires finished grabs, starts implicit grabs on presses, picks
//! the window that should receive the event given the active grabs and the
//! windows' event masks, and classifies multiple clicks.

use tracing::trace;

use crate::backend::DeviceBackend;
use crate::device::{DeviceId, DeviceType, InputMode, InputSource};
use crate::event::{
    ButtonEvent, CrossingMode, Event, EventData, EventMask, EventType, MotionEvent, ModifierType,
    NotifyType, BUTTON_PRIMARY,
};
use crate::window::{WindowId, WindowType};

use super::{Display, GrabOwnership};

fn is_emulating(event: &Event) -> bool {
    event.pointer_emulated || event.emulating_pointer()
}

/// Events delivered through the grab and event-mask machinery.
fn is_routed(kind: EventType) -> bool {
    matches!(
        kind,
        EventType::MotionNotify
            | EventType::ButtonPress
            | EventType::ButtonRelease
            | EventType::Scroll
            | EventType::TouchpadSwipe
            | EventType::TouchpadPinch
    ) || kind.is_touch()
}

impl Display {
    /// Processes one translated event and queues whatever results from it.
    pub fn process_event(&mut self, backend: &dyn DeviceBackend, mut event: Event) {
        let serial = self.next_serial();
        self.update_last_event_time(event.time());

        if let Some(device) = event.device {
            let source = self.devices.device(device).map(|dev| dev.source());
            if !matches!(source, Some(InputSource::Keyboard | InputSource::TabletPad)) {
                let source_is_slave = event
                    .source_device
                    .and_then(|source| self.devices.device(source))
                    .is_some_and(|source| source.device_type() == DeviceType::Slave);

                let info = self.pointer_info_mut(device);
                if event.source_device != info.last_slave && source_is_slave {
                    info.last_slave = event.source_device;
                } else if info.last_slave.is_some() {
                    event.source_device = info.last_slave;
                }
            }

            self.device_grab_update(backend, device, event.source_device, serial);

            let disabled = self
                .devices
                .device(device)
                .is_some_and(|dev| dev.mode() == InputMode::Disabled);
            if disabled || !self.check_grab_ownership(device, serial) {
                trace!("dropping {:?} of {device}: disabled or grabbed away", event.kind);
                return;
            }
        }

        let (Some(window), Some(device)) = (event.window, event.device) else {
            self.put_event(event);
            return;
        };

        if self.windows.is_destroyed(window) {
            trace!("dropping {:?} on destroyed {window:?}", event.kind);
            return;
        }

        if let Some(crossing) = event.crossing() {
            let grab_crossing = matches!(
                crossing.mode,
                CrossingMode::Grab
                    | CrossingMode::Ungrab
                    | CrossingMode::ToolkitGrab
                    | CrossingMode::ToolkitUngrab
            );
            if grab_crossing
                && (self.has_device_grab(device, serial).is_some()
                    || crossing.detail == NotifyType::Inferior)
            {
                // Grab crossings are synthesized by the grab table.
                if event.kind == EventType::EnterNotify
                    && crossing.mode == CrossingMode::Ungrab
                    && self.windows.toplevel(window) == window
                {
                    self.pointer_info_mut(device).toplevel_under_pointer = Some(window);
                }
                return;
            }
        }

        if self.windows.window_type(window) == Some(WindowType::Root) {
            self.put_event(event);
            return;
        }

        self.update_pointer_info(device, window, &event);

        if event.kind.is_crossing() {
            if self.crossing_is_delivered(device, window, &event, serial) {
                self.put_event(event);
            }
            return;
        }

        if !is_routed(event.kind) {
            self.put_event(event);
            return;
        }

        self.pay_touch_press_enter(device, &event, serial);

        if (event.kind == EventType::ButtonPress || event.kind == EventType::TouchBegin)
            && !event.send_event
        {
            self.start_implicit_grab(backend, device, window, &event, serial);
        }

        let original = event.clone();
        match self.retarget(device, window, event, serial) {
            Some(event) => {
                let is_press = event.kind == EventType::ButtonPress;
                self.put_event(event.clone());
                if is_press {
                    self.generate_multiple_click(&event);
                }
            }
            None => trace!("no window selects {:?} of {device}", original.kind),
        }

        self.end_implicit_grab(backend, device, &original, serial);
    }

    fn update_pointer_info(&mut self, device: DeviceId, window: WindowId, event: &Event) {
        let toplevel = self.windows.toplevel(window);

        if let Some(crossing) = event.crossing() {
            let is_enter = event.kind == EventType::EnterNotify;
            let info = self.pointer_info_mut(device);

            if crossing.detail != NotifyType::Inferior && toplevel == window {
                info.toplevel_under_pointer = is_enter.then_some(window);
            }

            if is_enter {
                info.window_under_pointer = Some(window);
            } else if crossing.detail != NotifyType::Inferior
                && info.window_under_pointer == Some(window)
            {
                info.window_under_pointer = None;
            }
        }

        if !event.kind.is_pointing() || (event.kind.is_touch() && !is_emulating(event)) {
            return;
        }
        let Some((x, y)) = event.coords() else {
            return;
        };

        let (toplevel_x, toplevel_y) = self.windows.translate_coords(window, toplevel, x, y);
        let state = event.state().unwrap_or_default();
        let button = match event.kind {
            EventType::TouchBegin | EventType::TouchEnd => Some(BUTTON_PRIMARY),
            _ => event.button(),
        };

        let info = self.pointer_info_mut(device);
        info.toplevel_x = toplevel_x;
        info.toplevel_y = toplevel_y;
        info.state = state;
        if let Some(button) = button {
            info.button = button;
        }
    }

    fn crossing_is_delivered(
        &self,
        device: DeviceId,
        window: WindowId,
        event: &Event,
        serial: u64,
    ) -> bool {
        let mask = match self.has_device_grab(device, serial) {
            Some(grab) if !grab.owner_events => {
                if grab.window != window {
                    return false;
                }
                grab.event_mask
            }
            _ => self.windows.device_event_mask(window, device),
        };
        mask.intersects(event.kind.mask())
    }

    /// Emits the Enter a touchscreen interaction left owed, once another
    /// device (or a new touch press) takes over the pointer.
    fn pay_touch_press_enter(&mut self, device: DeviceId, event: &Event, serial: u64) {
        let info = self.pointer_info(device);
        if !info.need_touch_press_enter {
            return;
        }

        let last_slave_is_touchscreen = info
            .last_slave
            .and_then(|slave| self.devices.device(slave))
            .is_some_and(|slave| slave.source() == InputSource::Touchscreen);

        let mode = match event.kind {
            EventType::ButtonPress => Some(if last_slave_is_touchscreen {
                CrossingMode::TouchBegin
            } else {
                CrossingMode::DeviceSwitch
            }),
            EventType::TouchBegin if is_emulating(event) => Some(CrossingMode::TouchBegin),
            EventType::MotionNotify if !last_slave_is_touchscreen => {
                Some(CrossingMode::DeviceSwitch)
            }
            _ => None,
        };
        let Some(mode) = mode else {
            return;
        };

        self.pointer_info_mut(device).need_touch_press_enter = false;

        let Some(under) = info.window_under_pointer else {
            return;
        };
        let toplevel = self.windows.toplevel(under);
        let cause = super::CrossingSource {
            device,
            source_device: event.source_device,
            mode,
            time: event.time(),
            serial,
            sequence: event.sequence(),
            pointer_emulated: event.pointer_emulated,
        };
        self.synthesize_crossings_in(
            None,
            Some(under),
            toplevel,
            info.toplevel_x,
            info.toplevel_y,
            info.state,
            cause,
            mode == CrossingMode::DeviceSwitch,
        );
    }

    fn start_implicit_grab(
        &mut self,
        backend: &dyn DeviceBackend,
        device: DeviceId,
        window: WindowId,
        event: &Event,
        serial: u64,
    ) {
        let is_touch_begin = event.kind == EventType::TouchBegin;
        let allowed = match self.has_device_grab(device, serial) {
            None => true,
            Some(grab) => is_touch_begin && grab.implicit && !is_emulating(event),
        };
        if !allowed {
            return;
        }

        let root = self.windows.root();
        let mut grab_window = window;
        loop {
            let mask = self.windows.device_event_mask(grab_window, device);
            if !is_touch_begin && mask.contains(EventMask::BUTTON_PRESS) {
                break;
            }
            if is_touch_begin && mask.contains(EventMask::TOUCH) {
                break;
            }
            match self.windows.event_parent(grab_window) {
                Some(parent) if parent != root => grab_window = parent,
                _ => break,
            }
        }

        let mask = self.windows.device_event_mask(grab_window, device);
        let native = self
            .windows
            .native_toplevel(grab_window)
            .unwrap_or(grab_window);
        let time = event.time();

        if is_touch_begin && mask.contains(EventMask::TOUCH) {
            if let Some(sequence) = event.sequence() {
                self.add_touch_grab(device, sequence, grab_window, native, mask, serial, time);
            }
        } else if !is_touch_begin || is_emulating(event) {
            self.add_device_grab(
                device,
                grab_window,
                native,
                GrabOwnership::None,
                false,
                mask | EventMask::BUTTON_RELEASE,
                serial,
                time,
                true,
            );
            self.device_grab_update(backend, device, event.source_device, serial);
        }
    }

    /// Picks the receiving window and converts the event to its
    /// coordinates. `None` drops the event.
    fn retarget(
        &mut self,
        device: DeviceId,
        window: WindowId,
        mut event: Event,
        serial: u64,
    ) -> Option<Event> {
        let emulating = event.kind.is_touch() && is_emulating(&event);
        let emulated_mask = if emulating {
            match event.kind {
                EventType::TouchBegin => EventMask::BUTTON_PRESS,
                EventType::TouchUpdate => EventMask::POINTER_MOTION,
                EventType::TouchEnd => EventMask::BUTTON_RELEASE,
                _ => EventMask::empty(),
            }
        } else {
            EventMask::empty()
        };

        let state = event.state().unwrap_or_default();
        let wanted = event.kind.mask();
        let selects = |mask: EventMask| {
            if event.kind == EventType::MotionNotify
                || (emulating && event.kind == EventType::TouchUpdate)
            {
                mask.selects_motion(state) || mask.intersects(wanted)
            } else {
                mask.intersects(wanted | emulated_mask)
            }
        };

        let grab = self.has_device_grab(device, serial).cloned();
        let touch_grab = event
            .sequence()
            .and_then(|seq| self.has_touch_grab(device, seq, serial))
            .cloned();

        let target = if let Some(touch_grab) = touch_grab.as_ref().filter(|touch| {
            grab.as_ref()
                .map_or(true, |grab| grab.implicit || touch.serial >= grab.serial_start)
        }) {
            selects(touch_grab.event_mask).then_some((touch_grab.window, touch_grab.event_mask))
        } else if let Some(grab) = grab.as_ref().filter(|grab| !grab.owner_events) {
            selects(grab.event_mask).then_some((grab.window, grab.event_mask))
        } else {
            let mut current = Some(window);
            let mut found = None;
            while let Some(candidate) = current {
                let mask = self.windows.device_event_mask(candidate, device);
                if selects(mask) {
                    found = Some((candidate, mask));
                    break;
                }
                current = self.windows.event_parent(candidate);
            }

            found.or_else(|| {
                let grab = grab.as_ref()?;
                selects(grab.event_mask).then_some((grab.window, grab.event_mask))
            })
        };

        let (target, target_mask) = target?;

        if let Some((x, y)) = event.coords() {
            let (x, y) = self.windows.translate_coords(window, target, x, y);
            event.set_coords(x, y);
        }
        event.window = Some(target);

        let has_touch_grab = touch_grab.is_some();
        if emulating && (!target_mask.contains(EventMask::TOUCH) || !has_touch_grab) {
            event = emulate_pointer_event(event)?;
        }

        Some(event)
    }

    fn end_implicit_grab(
        &mut self,
        backend: &dyn DeviceBackend,
        device: DeviceId,
        event: &Event,
        serial: u64,
    ) {
        if event.send_event
            || !matches!(
                event.kind,
                EventType::ButtonRelease | EventType::TouchEnd | EventType::TouchCancel
            )
        {
            return;
        }

        if let Some(sequence) = event.sequence() {
            self.end_touch_grab(device, sequence);
        }

        let last_release = match event.kind {
            EventType::ButtonRelease => event.is_last_button_release(),
            _ => is_emulating(event),
        };
        if !last_release {
            return;
        }

        let Some(grabs) = self.device_grabs.get_mut(&device) else {
            return;
        };
        let Some(grab) = grabs.iter_mut().find(|grab| grab.covers(serial)) else {
            return;
        };
        if !grab.implicit {
            return;
        }

        grab.serial_end = serial;
        grab.implicit_ungrab = false;
        self.device_grab_update(backend, device, event.source_device, serial);
    }
}

/// Converts an emulating touch event into the pointer event it stands for.
fn emulate_pointer_event(event: Event) -> Option<Event> {
    let EventData::Touch(touch) = &event.data else {
        return Some(event);
    };

    let state = touch.state | ModifierType::BUTTON1;
    let (kind, data) = match event.kind {
        EventType::TouchBegin | EventType::TouchEnd => {
            let kind = if event.kind == EventType::TouchBegin {
                EventType::ButtonPress
            } else {
                EventType::ButtonRelease
            };
            let data = EventData::Button(ButtonEvent {
                time: touch.time,
                x: touch.x,
                y: touch.y,
                axes: touch.axes.clone(),
                state,
                button: BUTTON_PRIMARY,
                x_root: touch.x_root,
                y_root: touch.y_root,
            });
            (kind, data)
        }
        EventType::TouchUpdate => (
            EventType::MotionNotify,
            EventData::Motion(MotionEvent {
                time: touch.time,
                x: touch.x,
                y: touch.y,
                axes: touch.axes.clone(),
                state,
                is_hint: false,
                x_root: touch.x_root,
                y_root: touch.y_root,
            }),
        ),
        _ => return None,
    };

    Some(Event {
        kind,
        data,
        pointer_emulated: true,
        ..event
    })
}
