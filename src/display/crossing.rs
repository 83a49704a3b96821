//! Synthesized Enter/Leave events.
//!
//! A crossing from `a` to `b` produces a Leave on `a`, Leave/Enter events with
//! a virtual detail on every window strictly between them and their common
//! ancestor, and an Enter on `b`.

use tracing::trace;

use crate::backend::DeviceBackend;
use crate::device::{DeviceId, InputSource};
use crate::event::{
    CrossingEvent, CrossingMode, Event, EventData, EventMask, EventSequence, EventType,
    ModifierType, NotifyType,
};
use crate::window::WindowId;

use super::Display;

/// What caused a synthesized crossing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossingSource {
    pub device: DeviceId,
    pub source_device: Option<DeviceId>,
    pub mode: CrossingMode,
    pub time: u32,
    pub serial: u64,
    /// Touch sequence of the event that caused the crossing.
    pub sequence: Option<EventSequence>,
    pub pointer_emulated: bool,
}

impl Display {
    /// Emits the crossings for the pointer moving from `src` to `dest`, which
    /// may be in different toplevels.
    #[allow(clippy::too_many_arguments)]
    pub fn synthesize_crossing_events(
        &mut self,
        backend: &dyn DeviceBackend,
        device: DeviceId,
        source_device: Option<DeviceId>,
        src: Option<WindowId>,
        dest: Option<WindowId>,
        mode: CrossingMode,
        time: u32,
        serial: u64,
    ) {
        let src_toplevel = src.map(|window| self.windows.toplevel(window));
        let dest_toplevel = dest.map(|window| self.windows.toplevel(window));

        let cause = CrossingSource {
            device,
            source_device,
            mode,
            time,
            serial,
            sequence: None,
            pointer_emulated: false,
        };

        match (src_toplevel, dest_toplevel) {
            (None, None) => (),
            (None, Some(toplevel)) => {
                let (x, y, state) = self.position_in(backend, device, toplevel);
                self.synthesize_crossings_in(src, dest, toplevel, x, y, state, cause, false);
            }
            (Some(src_tl), Some(dest_tl)) if src_tl == dest_tl => {
                let (x, y, state) = self.position_in(backend, device, dest_tl);
                self.synthesize_crossings_in(src, dest, dest_tl, x, y, state, cause, false);
            }
            (Some(src_tl), dest_tl) => {
                let (x, y, state) = self.position_in(backend, device, src_tl);
                self.synthesize_crossings_in(src, None, src_tl, x, y, state, cause, false);

                if let Some(dest_tl) = dest_tl {
                    let (x, y, state) = self.position_in(backend, device, dest_tl);
                    self.synthesize_crossings_in(None, dest, dest_tl, x, y, state, cause, false);
                }
            }
        }
    }

    fn position_in(
        &self,
        backend: &dyn DeviceBackend,
        device: DeviceId,
        toplevel: WindowId,
    ) -> (f64, f64, ModifierType) {
        match backend.query_state(self, device, Some(toplevel)) {
            Some(state) => (state.win_x, state.win_y, state.mask),
            None => (0., 0., ModifierType::empty()),
        }
    }

    /// Emits crossings between two windows of one toplevel, with the pointer
    /// at (`toplevel_x`, `toplevel_y`) relative to `toplevel`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn synthesize_crossings_in(
        &mut self,
        a: Option<WindowId>,
        b: Option<WindowId>,
        toplevel: WindowId,
        toplevel_x: f64,
        toplevel_y: f64,
        state: ModifierType,
        cause: CrossingSource,
        non_linear: bool,
    ) {
        if a == b {
            return;
        }

        // Slaves only see windows that selected events for them.
        let is_master = self
            .devices
            .device(cause.device)
            .is_some_and(|device| device.is_master());
        let selects = |display: &Self, window: Option<WindowId>| {
            window.filter(|&window| {
                is_master || !display.windows.device_event_mask(window, cause.device).is_empty()
            })
        };
        let a = selects(self, a);
        let b = selects(self, b);

        if a.is_none() && b.is_none() {
            return;
        }

        let common = match (a, b) {
            (Some(a), Some(b)) => self.windows.common_event_ancestor(a, b),
            _ => None,
        };
        let non_linear = non_linear || (common != a && common != b);

        let root = self.windows.root();
        let stop_at = |window: WindowId| Some(window) == common || window == root;

        if let Some(a) = a {
            let detail = if non_linear {
                NotifyType::Nonlinear
            } else if common == Some(a) {
                NotifyType::Inferior
            } else {
                NotifyType::Ancestor
            };
            self.send_crossing_event(
                toplevel,
                a,
                EventType::LeaveNotify,
                detail,
                None,
                toplevel_x,
                toplevel_y,
                state,
                cause,
            );

            if common != Some(a) {
                let detail = if non_linear {
                    NotifyType::NonlinearVirtual
                } else {
                    NotifyType::Virtual
                };

                let mut last = a;
                let mut current = self.windows.event_parent(a);
                while let Some(window) = current {
                    if stop_at(window) {
                        break;
                    }
                    self.send_crossing_event(
                        toplevel,
                        window,
                        EventType::LeaveNotify,
                        detail,
                        Some(last),
                        toplevel_x,
                        toplevel_y,
                        state,
                        cause,
                    );
                    last = window;
                    current = self.windows.event_parent(window);
                }
            }
        }

        if let Some(b) = b {
            if common != Some(b) {
                let detail = if non_linear {
                    NotifyType::NonlinearVirtual
                } else {
                    NotifyType::Virtual
                };

                let mut path = Vec::new();
                let mut current = self.windows.event_parent(b);
                while let Some(window) = current {
                    if stop_at(window) {
                        break;
                    }
                    path.push(window);
                    current = self.windows.event_parent(window);
                }

                // Outermost first.
                for (i, &window) in path.iter().enumerate().rev() {
                    let subwindow = if i == 0 { b } else { path[i - 1] };
                    self.send_crossing_event(
                        toplevel,
                        window,
                        EventType::EnterNotify,
                        detail,
                        Some(subwindow),
                        toplevel_x,
                        toplevel_y,
                        state,
                        cause,
                    );
                }
            }

            let detail = if non_linear {
                NotifyType::Nonlinear
            } else if common == a {
                NotifyType::Ancestor
            } else {
                NotifyType::Inferior
            };
            self.send_crossing_event(
                toplevel,
                b,
                EventType::EnterNotify,
                detail,
                None,
                toplevel_x,
                toplevel_y,
                state,
                cause,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn send_crossing_event(
        &mut self,
        toplevel: WindowId,
        window: WindowId,
        kind: EventType,
        detail: NotifyType,
        subwindow: Option<WindowId>,
        toplevel_x: f64,
        toplevel_y: f64,
        state: ModifierType,
        cause: CrossingSource,
    ) {
        let touch_grab = cause
            .sequence
            .and_then(|seq| self.has_touch_grab(cause.device, seq, cause.serial));

        let event_mask = if let Some(touch_grab) = touch_grab {
            if touch_grab.window != window {
                return;
            }
            touch_grab.event_mask
        } else {
            match self.has_device_grab(cause.device, cause.serial) {
                Some(grab) if !grab.owner_events => {
                    // Only the grab window sees crossings.
                    if grab.window != window {
                        return;
                    }
                    grab.event_mask
                }
                _ => self.windows.device_event_mask(window, cause.device),
            }
        };

        if kind == EventType::EnterNotify
            && !matches!(cause.mode, CrossingMode::TouchBegin | CrossingMode::TouchEnd)
        {
            let from_touchscreen = cause
                .source_device
                .and_then(|source| self.devices.device(source))
                .is_some_and(|source| source.source() == InputSource::Touchscreen);
            let info = self.pointer_info_mut(cause.device);
            if info.need_touch_press_enter || from_touchscreen {
                // The Enter is owed until the next touch press.
                info.need_touch_press_enter = true;
                return;
            }
        }

        let wanted = match kind {
            EventType::EnterNotify => EventMask::ENTER_NOTIFY,
            _ => EventMask::LEAVE_NOTIFY,
        };
        if !event_mask.contains(wanted) {
            return;
        }

        let (x, y) = self
            .windows
            .translate_coords(toplevel, window, toplevel_x, toplevel_y);
        let (x_root, y_root) = self.windows.root_coords(toplevel, toplevel_x, toplevel_y);

        trace!(
            "crossing {kind:?} on {window:?}, mode {:?}, detail {detail:?}",
            cause.mode
        );

        let mut event = Event::new(
            kind,
            Some(window),
            EventData::Crossing(CrossingEvent {
                subwindow,
                time: cause.time,
                x,
                y,
                x_root,
                y_root,
                mode: cause.mode,
                detail,
                focus: false,
                state,
            }),
        )
        .with_devices(cause.device, cause.source_device);
        event.seat = self
            .devices
            .device(cause.device)
            .and_then(|device| device.seat());
        event.pointer_emulated = cause.pointer_emulated;

        self.put_event(event);
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use super::*;
    use crate::tests::fixture::{crossing_summary, Fixture};

    fn cause(f: &Fixture) -> CrossingSource {
        CrossingSource {
            device: f.pointer,
            source_device: Some(f.mouse),
            mode: CrossingMode::Normal,
            time: 10,
            serial: f.display.serial(),
            sequence: None,
            pointer_emulated: false,
        }
    }

    #[test]
    fn sibling_crossing_is_nonlinear() {
        let mut f = Fixture::new();
        let top = f.toplevel;
        let sibling = f.add_child(WindowId(30), top, (60., 0.), (40., 40.));
        let cause = cause(&f);

        f.display.synthesize_crossings_in(
            Some(f.child),
            Some(sibling),
            top,
            70.,
            10.,
            ModifierType::empty(),
            cause,
            false,
        );

        assert_debug_snapshot!(crossing_summary(&f.display.drain_events()), @r#"
        [
            "LeaveNotify WindowId(20) Nonlinear sub=None (60.0, 0.0)",
            "EnterNotify WindowId(30) Nonlinear sub=None (10.0, 10.0)",
        ]
        "#);
    }

    #[test]
    fn into_child_is_inferior_then_ancestor() {
        let mut f = Fixture::new();
        let (top, child) = (f.toplevel, f.child);
        let cause = cause(&f);

        f.display.synthesize_crossings_in(
            Some(top),
            Some(child),
            top,
            15.,
            15.,
            ModifierType::empty(),
            cause,
            false,
        );

        assert_debug_snapshot!(crossing_summary(&f.display.drain_events()), @r#"
        [
            "LeaveNotify WindowId(10) Inferior sub=None (15.0, 15.0)",
            "EnterNotify WindowId(20) Ancestor sub=None (5.0, 5.0)",
        ]
        "#);
    }

    #[test]
    fn from_nowhere_walks_down_with_virtual_enters() {
        let mut f = Fixture::new();
        let (top, child) = (f.toplevel, f.child);
        let grandchild = f.add_child(WindowId(21), child, (5., 5.), (10., 10.));
        let cause = cause(&f);

        f.display.synthesize_crossings_in(
            None,
            Some(grandchild),
            top,
            16.,
            16.,
            ModifierType::empty(),
            cause,
            false,
        );

        assert_debug_snapshot!(crossing_summary(&f.display.drain_events()), @r#"
        [
            "EnterNotify WindowId(10) Virtual sub=Some(WindowId(20)) (16.0, 16.0)",
            "EnterNotify WindowId(20) Virtual sub=Some(WindowId(21)) (6.0, 6.0)",
            "EnterNotify WindowId(21) Ancestor sub=None (1.0, 1.0)",
        ]
        "#);
    }

    #[test]
    fn grab_filters_crossings() {
        let mut f = Fixture::new();
        let (top, child) = (f.toplevel, f.child);
        let pointer = f.pointer;

        f.display.add_device_grab(
            pointer,
            child,
            top,
            super::super::GrabOwnership::None,
            false,
            EventMask::ENTER_NOTIFY,
            0,
            0,
            false,
        );
        let cause = cause(&f);

        f.display.synthesize_crossings_in(
            Some(top),
            Some(child),
            top,
            15.,
            15.,
            ModifierType::empty(),
            cause,
            false,
        );

        let events = f.display.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventType::EnterNotify);
        assert_eq!(events[0].window, Some(child));
    }

    #[test]
    fn touchscreen_enter_is_deferred() {
        let mut f = Fixture::new();
        let touchscreen = f.add_touchscreen_slave();
        let mut cause = cause(&f);
        cause.source_device = Some(touchscreen);
        let (top, child) = (f.toplevel, f.child);

        f.display.synthesize_crossings_in(
            None,
            Some(child),
            top,
            15.,
            15.,
            ModifierType::empty(),
            cause,
            false,
        );

        assert!(f.display.drain_events().is_empty());
        assert!(f.display.pointer_info(f.pointer).need_touch_press_enter);

        cause.mode = CrossingMode::TouchBegin;
        f.display.synthesize_crossings_in(
            None,
            Some(child),
            top,
            15.,
            15.,
            ModifierType::empty(),
            cause,
            false,
        );
        assert_eq!(f.display.drain_events().len(), 2);
    }
}
