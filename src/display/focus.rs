//! Keyboard focus bookkeeping for X-style FocusIn/FocusOut traffic.
//!
//! A toplevel has focus either because its native window (or a descendant)
//! holds the keyboard focus, or because the pointer is inside it while the
//! focus is on an ancestor such as the root. Redundant pairs the server
//! sends around grabs are folded away; a FocusChange event is queued only
//! when the combined state flips.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::device::DeviceId;
use crate::event::{Event, EventData, EventType, FocusEvent, NotifyType};
use crate::window::WindowId;

use super::Display;

/// Detail of a FocusIn/FocusOut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusDetail {
    Ancestor,
    Virtual,
    Inferior,
    Nonlinear,
    NonlinearVirtual,
    Pointer,
    PointerRoot,
    DetailNone,
}

/// Mode of a FocusIn/FocusOut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusMode {
    Normal,
    Grab,
    Ungrab,
    WhileGrabbed,
    PassiveGrab,
    PassiveUngrab,
}

impl FocusMode {
    fn is_grab_transition(self) -> bool {
        matches!(
            self,
            Self::Grab | Self::Ungrab | Self::PassiveGrab | Self::PassiveUngrab
        )
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct ToplevelFocus {
    has_focus: bool,
    has_focus_window: bool,
    has_pointer_focus: bool,
    has_pointer: bool,
    /// Window that is the focus target inside this toplevel, if any.
    focus_window: Option<WindowId>,
}

impl ToplevelFocus {
    fn focused(&self) -> bool {
        self.has_focus || self.has_pointer_focus
    }
}

#[derive(Debug, Default)]
pub struct FocusTracker {
    toplevels: HashMap<WindowId, ToplevelFocus>,
}

impl FocusTracker {
    pub fn has_focus(&self, toplevel: WindowId) -> bool {
        self.toplevels
            .get(&toplevel)
            .is_some_and(ToplevelFocus::focused)
    }

    /// Sets the window that receives focus inside `toplevel`. Focus events
    /// naming that window are handled by the toplevel itself.
    pub fn set_focus_window(&mut self, toplevel: WindowId, window: Option<WindowId>) {
        self.toplevels.entry(toplevel).or_default().focus_window = window;
    }

    pub fn forget(&mut self, toplevel: WindowId) {
        self.toplevels.remove(&toplevel);
    }
}

impl Display {
    pub fn focus(&self) -> &FocusTracker {
        &self.focus
    }

    pub fn focus_mut(&mut self) -> &mut FocusTracker {
        &mut self.focus
    }

    /// Handles a FocusIn (`is_in`) or FocusOut reported for `window`;
    /// `original` is the window the server named.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_focus(
        &mut self,
        window: WindowId,
        original: WindowId,
        device: DeviceId,
        source_device: Option<DeviceId>,
        is_in: bool,
        detail: FocusDetail,
        mode: FocusMode,
    ) {
        let toplevel = self.windows.toplevel(window);
        if self.windows.is_destroyed(toplevel) {
            return;
        }

        let state = self.focus.toplevels.entry(toplevel).or_default();
        if state.focus_window == Some(original) {
            return;
        }

        let had_focus = state.focused();

        trace!(
            "focus {} on {window:?}, detail {detail:?}, mode {mode:?}",
            if is_in { "in" } else { "out" }
        );

        match detail {
            FocusDetail::Ancestor | FocusDetail::Virtual => {
                // The focus moved between the toplevel and an ancestor, so
                // whether the pointer gives us focus depends on the direction.
                if state.has_pointer && !mode.is_grab_transition() {
                    state.has_pointer_focus = !is_in;
                }
                Self::apply_nonlinear(state, is_in, mode);
            }
            FocusDetail::Nonlinear | FocusDetail::NonlinearVirtual => {
                Self::apply_nonlinear(state, is_in, mode);
            }
            FocusDetail::Pointer => {
                if !mode.is_grab_transition() {
                    state.has_pointer_focus = is_in;
                }
            }
            FocusDetail::Inferior | FocusDetail::PointerRoot | FocusDetail::DetailNone => (),
        }

        if state.focused() != had_focus {
            self.generate_focus_event(window, device, source_device, is_in);
        }
    }

    fn apply_nonlinear(state: &mut ToplevelFocus, is_in: bool, mode: FocusMode) {
        if !mode.is_grab_transition() {
            state.has_focus_window = is_in;
        }
        // Keyboard grabs keep the toplevel focused.
        if mode != FocusMode::WhileGrabbed {
            state.has_focus = is_in;
        }
    }

    /// Pointer-driven part of the focus state: the pointer entering a
    /// toplevel whose ancestor holds the focus gives it focus.
    pub fn handle_focus_crossing(&mut self, event: &Event) {
        let Some(crossing) = event.crossing() else {
            return;
        };
        let Some(window) = event.window else {
            return;
        };
        let Some(device) = event.device else {
            return;
        };
        if crossing.detail == NotifyType::Inferior {
            return;
        }

        let toplevel = self.windows.toplevel(window);
        if self.windows.is_destroyed(toplevel) {
            return;
        }

        let is_enter = event.kind == EventType::EnterNotify;
        let state = self.focus.toplevels.entry(toplevel).or_default();
        state.has_pointer = is_enter;

        if !crossing.focus || state.has_focus_window {
            return;
        }

        let had_focus = state.focused();
        state.has_pointer_focus = is_enter;

        if state.focused() != had_focus {
            self.generate_focus_event(window, device, event.source_device, is_enter);
        }
    }

    fn generate_focus_event(
        &mut self,
        window: WindowId,
        device: DeviceId,
        source_device: Option<DeviceId>,
        is_in: bool,
    ) {
        debug!("{window:?} {} focus", if is_in { "gained" } else { "lost" });

        let mut event = Event::new(
            EventType::FocusChange,
            Some(window),
            EventData::Focus(FocusEvent { is_in }),
        )
        .with_devices(device, source_device);
        event.send_event = true;
        event.seat = self.devices.device(device).and_then(|device| device.seat());
        self.put_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CrossingEvent, CrossingMode, ModifierType};
    use crate::tests::fixture::Fixture;

    fn focus_events(f: &mut Fixture) -> Vec<bool> {
        f.display
            .drain_events()
            .iter()
            .filter_map(|ev| ev.focus().map(|focus| focus.is_in))
            .collect()
    }

    #[test]
    fn nonlinear_in_out() {
        let mut f = Fixture::new();
        let (top, keyboard) = (f.toplevel, f.keyboard);

        f.display.handle_focus(
            top,
            top,
            keyboard,
            None,
            true,
            FocusDetail::Nonlinear,
            FocusMode::Normal,
        );
        f.display.handle_focus(
            top,
            top,
            keyboard,
            None,
            true,
            FocusDetail::Nonlinear,
            FocusMode::Normal,
        );
        assert_eq!(focus_events(&mut f), [true]);
        assert!(f.display.focus().has_focus(top));

        f.display.handle_focus(
            top,
            top,
            keyboard,
            None,
            false,
            FocusDetail::Nonlinear,
            FocusMode::Normal,
        );
        assert_eq!(focus_events(&mut f), [false]);
    }

    #[test]
    fn while_grabbed_keeps_focus() {
        let mut f = Fixture::new();
        let (top, keyboard) = (f.toplevel, f.keyboard);

        f.display.handle_focus(
            top,
            top,
            keyboard,
            None,
            true,
            FocusDetail::Nonlinear,
            FocusMode::Normal,
        );
        f.display.handle_focus(
            top,
            top,
            keyboard,
            None,
            false,
            FocusDetail::Nonlinear,
            FocusMode::WhileGrabbed,
        );
        assert_eq!(focus_events(&mut f), [true]);
        assert!(f.display.focus().has_focus(top));
    }

    #[test]
    fn inferior_and_focus_window_ignored() {
        let mut f = Fixture::new();
        let (top, child, keyboard) = (f.toplevel, f.child, f.keyboard);

        f.display.handle_focus(
            top,
            top,
            keyboard,
            None,
            true,
            FocusDetail::Inferior,
            FocusMode::Normal,
        );
        f.display.focus_mut().set_focus_window(top, Some(child));
        f.display.handle_focus(
            top,
            child,
            keyboard,
            None,
            true,
            FocusDetail::Nonlinear,
            FocusMode::Normal,
        );
        assert!(focus_events(&mut f).is_empty());
    }

    #[test]
    fn pointer_focus_follows_crossings() {
        let mut f = Fixture::new();
        let (top, pointer) = (f.toplevel, f.pointer);

        let mut enter = Event::new(
            EventType::EnterNotify,
            Some(top),
            EventData::Crossing(CrossingEvent {
                subwindow: None,
                time: 1,
                x: 0.,
                y: 0.,
                x_root: 0.,
                y_root: 0.,
                mode: CrossingMode::Normal,
                detail: NotifyType::Nonlinear,
                focus: true,
                state: ModifierType::empty(),
            }),
        )
        .with_devices(pointer, None);
        f.display.handle_focus_crossing(&enter);
        assert_eq!(focus_events(&mut f), [true]);

        enter.kind = EventType::LeaveNotify;
        f.display.handle_focus_crossing(&enter);
        assert_eq!(focus_events(&mut f), [false]);
    }
}
