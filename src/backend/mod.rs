//! Backend capability set and the timers backends schedule on the main loop.
//!
//! The display core never talks to a server directly. Every query that needs
//! one (pointer position, grabs, cursor changes) goes through a
//! [`DeviceBackend`], implemented by [`x11::X11Backend`] and
//! [`wayland::WaylandBackend`].

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use calloop::timer::{TimeoutAction, Timer};
use calloop::{LoopHandle, RegistrationToken};
use tracing::warn;

use crate::cursor::Cursor;
use crate::device::{DeviceId, TimeCoord};
use crate::display::Display;
use crate::error::GrabStatus;
use crate::event::{EventMask, ModifierType};
use crate::seat::{SeatCapabilities, SeatId};
use crate::window::WindowId;

pub mod wayland;
pub mod x11;

/// Pointer position as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerState {
    pub root: WindowId,
    /// Direct child of the queried window containing the pointer.
    pub child: Option<WindowId>,
    pub root_x: f64,
    pub root_y: f64,
    pub win_x: f64,
    pub win_y: f64,
    pub mask: ModifierType,
}

/// Device axes and modifiers, as returned by `get_state`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub axes: Vec<f64>,
    pub mask: ModifierType,
}

/// The window under a device, with the device position relative to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowAtPosition {
    pub window: WindowId,
    pub x: f64,
    pub y: f64,
    pub mask: ModifierType,
}

/// Operations the core needs from a windowing backend.
pub trait DeviceBackend {
    fn get_state(&self, display: &Display, device: DeviceId, window: WindowId)
        -> Option<DeviceState>;

    /// Motion history between `start` and `stop`. Backends without history
    /// return nothing.
    fn get_history(
        &self,
        display: &Display,
        device: DeviceId,
        window: WindowId,
        start: u32,
        stop: u32,
    ) -> Vec<TimeCoord> {
        let _ = (display, device, window, start, stop);
        Vec::new()
    }

    fn set_window_cursor(
        &mut self,
        display: &Display,
        device: DeviceId,
        window: WindowId,
        cursor: Option<Cursor>,
    );

    /// Moves the pointer of `device` to root coordinates.
    fn warp(&mut self, display: &Display, device: DeviceId, x: f64, y: f64) -> GrabStatus;

    /// Pointer position relative to `window`, or to the root when `None`.
    fn query_state(
        &self,
        display: &Display,
        device: DeviceId,
        window: Option<WindowId>,
    ) -> Option<PointerState>;

    #[allow(clippy::too_many_arguments)]
    fn grab(
        &mut self,
        display: &mut Display,
        device: DeviceId,
        window: WindowId,
        owner_events: bool,
        event_mask: EventMask,
        cursor: Option<Cursor>,
        time: u32,
    ) -> GrabStatus;

    fn ungrab(&mut self, display: &mut Display, device: DeviceId, time: u32);

    /// The window under `device`, either the deepest known native window or
    /// its toplevel.
    fn window_at_position(
        &self,
        display: &Display,
        device: DeviceId,
        get_toplevel: bool,
    ) -> Option<WindowAtPosition>;

    fn select_window_events(&mut self, display: &Display, window: WindowId, event_mask: EventMask);

    /// Backend-specific seat grab. `None` lets the display grab the seat's
    /// master pointer and keyboard one by one.
    #[allow(clippy::too_many_arguments)]
    fn seat_grab(
        &mut self,
        display: &mut Display,
        seat: SeatId,
        window: WindowId,
        capabilities: SeatCapabilities,
        owner_events: bool,
        cursor: Option<Cursor>,
        time: u32,
    ) -> Option<GrabStatus> {
        let _ = (display, seat, window, capabilities, owner_events, cursor, time);
        None
    }

    /// Backend-specific seat ungrab. Returns `false` to let the display
    /// ungrab the masters one by one.
    fn seat_ungrab(&mut self, display: &mut Display, seat: SeatId) -> bool {
        let _ = (display, seat);
        false
    }
}

// =============================================================================
// Timers
// =============================================================================

/// Timers a backend may have pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    KeyRepeat(SeatId),
    /// Keyed by the master pointer whose cursor animates.
    CursorAnimation(DeviceId),
}

pub trait Scheduler {
    /// Arms `kind` to fire after `after`, replacing any pending one.
    fn schedule(&mut self, kind: TimerKind, after: Duration);

    fn cancel(&mut self, kind: TimerKind);

    /// Called by the owner when `kind` fired, so the handle can be forgotten.
    fn expired(&mut self, kind: TimerKind);

    fn is_scheduled(&self, kind: TimerKind) -> bool;
}

/// [`Scheduler`] on a calloop event loop.
///
/// Fired timers are reported to `callback` with the loop data; the callback
/// routes them to the backend that armed them.
pub struct CalloopScheduler<D: 'static> {
    handle: LoopHandle<'static, D>,
    callback: fn(&mut D, TimerKind),
    tokens: HashMap<TimerKind, RegistrationToken>,
}

impl<D: 'static> CalloopScheduler<D> {
    pub fn new(handle: LoopHandle<'static, D>, callback: fn(&mut D, TimerKind)) -> Self {
        Self {
            handle,
            callback,
            tokens: HashMap::new(),
        }
    }
}

impl<D: 'static> fmt::Debug for CalloopScheduler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalloopScheduler")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl<D: 'static> Scheduler for CalloopScheduler<D> {
    fn schedule(&mut self, kind: TimerKind, after: Duration) {
        self.cancel(kind);

        let callback = self.callback;
        let timer = Timer::from_duration(after);
        let res = self.handle.insert_source(timer, move |_, _, data| {
            callback(data, kind);
            TimeoutAction::Drop
        });

        match res {
            Ok(token) => {
                self.tokens.insert(kind, token);
            }
            Err(err) => warn!("error scheduling {kind:?}: {err}"),
        }
    }

    fn cancel(&mut self, kind: TimerKind) {
        if let Some(token) = self.tokens.remove(&kind) {
            self.handle.remove(token);
        }
    }

    fn expired(&mut self, kind: TimerKind) {
        self.tokens.remove(&kind);
    }

    fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.tokens.contains_key(&kind)
    }
}

/// Scheduler that only records what was armed; the owner fires timers by
/// hand. Used in headless setups and tests.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    pending: HashMap<TimerKind, Duration>,
}

impl ManualScheduler {
    pub fn pending(&self, kind: TimerKind) -> Option<Duration> {
        self.pending.get(&kind).copied()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, kind: TimerKind, after: Duration) {
        self.pending.insert(kind, after);
    }

    fn cancel(&mut self, kind: TimerKind) {
        self.pending.remove(&kind);
    }

    fn expired(&mut self, kind: TimerKind) {
        self.pending.remove(&kind);
    }

    fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.pending.contains_key(&kind)
    }
}
