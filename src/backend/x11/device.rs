//! Per-device XInput2 state: scroll valuators and the last reported axes.

use tracing::debug;

use crate::event::{EventMask, ModifierType, ScrollDirection};

use super::protocol::{mask_is_set, GroupState, ModifierState, XiEventBits};

/// Raw valuator jumps larger than this are taken as a wrap of the 32.32 fixed
/// point value rather than real movement.
const WRAP_THRESHOLD: f64 = (1u64 << 31) as f64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollValuator {
    pub n_valuator: usize,
    pub direction: ScrollDirection,
    pub increment: f64,
    last_value: Option<f64>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Xi2Device {
    scroll_valuators: Vec<ScrollValuator>,
    last_axes: Option<Vec<f64>>,
}

impl Xi2Device {
    pub fn add_scroll_valuator(
        &mut self,
        n_valuator: usize,
        direction: ScrollDirection,
        increment: f64,
    ) {
        if increment == 0. || !increment.is_finite() {
            debug!("ignoring scroll valuator {n_valuator} with increment {increment}");
            return;
        }

        self.scroll_valuators.push(ScrollValuator {
            n_valuator,
            direction,
            increment,
            last_value: None,
        });
    }

    pub fn scroll_valuators(&self) -> &[ScrollValuator] {
        &self.scroll_valuators
    }

    /// Feeds a new raw value of valuator `n_valuator`. Returns `None` when it
    /// is not a scroll valuator; otherwise the scroll direction and the delta
    /// in scroll increments since the previous value.
    pub fn get_scroll_delta(&mut self, n_valuator: usize, value: f64) -> Option<(ScrollDirection, f64)> {
        let scroll = self
            .scroll_valuators
            .iter_mut()
            .find(|scroll| scroll.n_valuator == n_valuator)?;

        let delta = match scroll.last_value {
            Some(last) if (value - last).abs() <= WRAP_THRESHOLD => (value - last) / scroll.increment,
            Some(last) => {
                debug!("scroll valuator {n_valuator} wrapped from {last} to {value}");
                0.
            }
            None => 0.,
        };
        scroll.last_value = Some(value);

        Some((scroll.direction, delta))
    }

    /// Forgets the last values, so the next event starts from zero.
    pub fn reset_scroll_valuators(&mut self) {
        for scroll in &mut self.scroll_valuators {
            scroll.last_value = None;
        }
    }

    pub fn unset_scroll_valuators(&mut self) {
        self.scroll_valuators.clear();
    }

    pub fn last_axis_value(&self, n_axis: usize) -> f64 {
        self.last_axes
            .as_ref()
            .and_then(|axes| axes.get(n_axis))
            .copied()
            .unwrap_or(0.)
    }

    pub fn store_axes(&mut self, axes: Option<&[f64]>) {
        self.last_axes = axes.filter(|axes| !axes.is_empty()).map(<[f64]>::to_vec);
    }
}

/// Combines XI2 modifier, button and group state into a [`ModifierType`].
/// Only the first three buttons are reported.
pub fn translate_state(
    mods: Option<&ModifierState>,
    buttons: Option<&[u8]>,
    group: Option<&GroupState>,
) -> ModifierType {
    let mut state = ModifierType::from_bits_retain(mods.map_or(0, |mods| mods.effective));

    if let Some(buttons) = buttons {
        let len = (buttons.len() * 8).min(4);
        for button in 1..len {
            if mask_is_set(buttons, button) {
                state |= ModifierType::for_button(button as u32);
            }
        }
    }

    if let Some(group) = group {
        state |= ModifierType::from_bits_retain(u32::from(group.effective) << 13);
    }

    state
}

/// XI2 events to select for `event_mask`. Touch events need XI 2.2.
pub fn translate_event_mask(event_mask: EventMask, minor: u32) -> XiEventBits {
    let mut mask = XiEventBits::empty();

    if event_mask.intersects(EventMask::POINTER_MOTION | EventMask::POINTER_MOTION_HINT) {
        mask |= XiEventBits::MOTION;
    }

    if event_mask.intersects(
        EventMask::BUTTON_MOTION
            | EventMask::BUTTON1_MOTION
            | EventMask::BUTTON2_MOTION
            | EventMask::BUTTON3_MOTION,
    ) {
        mask |= XiEventBits::BUTTON_PRESS | XiEventBits::BUTTON_RELEASE | XiEventBits::MOTION;
    }

    if event_mask.contains(EventMask::SCROLL) {
        mask |= XiEventBits::BUTTON_PRESS | XiEventBits::BUTTON_RELEASE;
    }
    if event_mask.contains(EventMask::BUTTON_PRESS) {
        mask |= XiEventBits::BUTTON_PRESS;
    }
    if event_mask.contains(EventMask::BUTTON_RELEASE) {
        mask |= XiEventBits::BUTTON_RELEASE;
    }
    if event_mask.contains(EventMask::KEY_PRESS) {
        mask |= XiEventBits::KEY_PRESS;
    }
    if event_mask.contains(EventMask::KEY_RELEASE) {
        mask |= XiEventBits::KEY_RELEASE;
    }
    if event_mask.contains(EventMask::ENTER_NOTIFY) {
        mask |= XiEventBits::ENTER;
    }
    if event_mask.contains(EventMask::LEAVE_NOTIFY) {
        mask |= XiEventBits::LEAVE;
    }
    if event_mask.contains(EventMask::FOCUS_CHANGE) {
        mask |= XiEventBits::FOCUS_IN | XiEventBits::FOCUS_OUT;
    }

    if minor >= 2 && event_mask.contains(EventMask::TOUCH) {
        mask |= XiEventBits::TOUCH_BEGIN | XiEventBits::TOUCH_UPDATE | XiEventBits::TOUCH_END;
    }

    mask
}
