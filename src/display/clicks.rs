//! Double and triple click detection.

use tracing::trace;

use crate::device::DeviceId;
use crate::event::{Event, EventType};
use crate::window::WindowId;

use super::Display;

/// The last two presses of one device.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct MultipleClickInfo {
    last_slave: Option<DeviceId>,
    click_time: [u32; 2],
    window: [Option<WindowId>; 2],
    button: [Option<u32>; 2],
    x: [i32; 2],
    y: [i32; 2],
}

impl MultipleClickInfo {
    fn matches(&self, i: usize, press: &Press, window_ms: u64, distance: i32) -> bool {
        u64::from(press.time) < u64::from(self.click_time[i]) + window_ms
            && press.window.is_some()
            && press.window == self.window[i]
            && Some(press.button) == self.button[i]
            && press.source_device == self.last_slave
            && (press.x - self.x[i]).abs() <= distance
            && (press.y - self.y[i]).abs() <= distance
    }
}

struct Press {
    time: u32,
    window: Option<WindowId>,
    button: u32,
    source_device: Option<DeviceId>,
    x: i32,
    y: i32,
}

impl Display {
    /// Classifies a just-queued ButtonPress and queues a 2ButtonPress or
    /// 3ButtonPress copy of it when it completes a multiple click.
    pub(crate) fn generate_multiple_click(&mut self, event: &Event) {
        let (Some(device), Some(button), Some((x, y))) =
            (event.device, event.button(), event.coords())
        else {
            return;
        };

        let press = Press {
            time: event.time(),
            window: event.window,
            button,
            source_device: event.source_device,
            x: x as i32,
            y: y as i32,
        };

        let time = u64::from(self.config.pointer.double_click_time);
        let distance = i32::from(self.config.pointer.double_click_distance);
        let info = self.clicks.entry(device).or_default();

        let kind = if info.matches(1, &press, 2 * time, distance) {
            *info = MultipleClickInfo::default();
            Some(EventType::TripleButtonPress)
        } else if info.matches(0, &press, time, distance) {
            info.click_time = [press.time, info.click_time[0]];
            info.window = [press.window, info.window[0]];
            info.button = [Some(press.button), info.button[0]];
            info.x = [press.x, info.x[0]];
            info.y = [press.y, info.y[0]];
            info.last_slave = press.source_device;
            Some(EventType::DoubleButtonPress)
        } else {
            *info = MultipleClickInfo {
                last_slave: press.source_device,
                click_time: [press.time, 0],
                window: [press.window, None],
                button: [Some(press.button), None],
                x: [press.x, 0],
                y: [press.y, 0],
            };
            None
        };

        if let Some(kind) = kind {
            trace!("{device} produced {kind:?}");
            let mut click = event.clone();
            click.kind = kind;
            self.put_event(click);
        }
    }
}
