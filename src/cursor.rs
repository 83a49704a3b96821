//! Cursor images, as consumed by the backends.

use std::fmt;
use std::rc::Rc;

/// One frame of a cursor, ready to attach to a cursor surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorBuffer {
    /// Backend handle of the image buffer.
    pub buffer: u64,
    pub hotspot_x: i32,
    pub hotspot_y: i32,
    pub width: i32,
    pub height: i32,
    pub scale: i32,
}

pub trait CursorImage: fmt::Debug {
    /// Frame `index`, or `None` for a blank cursor.
    fn buffer(&self, index: usize) -> Option<CursorBuffer>;

    /// Frame following `current` and how long `current` stays up, in
    /// milliseconds. Static cursors return `current`.
    fn next_image_index(&self, current: usize) -> (usize, u32);

    fn set_scale(&self, scale: i32);
}

/// Shared cursor handle. Two handles are equal when they point at the same
/// image.
#[derive(Debug, Clone)]
pub struct Cursor(Rc<dyn CursorImage>);

impl Cursor {
    pub fn new(image: impl CursorImage + 'static) -> Self {
        Self(Rc::new(image))
    }

    pub fn image(&self) -> &dyn CursorImage {
        &*self.0
    }
}

impl PartialEq for Cursor {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Cursor {}

/// Frame stepping state for an animated cursor.
#[derive(Debug, Default)]
pub struct CursorAnimation {
    cursor: Option<Cursor>,
    image_index: usize,
    image_delay: u32,
    running: bool,
}

/// What the owner of a [`CursorAnimation`] has to do after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationStep {
    /// Nothing more to show.
    Stop,
    /// Keep the current timer running.
    Continue,
    /// Restart the timer with this delay in milliseconds.
    Schedule(u32),
}

impl CursorAnimation {
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn image_index(&self) -> usize {
        self.image_index
    }

    /// How long the current frame stays up, in milliseconds.
    pub fn image_delay(&self) -> u32 {
        self.image_delay
    }

    /// Replaces the cursor. Returns `false` when it is already set.
    pub fn set_cursor(&mut self, cursor: Cursor) -> bool {
        if self.cursor.as_ref() == Some(&cursor) {
            return false;
        }
        self.stop();
        self.cursor = Some(cursor);
        true
    }

    pub fn clear(&mut self) {
        self.stop();
        self.cursor = None;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.image_index = 0;
    }

    /// The frame to display now.
    pub fn current_buffer(&self) -> Option<CursorBuffer> {
        self.cursor.as_ref()?.image().buffer(self.image_index)
    }

    /// Advances past the frame just displayed.
    pub fn advance(&mut self) -> AnimationStep {
        let Some(cursor) = &self.cursor else {
            self.running = false;
            return AnimationStep::Stop;
        };

        let (next_index, next_delay) = cursor.image().next_image_index(self.image_index);
        if next_index == self.image_index {
            self.stop();
            return AnimationStep::Stop;
        }

        let step = if next_delay != self.image_delay || !self.running {
            self.stop();
            self.running = true;
            AnimationStep::Schedule(next_delay)
        } else {
            AnimationStep::Continue
        };

        self.image_index = next_index;
        self.image_delay = next_delay;
        step
    }
}
