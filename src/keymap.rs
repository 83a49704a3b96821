//! Keymap collaborator and key text synthesis.
//!
//! Keysym tables and layout state belong to the keymap implementation; the
//! core only asks it to translate keycodes and reports its signals.

use crate::event::ModifierType;

pub mod keysyms {
    pub const VOID_SYMBOL: u32 = 0xff_ffff;
    pub const RETURN: u32 = 0xff0d;
    pub const ESCAPE: u32 = 0xff1b;
    pub const KP_ENTER: u32 = 0xff8d;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTranslation {
    pub keyval: u32,
    pub effective_group: u8,
    pub level: u32,
    /// Modifiers used up by the translation.
    pub consumed: ModifierType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextDirection {
    Ltr,
    Rtl,
    Neutral,
}

pub trait Keymap {
    fn translate_keyboard_state(
        &self,
        keycode: u32,
        state: ModifierType,
        group: u8,
    ) -> Option<KeyTranslation>;

    fn key_is_modifier(&self, keycode: u32) -> bool;

    fn direction(&self) -> TextDirection {
        TextDirection::Neutral
    }

    /// Adds the virtual modifiers (Super, Hyper, Meta) mapped by the real
    /// modifiers in `state`.
    fn add_virtual_modifiers(&self, state: ModifierType) -> ModifierType {
        state
    }

    fn keyval_to_unicode(&self, keyval: u32) -> Option<char>;

    fn key_repeats(&self, keycode: u32) -> bool {
        let _ = keycode;
        true
    }

    /// Effective modifiers of the tracked keyboard state.
    fn modifier_state(&self) -> ModifierType {
        ModifierType::empty()
    }

    /// Updates the tracked state from the compositor's serialized modifiers.
    fn update_mask(&mut self, depressed: u32, latched: u32, locked: u32, group: u32) {
        let _ = (depressed, latched, locked, group);
    }

    /// Replaces the keymap with one received from the compositor. Returns
    /// whether it was accepted.
    fn update_from_data(&mut self, format: u32, data: &[u8]) -> bool {
        let _ = (format, data);
        false
    }

    /// The keysym of `keycode` in the tracked state.
    fn key_get_one_sym(&self, keycode: u32) -> Option<u32> {
        self.translate_keyboard_state(keycode, self.modifier_state(), 0)
            .map(|translation| translation.keyval)
    }
}

/// Text for a key event, folded for control combinations the way classic
/// Xlib does.
pub fn translate_keyboard_string(keymap: &dyn Keymap, keyval: u32, state: ModifierType) -> String {
    let c = if keyval == keysyms::VOID_SYMBOL {
        None
    } else {
        keymap.keyval_to_unicode(keyval).filter(|c| *c != '\0')
    };

    let Some(mut c) = c else {
        return match keyval {
            keysyms::ESCAPE => String::from("\x1b"),
            keysyms::RETURN | keysyms::KP_ENTER => String::from("\r"),
            _ => String::new(),
        };
    };

    if state.contains(ModifierType::CONTROL) {
        let code = u32::from(c);
        let folded = if (u32::from('@')..0x7f).contains(&code) || c == ' ' {
            Some(code & 0x1f)
        } else if c == '2' {
            return String::from("\0");
        } else if ('3'..='7').contains(&c) {
            Some(code - (u32::from('3') - 0x1b))
        } else if c == '8' {
            Some(0x7f)
        } else if c == '/' {
            Some(u32::from('_') & 0x1f)
        } else {
            None
        };

        if let Some(folded) = folded.and_then(char::from_u32) {
            c = folded;
        }
    }

    c.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Latin;

    impl Keymap for Latin {
        fn translate_keyboard_state(
            &self,
            keycode: u32,
            _state: ModifierType,
            _group: u8,
        ) -> Option<KeyTranslation> {
            Some(KeyTranslation {
                keyval: keycode,
                effective_group: 0,
                level: 0,
                consumed: ModifierType::empty(),
            })
        }

        fn key_is_modifier(&self, _keycode: u32) -> bool {
            false
        }

        fn keyval_to_unicode(&self, keyval: u32) -> Option<char> {
            (keyval < 0x100).then(|| char::from_u32(keyval)).flatten()
        }
    }

    fn text(keyval: u32, state: ModifierType) -> String {
        translate_keyboard_string(&Latin, keyval, state)
    }

    #[test]
    fn plain_text() {
        assert_eq!(text(u32::from('a'), ModifierType::empty()), "a");
        assert_eq!(text(u32::from('a'), ModifierType::SHIFT), "a");
        assert_eq!(text(keysyms::ESCAPE, ModifierType::empty()), "\x1b");
        assert_eq!(text(keysyms::KP_ENTER, ModifierType::empty()), "\r");
        assert_eq!(text(keysyms::VOID_SYMBOL, ModifierType::empty()), "");
        assert_eq!(text(0xffbe, ModifierType::empty()), "");
    }

    #[test]
    fn control_folding() {
        let ctrl = ModifierType::CONTROL;
        assert_eq!(text(u32::from('c'), ctrl), "\x03");
        assert_eq!(text(u32::from('@'), ctrl), "\0");
        assert_eq!(text(u32::from(' '), ctrl), "\0");
        assert_eq!(text(u32::from('2'), ctrl), "\0");
        assert_eq!(text(u32::from('3'), ctrl), "\x1b");
        assert_eq!(text(u32::from('7'), ctrl), "\x1f");
        assert_eq!(text(u32::from('8'), ctrl), "\x7f");
        assert_eq!(text(u32::from('/'), ctrl), "\x1f");
        assert_eq!(text(u32::from('1'), ctrl), "1");
    }

    #[test]
    fn one_sym_uses_tracked_state() {
        assert_eq!(Latin.key_get_one_sym(0x41), Some(0x41));
    }
}
