use crate::ipc::Command;
use smithay_client_toolkit::seat::keyboard::{Keysym, Modifiers};

/// Keyboard state of the overlay while it holds exclusive focus.
///
/// The switcher is usually opened from a compositor binding such as Alt+Tab.
/// Seeing the modifier held arms the tracker; letting go of it selects.
/// Modifiers and keysyms come already resolved through the seat's keymap.
#[derive(Debug, Default)]
pub struct Keyboard {
    shift: bool,
    armed: bool,
}

impl Keyboard {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn modifiers(&mut self, modifiers: Modifiers) -> Option<Command> {
        self.shift = modifiers.shift;

        if modifiers.ctrl || modifiers.alt || modifiers.logo {
            self.armed = true;
            None
        } else if self.armed {
            self.armed = false;
            Some(Command::Select)
        } else {
            None
        }
    }

    pub fn key(&mut self, keysym: Keysym) -> Option<Command> {
        match keysym {
            Keysym::Escape => Some(Command::Hide),
            Keysym::ISO_Left_Tab => Some(Command::Prev),
            Keysym::Tab if self.shift => Some(Command::Prev),
            Keysym::Tab => Some(Command::Next),
            Keysym::Left | Keysym::Up => Some(Command::Prev),
            Keysym::Right | Keysym::Down => Some(Command::Next),
            Keysym::Return | Keysym::KP_Enter => Some(Command::Select),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(alt: bool, shift: bool) -> Modifiers {
        Modifiers {
            alt,
            shift,
            ..Default::default()
        }
    }

    #[test]
    fn navigation_keys() {
        let mut keyboard = Keyboard::default();
        assert_eq!(keyboard.key(Keysym::Tab), Some(Command::Next));
        assert_eq!(keyboard.key(Keysym::Right), Some(Command::Next));
        assert_eq!(keyboard.key(Keysym::Left), Some(Command::Prev));
        assert_eq!(keyboard.key(Keysym::Return), Some(Command::Select));
        assert_eq!(keyboard.key(Keysym::KP_Enter), Some(Command::Select));
        assert_eq!(keyboard.key(Keysym::Escape), Some(Command::Hide));
        assert_eq!(keyboard.key(Keysym::a), None);
    }

    #[test]
    fn shift_tab_goes_back() {
        let mut keyboard = Keyboard::default();
        assert_eq!(keyboard.modifiers(held(true, true)), None);
        assert_eq!(keyboard.key(Keysym::Tab), Some(Command::Prev));
        assert_eq!(keyboard.key(Keysym::ISO_Left_Tab), Some(Command::Prev));
        keyboard.modifiers(held(true, false));
        assert_eq!(keyboard.key(Keysym::Tab), Some(Command::Next));
    }

    #[test]
    fn releasing_switch_modifier_selects_once() {
        let mut keyboard = Keyboard::default();
        assert_eq!(keyboard.modifiers(held(true, false)), None);
        assert_eq!(keyboard.modifiers(Modifiers::default()), Some(Command::Select));
        assert_eq!(keyboard.modifiers(Modifiers::default()), None);
    }

    #[test]
    fn ctrl_and_logo_arm_too() {
        for modifiers in [
            Modifiers {
                ctrl: true,
                ..Default::default()
            },
            Modifiers {
                logo: true,
                ..Default::default()
            },
        ] {
            let mut keyboard = Keyboard::default();
            keyboard.modifiers(modifiers);
            assert_eq!(keyboard.modifiers(Modifiers::default()), Some(Command::Select));
        }
    }

    #[test]
    fn locks_and_shift_alone_do_not_arm() {
        let mut keyboard = Keyboard::default();
        keyboard.modifiers(held(false, true));
        keyboard.modifiers(Modifiers {
            caps_lock: true,
            num_lock: true,
            ..Default::default()
        });
        assert_eq!(keyboard.modifiers(Modifiers::default()), None);
    }

    #[test]
    fn reset_disarms() {
        let mut keyboard = Keyboard::default();
        keyboard.modifiers(Modifiers {
            logo: true,
            shift: true,
            ..Default::default()
        });
        keyboard.reset();
        assert_eq!(keyboard.modifiers(Modifiers::default()), None);
        assert_eq!(keyboard.key(Keysym::Tab), Some(Command::Next));
    }
}
