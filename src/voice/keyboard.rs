//! Global keyboard events for push-to-talk
//!
//! Each readable keyboard device gets a reader thread that forwards key
//! transitions over a channel. The capture state machine consumes the
//! channel; nothing here knows about recording.

use std::fmt;
use std::str::FromStr;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::{Error, Result};

/// Events buffered between the reader threads and the state machine
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Physical key reported by a keyboard source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalKey {
    LeftShift,
    RightShift,
    LeftCtrl,
    RightCtrl,
    LeftAlt,
    RightAlt,
    Space,
    CapsLock,
    /// Any other key, by scan code
    Other(u16),
}

/// Key that triggers recording
///
/// Plain modifier names match either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKey {
    Shift,
    Ctrl,
    Alt,
    Space,
    CapsLock,
    /// One specific physical key
    Exact(PhysicalKey),
}

impl TriggerKey {
    #[must_use]
    pub fn matches(self, key: PhysicalKey) -> bool {
        match self {
            Self::Shift => matches!(key, PhysicalKey::LeftShift | PhysicalKey::RightShift),
            Self::Ctrl => matches!(key, PhysicalKey::LeftCtrl | PhysicalKey::RightCtrl),
            Self::Alt => matches!(key, PhysicalKey::LeftAlt | PhysicalKey::RightAlt),
            Self::Space => matches!(key, PhysicalKey::Space),
            Self::CapsLock => matches!(key, PhysicalKey::CapsLock),
            Self::Exact(exact) => exact == key,
        }
    }
}

impl FromStr for TriggerKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase().replace('_', "-");
        let key = match name.as_str() {
            "shift" => Self::Shift,
            "ctrl" | "control" => Self::Ctrl,
            "alt" => Self::Alt,
            "space" => Self::Space,
            "capslock" | "caps-lock" => Self::CapsLock,
            "left-shift" | "lshift" => Self::Exact(PhysicalKey::LeftShift),
            "right-shift" | "rshift" => Self::Exact(PhysicalKey::RightShift),
            "left-ctrl" | "left-control" | "lctrl" => Self::Exact(PhysicalKey::LeftCtrl),
            "right-ctrl" | "right-control" | "rctrl" => Self::Exact(PhysicalKey::RightCtrl),
            "left-alt" | "lalt" => Self::Exact(PhysicalKey::LeftAlt),
            "right-alt" | "ralt" | "altgr" => Self::Exact(PhysicalKey::RightAlt),
            _ => return Err(Error::Config(format!("unknown push-to-talk key: {s}"))),
        };
        Ok(key)
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shift => f.write_str("shift"),
            Self::Ctrl => f.write_str("ctrl"),
            Self::Alt => f.write_str("alt"),
            Self::Space => f.write_str("space"),
            Self::CapsLock => f.write_str("capslock"),
            Self::Exact(key) => write!(f, "{key:?}"),
        }
    }
}

/// A keyboard transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Pressed { key: PhysicalKey, at: Instant },
    Released { key: PhysicalKey, at: Instant },
    /// Ctrl+C seen on the keyboard
    Interrupt,
}

/// Start reader threads for every keyboard that has `trigger`
///
/// # Errors
///
/// Returns `Error::Keyboard` if no device can be read
pub fn listen(trigger: TriggerKey) -> Result<mpsc::Receiver<KeyEvent>> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    spawn_readers(trigger, &tx)?;
    Ok(rx)
}

#[cfg(target_os = "linux")]
fn spawn_readers(trigger: TriggerKey, tx: &mpsc::Sender<KeyEvent>) -> Result<()> {
    use evdev::Key;

    let candidates: Vec<Key> = match trigger {
        TriggerKey::Shift => vec![Key::KEY_LEFTSHIFT, Key::KEY_RIGHTSHIFT],
        TriggerKey::Ctrl => vec![Key::KEY_LEFTCTRL, Key::KEY_RIGHTCTRL],
        TriggerKey::Alt => vec![Key::KEY_LEFTALT, Key::KEY_RIGHTALT],
        TriggerKey::Space => vec![Key::KEY_SPACE],
        TriggerKey::CapsLock => vec![Key::KEY_CAPSLOCK],
        TriggerKey::Exact(key) => evdev_code(key).into_iter().collect(),
    };

    let mut spawned = 0;
    for (path, device) in evdev::enumerate() {
        let has_trigger = device
            .supported_keys()
            .is_some_and(|keys| candidates.iter().any(|k| keys.contains(*k)));
        if !has_trigger {
            continue;
        }

        let name = device.name().unwrap_or("unnamed").to_string();
        let tx = tx.clone();
        std::thread::Builder::new()
            .name(format!("keyboard-{spawned}"))
            .spawn(move || read_device(device, &tx))?;

        tracing::debug!(path = %path.display(), device = %name, "listening for push-to-talk key");
        spawned += 1;
    }

    if spawned == 0 {
        return Err(Error::Keyboard(
            "no readable keyboard device; is the user in the input group?".to_string(),
        ));
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn read_device(mut device: evdev::Device, tx: &mpsc::Sender<KeyEvent>) {
    let mut decoder = KeyDecoder::default();
    loop {
        let events = match device.fetch_events() {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "keyboard device read failed, reader stopping");
                return;
            }
        };

        for event in events {
            if event.event_type() != evdev::EventType::KEY {
                continue;
            }
            // Stamped with the kernel time so backlog from a full channel reads as stale
            let at = instant_from_system(event.timestamp());
            let Some(out) = decoder.decode(event.code(), event.value(), at) else {
                continue;
            };

            if tx.blocking_send(out).is_err() {
                return;
            }
        }
    }
}

/// Map a wall-clock event stamp onto the monotonic clock
#[cfg(target_os = "linux")]
fn instant_from_system(stamp: std::time::SystemTime) -> Instant {
    let age = std::time::SystemTime::now()
        .duration_since(stamp)
        .unwrap_or_default();
    let now = Instant::now();
    now.checked_sub(age).unwrap_or(now)
}

const KEY_RELEASE: i32 = 0;
const KEY_PRESS: i32 = 1;
const KEY_C: u16 = 46;

/// Turns raw key transitions into [`KeyEvent`]s
///
/// Each Ctrl side is tracked on its own, so releasing one while the other is
/// held still lets Ctrl+C through.
#[derive(Debug, Default)]
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
struct KeyDecoder {
    left_ctrl: bool,
    right_ctrl: bool,
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
impl KeyDecoder {
    fn decode(&mut self, code: u16, value: i32, at: Instant) -> Option<KeyEvent> {
        // Auto-repeat
        if value != KEY_PRESS && value != KEY_RELEASE {
            return None;
        }
        let down = value == KEY_PRESS;

        let key = physical_key(code);
        match key {
            PhysicalKey::LeftCtrl => self.left_ctrl = down,
            PhysicalKey::RightCtrl => self.right_ctrl = down,
            _ => {}
        }

        Some(if down && code == KEY_C && (self.left_ctrl || self.right_ctrl) {
            KeyEvent::Interrupt
        } else if down {
            KeyEvent::Pressed { key, at }
        } else {
            KeyEvent::Released { key, at }
        })
    }
}

#[cfg(target_os = "linux")]
const fn evdev_code(key: PhysicalKey) -> Option<evdev::Key> {
    use evdev::Key;

    Some(match key {
        PhysicalKey::LeftShift => Key::KEY_LEFTSHIFT,
        PhysicalKey::RightShift => Key::KEY_RIGHTSHIFT,
        PhysicalKey::LeftCtrl => Key::KEY_LEFTCTRL,
        PhysicalKey::RightCtrl => Key::KEY_RIGHTCTRL,
        PhysicalKey::LeftAlt => Key::KEY_LEFTALT,
        PhysicalKey::RightAlt => Key::KEY_RIGHTALT,
        PhysicalKey::Space => Key::KEY_SPACE,
        PhysicalKey::CapsLock => Key::KEY_CAPSLOCK,
        PhysicalKey::Other(_) => return None,
    })
}

#[cfg(not(target_os = "linux"))]
fn spawn_readers(_trigger: TriggerKey, _tx: &mpsc::Sender<KeyEvent>) -> Result<()> {
    Err(Error::Keyboard(
        "global key events are only supported on Linux".to_string(),
    ))
}

/// Map a Linux input scan code to a key
#[must_use]
pub const fn physical_key(code: u16) -> PhysicalKey {
    match code {
        42 => PhysicalKey::LeftShift,
        54 => PhysicalKey::RightShift,
        29 => PhysicalKey::LeftCtrl,
        97 => PhysicalKey::RightCtrl,
        56 => PhysicalKey::LeftAlt,
        100 => PhysicalKey::RightAlt,
        57 => PhysicalKey::Space,
        58 => PhysicalKey::CapsLock,
        other => PhysicalKey::Other(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_modifier_matches_both_sides() {
        let shift: TriggerKey = "Shift".parse().unwrap();
        assert!(shift.matches(PhysicalKey::LeftShift));
        assert!(shift.matches(PhysicalKey::RightShift));
        assert!(!shift.matches(PhysicalKey::LeftCtrl));
    }

    #[test]
    fn sided_names_match_one_key() {
        let right: TriggerKey = "right_ctrl".parse().unwrap();
        assert!(right.matches(PhysicalKey::RightCtrl));
        assert!(!right.matches(PhysicalKey::LeftCtrl));
    }

    #[test]
    fn unknown_key_is_config_error() {
        assert!(matches!("hyper".parse::<TriggerKey>(), Err(Error::Config(_))));
    }

    #[test]
    fn ctrl_c_is_an_interrupt() {
        let mut decoder = KeyDecoder::default();
        let at = Instant::now();

        assert!(matches!(
            decoder.decode(KEY_C, KEY_PRESS, at),
            Some(KeyEvent::Pressed { .. })
        ));
        decoder.decode(29, KEY_PRESS, at);
        assert_eq!(decoder.decode(KEY_C, KEY_PRESS, at), Some(KeyEvent::Interrupt));
        // Auto-repeat is dropped
        assert_eq!(decoder.decode(KEY_C, 2, at), None);
    }

    #[test]
    fn releasing_one_ctrl_keeps_the_other_held() {
        let mut decoder = KeyDecoder::default();
        let at = Instant::now();

        decoder.decode(29, KEY_PRESS, at);
        decoder.decode(97, KEY_PRESS, at);
        decoder.decode(97, KEY_RELEASE, at);
        assert_eq!(decoder.decode(KEY_C, KEY_PRESS, at), Some(KeyEvent::Interrupt));

        decoder.decode(29, KEY_RELEASE, at);
        assert_eq!(
            decoder.decode(KEY_C, KEY_PRESS, at),
            Some(KeyEvent::Pressed {
                key: PhysicalKey::Other(KEY_C),
                at
            })
        );
    }

    #[test]
    fn scan_codes_map() {
        assert_eq!(physical_key(42), PhysicalKey::LeftShift);
        assert_eq!(physical_key(58), PhysicalKey::CapsLock);
        assert_eq!(physical_key(30), PhysicalKey::Other(30));
    }
}
