/*
[INPUT]:  Session, PIN and activity domain definitions
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - type definitions shared by every component
[UPDATE]: When new event kinds or states are added
*/

use std::fmt;

use serde::{Deserialize, Serialize};

/// Events emitted by the token manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionEvent {
    TokenExpired,
    LoginRequired,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::TokenExpired => f.write_str("tokenExpired"),
            SessionEvent::LoginRequired => f.write_str("loginRequired"),
        }
    }
}

/// In-memory lock toggle of a configured PIN. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    Unlocked,
    Locked,
}

/// Where the PIN controller currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinStatus {
    NotConfigured,
    Configured(LockState),
}

impl PinStatus {
    pub fn is_locked(&self) -> bool {
        matches!(self, PinStatus::Configured(LockState::Locked))
    }
}

/// Supported PIN lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PinLength {
    Four,
    Six,
}

impl PinLength {
    pub fn digits(self) -> usize {
        match self {
            PinLength::Four => 4,
            PinLength::Six => 6,
        }
    }

    /// Derive the length from an entered PIN, if it is one we accept.
    pub fn of(pin: &str) -> Option<Self> {
        match pin.len() {
            4 => Some(PinLength::Four),
            6 => Some(PinLength::Six),
            _ => None,
        }
    }
}

impl TryFrom<u8> for PinLength {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(PinLength::Four),
            6 => Ok(PinLength::Six),
            other => Err(format!("unsupported PIN length {other}")),
        }
    }
}

impl From<PinLength> for u8 {
    fn from(value: PinLength) -> Self {
        value.digits() as u8
    }
}

/// Source of an activity sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Touch,
    Gesture,
    Navigation,
    ApiCall,
    Keyboard,
    Background,
    Foreground,
}

impl ActivityKind {
    /// Whether this sample comes from the OS lifecycle rather than the user or network.
    pub fn is_lifecycle(self) -> bool {
        matches!(self, ActivityKind::Background | ActivityKind::Foreground)
    }
}

/// Foreground/background position of the host app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Foreground,
    Background,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_length_of() {
        assert_eq!(PinLength::of("1234"), Some(PinLength::Four));
        assert_eq!(PinLength::of("123456"), Some(PinLength::Six));
        assert_eq!(PinLength::of("12345"), None);
        assert_eq!(PinLength::of(""), None);
    }

    #[test]
    fn test_pin_length_serde() {
        let json = serde_json::to_string(&PinLength::Six).unwrap();
        assert_eq!(json, "6");
        assert!(serde_json::from_str::<PinLength>("5").is_err());
    }

    #[test]
    fn test_session_event_display() {
        assert_eq!(SessionEvent::TokenExpired.to_string(), "tokenExpired");
        assert_eq!(SessionEvent::LoginRequired.to_string(), "loginRequired");
    }
}
