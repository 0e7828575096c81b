//! Delivery guarantee levels

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Rejected QoS value
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid QoS level {0}, expected 0, 1 or 2")]
pub struct InvalidQos(pub u8);

/// MQTT quality of service
///
/// Serialized as the bare integer used on the wire and in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QosLevel {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl Default for QosLevel {
    fn default() -> Self {
        Self::ExactlyOnce
    }
}

impl TryFrom<u8> for QosLevel {
    type Error = InvalidQos;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(InvalidQos(other)),
        }
    }
}

impl From<QosLevel> for u8 {
    fn from(qos: QosLevel) -> Self {
        qos as u8
    }
}

impl fmt::Display for QosLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_from_u8() {
        assert_eq!(QosLevel::try_from(0), Ok(QosLevel::AtMostOnce));
        assert_eq!(QosLevel::try_from(1), Ok(QosLevel::AtLeastOnce));
        assert_eq!(QosLevel::try_from(2), Ok(QosLevel::ExactlyOnce));
        assert_eq!(QosLevel::try_from(3), Err(InvalidQos(3)));
    }

    #[test]
    fn test_qos_default_is_exactly_once() {
        assert_eq!(QosLevel::default(), QosLevel::ExactlyOnce);
    }

    #[test]
    fn test_qos_serde_uses_integers() {
        assert_eq!(serde_json::to_string(&QosLevel::AtLeastOnce).unwrap(), "1");
        let parsed: QosLevel = serde_json::from_str("0").unwrap();
        assert_eq!(parsed, QosLevel::AtMostOnce);
        assert!(serde_json::from_str::<QosLevel>("7").is_err());
    }
}
