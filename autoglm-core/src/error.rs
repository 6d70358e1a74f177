use thiserror::Error;

use crate::validation::ValidationError;

/// Which transport operation failed.
///
/// Each variant has its own stable code so HTTP clients can branch on it
/// without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    TcpipEnable,
    IpDiscovery,
    Connect,
    /// Connect issued by the manual (USB-less) flow
    ManualConnect,
    Disconnect,
    /// Pairing rejected by the device because of a wrong code
    InvalidPairingCode,
    ConnectionRefused,
    Pair,
    /// Pairing succeeded but the follow-up connect did not
    PairedNotConnected,
    /// Screen capture failed or returned something other than a PNG
    Screenshot,
}

impl TransportFailure {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::TcpipEnable => "tcpip",
            Self::IpDiscovery => "ip",
            Self::Connect => "connect",
            Self::ManualConnect => "connect_failed",
            Self::Disconnect => "disconnect_failed",
            Self::InvalidPairingCode => "invalid_pairing_code",
            Self::ConnectionRefused => "connection_refused",
            Self::Pair => "pair_failed",
            Self::PairedNotConnected => "paired_not_connected",
            Self::Screenshot => "screenshot_failed",
        }
    }
}

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("{message}")]
    Transport {
        failure: TransportFailure,
        message: String,
    },

    /// The adb executable could not be run at all (missing binary, timeout)
    #[error("ADB error: {0}")]
    Adb(String),
}

impl Error {
    pub fn transport(failure: TransportFailure, message: impl Into<String>) -> Self {
        Self::Transport {
            failure,
            message: message.into(),
        }
    }

    /// Stable machine-readable code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(e) => e.code(),
            Self::DeviceNotFound(_) => "device_not_found",
            Self::Transport { failure, .. } => failure.code(),
            Self::Adb(_) => "adb_unavailable",
        }
    }

    /// Human-readable message without the kind prefix
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput(e) => e.to_string(),
            Self::DeviceNotFound(msg) | Self::Adb(msg) => msg.clone(),
            Self::Transport { message, .. } => message.clone(),
        }
    }

    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Adb(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_codes_are_distinct() {
        let all = [
            TransportFailure::TcpipEnable,
            TransportFailure::IpDiscovery,
            TransportFailure::Connect,
            TransportFailure::ManualConnect,
            TransportFailure::Disconnect,
            TransportFailure::InvalidPairingCode,
            TransportFailure::ConnectionRefused,
            TransportFailure::Pair,
            TransportFailure::PairedNotConnected,
            TransportFailure::Screenshot,
        ];
        let codes: std::collections::HashSet<_> = all.iter().map(|f| f.code()).collect();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn test_error_code_and_message() {
        let err = Error::transport(TransportFailure::Pair, "Pairing failed: boom");
        assert_eq!(err.code(), "pair_failed");
        assert_eq!(err.message(), "Pairing failed: boom");
        assert_eq!(err.to_string(), "Pairing failed: boom");

        let err = Error::from(ValidationError::PairingCode);
        assert!(err.is_invalid_input());
        assert_eq!(err.code(), "invalid_pairing_code");
    }
}
