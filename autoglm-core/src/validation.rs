//! Transport input validation
//!
//! Pure syntax checks for IP addresses, ports and wireless-debugging pairing
//! codes. Everything here runs before any adb command is issued.

use std::sync::LazyLock;

use regex::Regex;

/// Length of an Android wireless-debugging pairing code
pub const PAIRING_CODE_LEN: usize = 6;

/// Lowest / highest accepted TCP port
pub const PORT_MIN: i64 = 1;
pub const PORT_MAX: i64 = 65535;

/// Pre-compiled dotted-quad pattern
static IPV4_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[0-9]{1,3}\.){3}[0-9]{1,3}$")
        .expect("IPv4 regex is a compile-time constant and always valid")
});

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid IP address format")]
    Ip(String),

    #[error("{field} must be between 1 and 65535")]
    Port { field: &'static str, value: i64 },

    #[error("Pairing code must be 6 digits")]
    PairingCode,
}

impl ValidationError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Ip(_) => "invalid_ip",
            Self::Port { .. } => "invalid_port",
            Self::PairingCode => "invalid_pairing_code",
        }
    }
}

/// Validation result
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Dotted-quad IPv4 check: four groups of 1-3 digits, each at most 255.
pub fn validate_ip(ip: &str) -> ValidationResult<()> {
    if !IPV4_PATTERN.is_match(ip) {
        return Err(ValidationError::Ip(ip.to_string()));
    }
    // The pattern admits 999.1.1.1; octet range is checked separately.
    if ip.split('.').any(|octet| octet.parse::<u16>().map_or(true, |v| v > 255)) {
        return Err(ValidationError::Ip(ip.to_string()));
    }
    Ok(())
}

/// Port range check. Takes a wide integer so out-of-range request values
/// reach here instead of failing deserialization.
pub fn validate_port(field: &'static str, port: i64) -> ValidationResult<u16> {
    if !(PORT_MIN..=PORT_MAX).contains(&port) {
        return Err(ValidationError::Port { field, value: port });
    }
    u16::try_from(port).map_err(|_| ValidationError::Port { field, value: port })
}

/// Exactly six ASCII digits.
pub fn validate_pairing_code(code: &str) -> ValidationResult<()> {
    if code.len() != PAIRING_CODE_LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::PairingCode);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ip() {
        assert!(validate_ip("192.168.1.100").is_ok());
        assert!(validate_ip("0.0.0.0").is_ok());
        assert!(validate_ip("255.255.255.255").is_ok());

        assert_eq!(
            validate_ip("999.1.1.1"),
            Err(ValidationError::Ip("999.1.1.1".to_string()))
        );
        assert!(validate_ip("256.1.1.1").is_err());
        assert!(validate_ip("192.168.1").is_err());
        assert!(validate_ip("192.168.1.1.1").is_err());
        assert!(validate_ip("example.com").is_err());
        assert!(validate_ip("192.168.1.1 ").is_err());
        assert!(validate_ip("").is_err());
        // Non-ASCII digits must not slip through
        assert!(validate_ip("١٩٢.168.1.1").is_err());
    }

    #[test]
    fn test_validate_port() {
        assert_eq!(validate_port("port", 5555), Ok(5555));
        assert_eq!(validate_port("port", 1), Ok(1));
        assert_eq!(validate_port("port", 65535), Ok(65535));

        let err = validate_port("Pairing port", 0).unwrap_err();
        assert_eq!(err.code(), "invalid_port");
        assert_eq!(err.to_string(), "Pairing port must be between 1 and 65535");
        assert!(validate_port("port", 65536).is_err());
        assert!(validate_port("port", -1).is_err());
    }

    #[test]
    fn test_validate_pairing_code() {
        assert!(validate_pairing_code("197872").is_ok());
        assert!(validate_pairing_code("000000").is_ok());

        assert_eq!(validate_pairing_code("19787"), Err(ValidationError::PairingCode));
        assert!(validate_pairing_code("1978722").is_err());
        assert!(validate_pairing_code("19787a").is_err());
        assert!(validate_pairing_code("").is_err());
        assert!(validate_pairing_code("１２３４５６").is_err());
    }
}
