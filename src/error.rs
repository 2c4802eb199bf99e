//! Error type for the validating entry points and configuration.

/// Errors reported by the generic entry points and the configuration layer.
///
/// The fast paths never return errors; their preconditions are debug assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShadowError {
    /// An address or range end is not a multiple of the shadow granularity.
    Misaligned {
        /// The offending address.
        addr: usize,
        /// Granularity the address had to be aligned to.
        granularity: usize,
    },
    /// The range is not covered by the shadow window.
    OutOfRange {
        /// Start of the requested range.
        addr: usize,
        /// Length of the requested range.
        size: usize,
    },
    /// The poison value is reserved for addressable markers by the fill strategy.
    ReservedValue {
        /// The rejected poison value.
        value: u8,
    },
    /// The configuration failed validation.
    InvalidConfig(&'static str),
    /// An options string carried a value that could not be parsed.
    InvalidOption {
        /// Option name.
        key: String,
        /// Raw value as written.
        value: String,
    },
}

impl std::fmt::Display for ShadowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShadowError::Misaligned { addr, granularity } => {
                write!(f, "address {:#x} is not aligned to {} bytes", addr, granularity)
            }
            ShadowError::OutOfRange { addr, size } => {
                write!(f, "range {:#x}+{} is outside the shadow window", addr, size)
            }
            ShadowError::ReservedValue { value } => {
                write!(f, "poison value {:#04x} is reserved for unpoison markers", value)
            }
            ShadowError::InvalidConfig(reason) => write!(f, "invalid shadow config: {}", reason),
            ShadowError::InvalidOption { key, value } => {
                write!(f, "invalid value {:?} for option {}", value, key)
            }
        }
    }
}

impl std::error::Error for ShadowError {}
