use crate::compat::*;

/// Main error type for wengert.
///
/// Allocation failure is not represented here: a tape that cannot obtain
/// an aligned block cannot uphold its invariants, so that path aborts via
/// `alloc::alloc::handle_alloc_error` instead of returning.
#[derive(Clone, PartialEq, Eq)]
pub enum WengertError {
    // ===== Configuration Errors =====
    /// The configured minimum segment size is unusable.
    InvalidMinimumSegmentSize(usize),

    // ===== Replay Errors =====
    /// A full replay did not consume exactly the declared number of
    /// activation slots.
    ActivationCursorMismatch { declared: usize, remaining: usize },
}

impl fmt::Display for WengertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Configuration Errors
            Self::InvalidMinimumSegmentSize(size) => {
                write!(f, "invalid minimum segment size: {}", size)
            },

            // Replay Errors
            Self::ActivationCursorMismatch { declared, remaining } => {
                write!(
                    f,
                    "activation cursor mismatch: {} slots declared, {} left unconsumed after replay",
                    declared, remaining
                )
            },
        }
    }
}

impl fmt::Debug for WengertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for WengertError {}

/// Result type alias for wengert operations.
pub type WengertResult<T> = Result<T, WengertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WengertError::InvalidMinimumSegmentSize(0);
        assert_eq!(err.to_string(), "invalid minimum segment size: 0");

        let err = WengertError::ActivationCursorMismatch {
            declared: 12,
            remaining: 3,
        };
        assert_eq!(
            err.to_string(),
            "activation cursor mismatch: 12 slots declared, 3 left unconsumed after replay"
        );
    }

    #[test]
    fn test_debug_matches_display() {
        let err = WengertError::InvalidMinimumSegmentSize(7);
        assert_eq!(format!("{:?}", err), err.to_string());
    }
}
