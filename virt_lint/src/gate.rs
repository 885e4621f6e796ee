//! Connection-requirement gate

use crate::errors::VirtLintError;
use crate::registry::Validator;

/// What to do with one candidate validator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Run,
    /// Best-effort mode, no connection
    Skip,
    /// Strict mode, no connection
    Abort,
}

impl Admission {
    pub fn as_str(self) -> &'static str {
        match self {
            Admission::Run => "run",
            Admission::Skip => "skip",
            Admission::Abort => "abort",
        }
    }
}

pub fn admit(validator: &Validator, connection_available: bool, strict: bool) -> Admission {
    if !validator.requires_connection() || connection_available {
        Admission::Run
    } else if strict {
        Admission::Abort
    } else {
        Admission::Skip
    }
}

/// Error reported for an [`Admission::Abort`]
pub fn abort_error(validator: &Validator) -> VirtLintError {
    VirtLintError::ConnectionRequired {
        validator: validator.id().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::builtin::builtin_validators;

    #[test]
    fn test_admission_matrix() {
        let builtins = builtin_validators();
        let offline_ok = &builtins[0];
        let needs_conn = &builtins[1];

        for strict in [false, true] {
            for online in [false, true] {
                assert_eq!(admit(offline_ok, online, strict), Admission::Run);
            }
            assert_eq!(admit(needs_conn, true, strict), Admission::Run);
        }
        assert_eq!(admit(needs_conn, false, false), Admission::Skip);
        assert_eq!(admit(needs_conn, false, true), Admission::Abort);

        assert_eq!(admit(needs_conn, false, false).as_str(), "skip");
        assert_eq!(admit(needs_conn, false, true).as_str(), "abort");
    }

    #[test]
    fn test_abort_error_names_validator() {
        let builtins = builtin_validators();
        assert_eq!(
            abort_error(&builtins[1]).to_string(),
            "Validator 'builtin/check_numa_free' requires a connection"
        );
    }
}
