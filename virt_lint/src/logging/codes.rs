//! Log codes for engine events
//!
//! Every error variant and every notable success maps onto one of these codes so
//! that structured output can be filtered without parsing messages.

// ============================================================================
// CODE WRAPPER TYPE
// ============================================================================

/// Code attached to every log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code(&'static str);

impl Code {
    pub const fn new(code: &'static str) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ERROR CODE CONSTANTS
// ============================================================================

/// System error codes
pub mod system {
    use super::Code;

    pub const IO_ERROR: Code = Code::new("ERR001");
    pub const CONFIGURATION_ERROR: Code = Code::new("ERR002");
}

/// XML input error codes
pub mod input {
    use super::Code;

    pub const MALFORMED_XML: Code = Code::new("E001");
}

/// Validator discovery error codes
pub mod discovery {
    use super::Code;

    pub const DISCOVERY_FAILED: Code = Code::new("E010");
    pub const MALFORMED_METADATA: Code = Code::new("E011");
    pub const DUPLICATE_VALIDATOR: Code = Code::new("E012");
}

/// Validation run error codes
pub mod validation {
    use super::Code;

    pub const CONNECTION_REQUIRED: Code = Code::new("E020");
    pub const VALIDATOR_FAILED: Code = Code::new("E021");
    pub const SESSION_CLOSED: Code = Code::new("E022");
    pub const CONNECTION_FAILED: Code = Code::new("E023");
}

/// Success codes
pub mod success {
    use super::Code;

    pub const SYSTEM_INITIALIZED: Code = Code::new("S001");
    pub const REGISTRY_BUILT: Code = Code::new("S010");
    pub const VALIDATION_COMPLETE: Code = Code::new("S020");
    pub const CAPABILITIES_LOADED: Code = Code::new("S030");
}

/// Short description for a code, used in detailed formatting
pub fn get_description(code: &str) -> &'static str {
    match code {
        "ERR001" => "I/O failure",
        "ERR002" => "Invalid configuration",
        "E001" => "Malformed XML document",
        "E010" => "Validator search location could not be read",
        "E011" => "Validator metadata is malformed",
        "E012" => "Validator identifier registered twice",
        "E020" => "Validator requires a live connection",
        "E021" => "Validator execution failed",
        "E022" => "Session already released",
        "E023" => "Connection failure",
        "S001" => "Logging initialized",
        "S010" => "Validator registry built",
        "S020" => "Validation completed",
        "S030" => "Capabilities loaded",
        _ => "Unknown code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_display() {
        assert_eq!(validation::CONNECTION_REQUIRED.to_string(), "E020");
        assert_eq!(success::VALIDATION_COMPLETE.as_str(), "S020");
    }

    #[test]
    fn test_every_code_is_described() {
        let all = [
            system::IO_ERROR,
            system::CONFIGURATION_ERROR,
            input::MALFORMED_XML,
            discovery::DISCOVERY_FAILED,
            discovery::MALFORMED_METADATA,
            discovery::DUPLICATE_VALIDATOR,
            validation::CONNECTION_REQUIRED,
            validation::VALIDATOR_FAILED,
            validation::SESSION_CLOSED,
            validation::CONNECTION_FAILED,
            success::SYSTEM_INITIALIZED,
            success::REGISTRY_BUILT,
            success::VALIDATION_COMPLETE,
            success::CAPABILITIES_LOADED,
        ];

        for code in all {
            assert_ne!(get_description(code.as_str()), "Unknown code", "{code}");
        }
    }
}
