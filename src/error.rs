use thiserror::Error;

/// Status code reported for failures that originate inside the manager rather than the provider.
pub const INTERNAL_ERROR_CODE: i32 = 500;

/// Names the component that received an unparseable key body.
pub const KEY_PARSE_CONTEXT: &str = "KeyProvider callback";

/// key: ephemeral-key-parse-error
/// Raised when the raw body handed back by a provider is not a usable key.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{context} was passed a value that could not be parsed: [{reason}]. The raw body from the credential source should be passed.")]
pub struct KeyParseError {
    context: &'static str,
    reason: String,
}

impl KeyParseError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            context: KEY_PARSE_CONTEXT,
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// key: ephemeral-key-provider-error
/// Failure reported by a [`KeyProvider`](crate::KeyProvider) fetch.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("key provider error {code}: {message}")]
pub struct ProviderError {
    pub code: i32,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR_CODE, message)
    }
}

impl From<KeyParseError> for ProviderError {
    fn from(err: KeyParseError) -> Self {
        ProviderError::internal(err.to_string())
    }
}

pub type ProviderResult = Result<String, ProviderError>;
