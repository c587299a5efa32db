use alloc::boxed::Box;
use alloc::string::String;

/// Error raised by a host [`crate::DocumentQuery`] for a selector it cannot parse.
///
/// The core never surfaces this to callers: a bad selector is logged and matches nothing.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("invalid selector `{selector}`: {reason}")]
    Invalid { selector: String, reason: String },
}

impl SelectorError {
    pub fn invalid(selector: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            selector: selector.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by a user callback. Logged at the call site, never propagated.
pub type CallbackError = Box<dyn core::error::Error>;

/// Return type of every user callback.
pub type CallbackResult = Result<(), CallbackError>;
