//! Errors surfaced by the message handler.

use thiserror::Error;

use crate::domain::{ChainResult, ErrorClass};

use super::decoder::DecodeError;

/// Failure to process one message
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Config store is not enabled")]
    ConfigUnavailable,

    #[error("Message carries no connection id")]
    MissingConnectionId,

    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Unknown function '{function_id}' in chain of connection {connection_id}")]
    UnknownFunction {
        connection_id: String,
        function_id: String,
    },

    /// A chain step failed. The result, connection id included, travels
    /// with the error.
    #[error("Function '{function_id}' failed ({class}): {message}")]
    Chain {
        class: ErrorClass,
        function_id: String,
        message: String,
        result: Box<ChainResult>,
    },
}

impl HandlerError {
    /// Whether redelivering the same message could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Chain {
                class: ErrorClass::Retryable,
                ..
            }
        )
    }

    /// Chain result attached to a chain failure
    pub fn chain_result(&self) -> Option<&ChainResult> {
        match self {
            Self::Chain { result, .. } => Some(result),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        let retryable = HandlerError::Chain {
            class: ErrorClass::Retryable,
            function_id: "builtin.destination.webhook".into(),
            message: "503".into(),
            result: Box::default(),
        };
        assert!(retryable.is_retryable());
        assert!(retryable.chain_result().is_some());

        assert!(!HandlerError::UnknownConnection("c".into()).is_retryable());
        assert!(!HandlerError::ConfigUnavailable.is_retryable());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            HandlerError::UnknownConnection("conn-9".into()).to_string(),
            "Unknown connection: conn-9"
        );
        assert_eq!(
            HandlerError::ConfigUnavailable.to_string(),
            "Config store is not enabled"
        );
    }
}
