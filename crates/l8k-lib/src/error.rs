//! Error taxonomy for the launch workflow

use crate::config::{ClusterCapabilities, MergeConflict, Requirements};
use thiserror::Error;

/// Failures while pulling a structured profile out of LLM output
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// No assistant response has been received yet
    #[error("no response to extract profile from")]
    EmptyResponse,

    /// The response contains no balanced `{...}` substring
    #[error("no valid JSON found in response")]
    NoJson,

    #[error("failed to parse profile JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("profile JSON must be an object")]
    NotAnObject,
}

/// Errors surfaced by the launch workflow and its components
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Missing or invalid paths, or an invalid flag combination
    #[error("{0}")]
    Configuration(String),

    /// No catalog entry matched the requirements and capabilities
    #[error("no applicable profile found for provider {provider}")]
    NoApplicableProfile {
        provider: String,
        requirements: Box<Requirements>,
        capabilities: Box<ClusterCapabilities>,
    },

    /// The model declined to commit to a recommendation
    #[error(
        "couldn't select a deployment profile based on the user prompt. Try again with a \
         different prompt or use the cli flags (--fabric, --deployment-type, --multirail) \
         to select the profile manually. Reason: {reasoning}"
    )]
    LowConfidence { reasoning: String },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// A capability provider failed during discovery, generation or deployment
    #[error("provider {provider} failed: {cause:#}")]
    Provider { provider: String, cause: anyhow::Error },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// Two providers contributed different values for the same field
    #[error(transparent)]
    Conflict(#[from] MergeConflict),

    /// The LLM collaborator could not produce a response
    #[error("LLM request failed: {0:#}")]
    Llm(anyhow::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl LaunchError {
    pub fn configuration(message: impl Into<String>) -> Self {
        LaunchError::Configuration(message.into())
    }

    /// Wrap a provider failure, keeping cancellation distinguishable
    pub fn provider(provider: impl Into<String>, cause: anyhow::Error) -> Self {
        if let Some(LaunchError::Cancelled) = cause.downcast_ref::<LaunchError>() {
            return LaunchError::Cancelled;
        }
        LaunchError::Provider {
            provider: provider.into(),
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_keeps_cancellation() {
        let err = LaunchError::provider("network-operator", anyhow::Error::new(LaunchError::Cancelled));
        assert!(matches!(err, LaunchError::Cancelled));
    }

    #[test]
    fn test_provider_error_message_includes_cause_chain() {
        let cause = anyhow::anyhow!("connection refused").context("Failed to list nodes");
        let err = LaunchError::provider("network-operator", cause);
        let message = err.to_string();
        assert!(message.contains("network-operator"));
        assert!(message.contains("Failed to list nodes"));
        assert!(message.contains("connection refused"));
    }

    #[test]
    fn test_low_confidence_message_carries_reasoning() {
        let err = LaunchError::LowConfidence {
            reasoning: "fabric unclear".to_string(),
        };
        assert!(err.to_string().contains("Reason: fabric unclear"));
    }
}
