//! Error types for topology construction and scenario resolution.

use thiserror::Error;

/// Errors that can occur while building the topology or scenarios.
#[derive(Debug, Error)]
pub enum Error {
    /// A call referenced a service that does not exist.
    #[error("operation '{from}': call target '{target}' names an unknown service")]
    UnknownService {
        /// Operation owning the call.
        from: String,
        /// The unresolved target reference.
        target: String,
    },

    /// A call referenced an operation that does not exist on its service.
    #[error("operation '{from}': call target '{target}' names an unknown operation")]
    UnknownOperation {
        /// Operation owning the call.
        from: String,
        /// The unresolved target reference.
        target: String,
    },

    /// A call target was not a `service.operation` reference.
    #[error("operation '{from}': call target '{target}' is not a 'service.operation' reference")]
    MalformedRef {
        /// Operation owning the call.
        from: String,
        /// The malformed target reference.
        target: String,
    },

    /// A call carried an invalid modifier.
    #[error("operation '{from}': {reason}")]
    InvalidCall {
        /// Operation owning the call.
        from: String,
        /// Reason for the failure.
        reason: String,
    },

    /// The call graph contains a cycle.
    #[error("topology contains a cycle through operation '{op_ref}'")]
    Cycle {
        /// One operation on the detected cycle.
        op_ref: String,
    },

    /// A scenario referenced an operation missing from the topology.
    #[error("scenario '{scenario}': override references unknown operation '{op_ref}'")]
    UnknownScenarioRef {
        /// Scenario name.
        scenario: String,
        /// The unresolved operation reference.
        op_ref: String,
    },

    /// A field on an operation failed to parse into its model type.
    #[error("operation '{op_ref}': {source}")]
    Operation {
        /// The operation the field belongs to.
        op_ref: String,
        /// Underlying model error.
        #[source]
        source: tracefab_model::Error,
    },

    /// A traffic pattern failed to build.
    #[error("traffic: {0}")]
    Traffic(String),

    /// A scenario field failed to parse.
    #[error("scenario '{scenario}': {reason}")]
    Scenario {
        /// Scenario name.
        scenario: String,
        /// Reason for the failure.
        reason: String,
    },
}

/// Result type alias for topology operations.
pub type Result<T> = std::result::Result<T, Error>;
