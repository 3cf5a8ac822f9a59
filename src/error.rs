//! Error types for the bridge.
//!
//! `BridgeError` is the single error type shared by the marshaller, the
//! callback registry, the class binder and the runtimes. It separates two
//! kinds of failure:
//!
//! - **Structural failures** (`TableExhausted`, `ClassDefinitionFailed`) abort a
//!   binding session and are returned to the host as a failed initialization.
//! - **In-band failures** (`ArgumentTypeMismatch`) never leave a native
//!   callback; the callback writes `false` into the return slot instead.
//!
//! Releasing an entry against a module instance that has already been torn
//! down is not an error at all: the registry reports it as
//! [`ReleaseOutcome::Stale`](crate::registry::ReleaseOutcome::Stale) and logs it.

use thiserror::Error;

use crate::config::ConfigError;
use crate::runtime::{ClassHandle, EntryHandle, ModuleId};

/// Convenience alias for results using the bridge error type.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Failures raised anywhere between the host and the runtime.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A positional argument was missing or not a number.
    #[error("Argument {index} is not numeric (found {found})")]
    ArgumentTypeMismatch { index: usize, found: &'static str },

    /// A float argument with a fractional part where an integer is required.
    #[error("Argument {index} is not an integer (found {value})")]
    NonIntegralArgument { index: usize, value: f64 },

    /// No free slot in the runtime's function table.
    #[error("Function table exhausted ({capacity} slots in use)")]
    TableExhausted { capacity: usize },

    /// Signature string outside the `[vijfd][ijfd]*` grammar.
    #[error("Invalid function signature '{0}'")]
    InvalidSignature(String),

    /// The runtime returned a null class handle.
    #[error("Runtime rejected class definition for '{name}'")]
    ClassDefinitionFailed { name: String },

    /// The runtime refused to attach a method to a class.
    #[error("Runtime rejected method '{method}' on {class}")]
    MethodDefinitionFailed { class: ClassHandle, method: String },

    /// The entry was released before.
    #[error("Function table entry {entry} was already released")]
    DoubleRelease { entry: EntryHandle },

    /// The entry was installed by a different registry.
    #[error("Function table entry {entry} is not owned by this registry")]
    UnknownEntry { entry: EntryHandle },

    /// Release was attempted against a live module other than the entry's own.
    #[error("Function table entry {entry} belongs to {owner}, not {current}")]
    WrongModule {
        entry: EntryHandle,
        owner: ModuleId,
        current: ModuleId,
    },

    /// The binder refused a released or foreign entry.
    #[error("Function table entry {entry} is not live and cannot be bound")]
    EntryNotLive { entry: EntryHandle },

    /// A bound method's slot was released or reused.
    #[error("Method '{method}' dispatched through released entry {entry}")]
    DanglingEntry { method: String, entry: EntryHandle },

    /// No method of that name on the class or its superclasses.
    #[error("Undefined method '{method}' for class {class}")]
    UndefinedMethod { class: ClassHandle, method: String },

    /// No class of that name.
    #[error("Undefined class '{0}'")]
    UndefinedClass(String),

    /// Opaque runtime failure, e.g. a script error.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// Whether this error aborts a binding session.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            BridgeError::TableExhausted { .. }
                | BridgeError::ClassDefinitionFailed { .. }
                | BridgeError::MethodDefinitionFailed { .. }
                | BridgeError::InvalidSignature(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::ArgumentTypeMismatch {
            index: 2,
            found: "string",
        };
        assert_eq!(err.to_string(), "Argument 2 is not numeric (found string)");

        let err = BridgeError::TableExhausted { capacity: 8 };
        assert!(err.to_string().contains("8 slots"));
    }

    #[test]
    fn test_structural_classification() {
        assert!(BridgeError::TableExhausted { capacity: 1 }.is_structural());
        assert!(BridgeError::ClassDefinitionFailed {
            name: "PIXELS".into()
        }
        .is_structural());
        assert!(BridgeError::MethodDefinitionFailed {
            class: ClassHandle::new(2),
            method: "set".into()
        }
        .is_structural());
        assert!(!BridgeError::DoubleRelease {
            entry: EntryHandle::new(3)
        }
        .is_structural());
        assert!(!BridgeError::ArgumentTypeMismatch {
            index: 1,
            found: "nil"
        }
        .is_structural());
    }
}
