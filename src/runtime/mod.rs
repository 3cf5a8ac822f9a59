//! The embedded scripting runtime, as seen from the bridge.
//!
//! The runtime is an external collaborator. The bridge only drives it through
//! the [`RuntimeModule`] trait, which mirrors the handful of entry points a
//! foreign runtime module exports: class reflection, method definition, and
//! install/remove on its shared function table.
//!
//! # Architecture
//!
//! ```text
//! RuntimeModule trait
//!     ├── MockRuntime   (in-memory tables, direct dispatch, used by tests)
//!     └── RhaiRuntime   (rhai engine, classes exposed as script constants)
//!
//! Shared pieces
//!     ├── FunctionTable (slots of NativeFn, generation-checked)
//!     └── ClassTable    (classes and their method bindings)
//! ```
//!
//! Native functions receive an [`ArgumentVector`]. Slot 0 holds the receiver
//! and doubles as the return slot; slots `1..=argc` hold positional arguments.
//! Only the [`marshal`](crate::marshal) module reads or writes those slots.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{BridgeError, BridgeResult};

pub mod mock;
pub mod rhai_runtime;
mod table;

pub use mock::MockRuntime;
pub use rhai_runtime::{RhaiRuntime, ScriptOutcome};
pub use table::{ClassTable, FunctionTable, MethodBinding};

// =============================================================================
// Handles
// =============================================================================

/// Identity of one runtime module instance.
///
/// A runtime that is reset or replaced reports a fresh `ModuleId`, which is
/// how the registry recognises entries that belong to a torn-down module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModuleId(u64);

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

impl ModuleId {
    /// Allocate a process-unique module id.
    pub fn next() -> Self {
        Self(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id, for logging.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// Index of one slot in a runtime's function table.
///
/// Index 0 is never handed out, matching runtimes where a zero function
/// pointer means "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntryHandle(u32);

impl EntryHandle {
    /// Handle for table slot `index`.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Table slot index.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

/// Runtime-side class pointer. `ClassHandle::NULL` signals failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClassHandle(u32);

impl ClassHandle {
    /// Returned when a class cannot be defined.
    pub const NULL: ClassHandle = ClassHandle(0);

    /// Wrap a raw runtime class id.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Whether this is [`ClassHandle::NULL`].
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Raw runtime class id.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

// =============================================================================
// Values and argument vectors
// =============================================================================

/// Tagged runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value.
    Nil,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Double-precision float.
    Float(f64),
    /// Owned string.
    String(String),
    /// A class object, e.g. the receiver of `PIXELS.set(...)`.
    Object(ClassHandle),
    /// A runtime value the bridge has no representation for.
    Opaque(&'static str),
}

impl Value {
    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Opaque(name) => *name,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// Per-invocation argument storage handed to a native function.
///
/// Runtimes build one per call and read the return slot afterwards. Native
/// bodies go through [`crate::marshal`] for everything else.
#[derive(Debug, Clone)]
pub struct ArgumentVector {
    slots: Vec<Value>,
}

impl ArgumentVector {
    /// Build a vector for one call: `receiver` lands in slot 0.
    pub fn new(receiver: Value, args: Vec<Value>) -> Self {
        let mut slots = Vec::with_capacity(args.len() + 1);
        slots.push(receiver);
        slots.extend(args);
        Self { slots }
    }

    /// Number of positional arguments.
    pub fn argc(&self) -> usize {
        self.slots.len() - 1
    }

    /// Current contents of the return slot.
    pub fn return_value(&self) -> &Value {
        &self.slots[0]
    }

    /// Consume the vector, keeping only the return slot.
    pub fn into_return_value(mut self) -> Value {
        self.slots.swap_remove(0)
    }

    pub(crate) fn slot(&self, index: usize) -> Option<&Value> {
        self.slots.get(index)
    }

    pub(crate) fn set_return_slot(&mut self, value: Value) {
        self.slots[0] = value;
    }
}

// =============================================================================
// Native functions and signatures
// =============================================================================

/// A host function installed into a runtime's function table.
pub type NativeFn = Arc<dyn Fn(&mut ArgumentVector) + Send + Sync>;

/// Word-type signature of a table entry, e.g. `"viii"`.
///
/// The first character is the return type, the rest are parameters:
/// `v` void, `i` i32, `j` i64, `f` f32, `d` f64.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    /// Signature of a native method body: `void (vm*, value*, argc)`.
    pub const NATIVE_METHOD: &'static str = "viii";

    /// Parse a signature string, rejecting a missing return code or unknown
    /// type codes.
    pub fn parse(raw: &str) -> BridgeResult<Self> {
        let mut chars = raw.chars();
        let valid_ret = matches!(chars.next(), Some('v' | 'i' | 'j' | 'f' | 'd'));
        let valid_params = chars.all(|c| matches!(c, 'i' | 'j' | 'f' | 'd'));
        if valid_ret && valid_params {
            Ok(Self(raw.to_string()))
        } else {
            Err(BridgeError::InvalidSignature(raw.to_string()))
        }
    }

    /// Signature every native method is installed with.
    pub fn native_method() -> Self {
        Self(Self::NATIVE_METHOD.to_string())
    }

    /// The signature string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of parameter words.
    pub fn arity(&self) -> usize {
        self.0.len() - 1
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// RuntimeModule trait
// =============================================================================

/// Entry points of an embedded runtime module consumed by the bridge.
///
/// Only [`CallbackRegistry`](crate::registry::CallbackRegistry) may call
/// `install_function` / `remove_function`; only the
/// [`binder`](crate::binder) calls `define_class` / `define_method`.
pub trait RuntimeModule {
    /// Identity of this module instance.
    fn module_id(&self) -> ModuleId;

    /// Version string of the embedded runtime.
    fn version(&self) -> &str;

    /// The root `Object` class, or `ClassHandle::NULL` if unavailable.
    fn object_class(&self) -> ClassHandle;

    /// Define (or reopen) a class. Returns `ClassHandle::NULL` on failure.
    fn define_class(&mut self, name: &str, super_class: ClassHandle) -> ClassHandle;

    /// Associate `entry` with `name` on `class`, replacing any prior binding.
    ///
    /// Fails with [`BridgeError::MethodDefinitionFailed`] when the runtime
    /// refuses the definition.
    fn define_method(&mut self, class: ClassHandle, name: &str, entry: EntryHandle)
        -> BridgeResult<()>;

    /// Remove method `name` from `class`. Unknown names are ignored.
    fn undefine_method(&mut self, class: ClassHandle, name: &str);

    /// Install a native function into the shared function table.
    ///
    /// Fails with [`BridgeError::TableExhausted`] when no slot is free.
    fn install_function(
        &mut self,
        function: NativeFn,
        signature: &Signature,
    ) -> BridgeResult<EntryHandle>;

    /// Remove a previously installed function.
    ///
    /// Fails with [`BridgeError::UnknownEntry`] when the slot is empty.
    fn remove_function(&mut self, entry: EntryHandle) -> BridgeResult<()>;

    /// Total slots in the function table.
    fn table_capacity(&self) -> usize;

    /// Slots currently occupied.
    fn installed_functions(&self) -> usize;
}
