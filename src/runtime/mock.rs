//! Mock Runtime Implementation
//!
//! An in-memory stand-in for an embedded runtime module, for exercising the
//! bridge without a script engine.
//!
//! # Behaviour
//!
//! - Fixed-capacity function table (default 64 slots) with slot reuse
//! - `Object` root class; `define_class` reopens same-name classes
//! - `call("PIXELS", "set", args)` dispatches like the runtime would when a
//!   script calls `PIXELS.set(...)`
//! - `reset()` models the module instance being torn down and replaced: the
//!   tables are emptied and the module id changes
//!
//! Failure injection (`without_object_class`, `refusing_class`,
//! `refusing_method`) lets tests
//! drive the structural error paths.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut runtime = MockRuntime::new();
//! let object = runtime.object_class();
//! let class = runtime.define_class("PIXELS", object);
//! ```

use std::collections::HashSet;

use tracing::trace;

use crate::error::{BridgeError, BridgeResult};
use crate::runtime::table::{invoke, resolve_method};
use crate::runtime::{
    ClassHandle, ClassTable, EntryHandle, FunctionTable, MethodBinding, ModuleId, NativeFn,
    RuntimeModule, Signature, Value,
};

/// Default number of function-table slots.
pub const DEFAULT_TABLE_CAPACITY: usize = 64;

// =============================================================================
// MockRuntime
// =============================================================================

/// In-memory runtime module with a fixed-capacity function table.
pub struct MockRuntime {
    id: ModuleId,
    functions: FunctionTable,
    classes: ClassTable,
    object_class_available: bool,
    refused_classes: HashSet<String>,
    refused_methods: HashSet<String>,
}

impl MockRuntime {
    /// Create a runtime with the default table capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TABLE_CAPACITY)
    }

    /// Create a runtime whose function table holds `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id: ModuleId::next(),
            functions: FunctionTable::with_capacity(capacity),
            classes: ClassTable::new(),
            object_class_available: true,
            refused_classes: HashSet::new(),
            refused_methods: HashSet::new(),
        }
    }

    /// Report a null `Object` class.
    pub fn without_object_class(mut self) -> Self {
        self.object_class_available = false;
        self
    }

    /// Make `define_class(name, ..)` return a null handle.
    pub fn refusing_class(mut self, name: &str) -> Self {
        self.refused_classes.insert(name.to_string());
        self
    }

    /// Make `define_method(.., name, ..)` fail.
    pub fn refusing_method(mut self, name: &str) -> Self {
        self.refused_methods.insert(name.to_string());
        self
    }

    /// Tear down this module instance and come back as a new one.
    ///
    /// Every table entry and class disappears; entries handed out before the
    /// reset now belong to a module that no longer exists.
    pub fn reset(&mut self) {
        let previous = self.id;
        self.id = ModuleId::next();
        self.functions = FunctionTable::with_capacity(self.functions.capacity());
        self.classes = ClassTable::new();
        trace!(%previous, current = %self.id, "Mock runtime reset");
    }

    /// Dispatch `class_name.method(args...)` as a script would.
    pub fn call(&self, class_name: &str, method: &str, args: Vec<Value>) -> BridgeResult<Value> {
        let class = self
            .classes
            .find(class_name)
            .ok_or_else(|| BridgeError::UndefinedClass(class_name.to_string()))?;
        let function = resolve_method(&self.functions, &self.classes, class, method)?;
        Ok(invoke(&function, class, args))
    }

    /// Handle of the user class called `name`.
    pub fn class_named(&self, name: &str) -> Option<ClassHandle> {
        self.classes.find(name)
    }

    /// Method names bound on `class_name`, sorted.
    pub fn methods_of(&self, class_name: &str) -> Vec<String> {
        self.classes
            .user_classes()
            .into_iter()
            .find(|(_, name, _)| name == class_name)
            .map(|(_, _, methods)| methods)
            .unwrap_or_default()
    }

    /// Table entry currently bound to `class_name.method`.
    pub fn method_entry(&self, class_name: &str, method: &str) -> Option<EntryHandle> {
        let class = self.classes.find(class_name)?;
        self.classes.lookup(class, method).map(|b| b.entry)
    }

    /// Signature recorded for a live entry.
    pub fn entry_signature(&self, entry: EntryHandle) -> Option<&Signature> {
        self.functions.signature(entry)
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// RuntimeModule Trait Implementation
// =============================================================================

impl RuntimeModule for MockRuntime {
    fn module_id(&self) -> ModuleId {
        self.id
    }

    fn version(&self) -> &str {
        "mock"
    }

    fn object_class(&self) -> ClassHandle {
        if self.object_class_available {
            ClassTable::OBJECT
        } else {
            ClassHandle::NULL
        }
    }

    fn define_class(&mut self, name: &str, super_class: ClassHandle) -> ClassHandle {
        if self.refused_classes.contains(name) {
            return ClassHandle::NULL;
        }
        self.classes.define(name, super_class)
    }

    fn define_method(
        &mut self,
        class: ClassHandle,
        name: &str,
        entry: EntryHandle,
    ) -> BridgeResult<()> {
        // Binding to an empty slot records generation 0, which never resolves.
        let generation = self.functions.generation(entry).unwrap_or(0);
        if self.refused_methods.contains(name)
            || !self.classes.bind(class, name, MethodBinding { entry, generation })
        {
            return Err(BridgeError::MethodDefinitionFailed {
                class,
                method: name.to_string(),
            });
        }
        Ok(())
    }

    fn undefine_method(&mut self, class: ClassHandle, name: &str) {
        self.classes.unbind(class, name);
    }

    fn install_function(
        &mut self,
        function: NativeFn,
        signature: &Signature,
    ) -> BridgeResult<EntryHandle> {
        self.functions.install(function, signature)
    }

    fn remove_function(&mut self, entry: EntryHandle) -> BridgeResult<()> {
        self.functions.remove(entry)
    }

    fn table_capacity(&self) -> usize {
        self.functions.capacity()
    }

    fn installed_functions(&self) -> usize {
        self.functions.len()
    }
}
