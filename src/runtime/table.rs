//! Function and class tables backing the bundled runtimes.
//!
//! Freed function slots are reused, lowest index first. Each slot carries a
//! generation that is bumped on every install, and method bindings record the
//! generation they were made against. A method whose entry was released (and
//! possibly refilled by an unrelated function) therefore resolves to
//! [`BridgeError::DanglingEntry`] instead of calling the wrong code.

use std::collections::HashMap;

use crate::error::{BridgeError, BridgeResult};
use crate::runtime::{ArgumentVector, ClassHandle, EntryHandle, NativeFn, Signature, Value};

struct Slot {
    function: Option<(NativeFn, Signature)>,
    generation: u32,
}

/// Fixed-capacity table of native functions.
pub struct FunctionTable {
    slots: Vec<Slot>,
    capacity: usize,
}

impl FunctionTable {
    /// Empty table with `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
        }
    }

    /// Total slot count.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.function.is_some()).count()
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupy the first free slot, or fail with `TableExhausted`.
    pub fn install(&mut self, function: NativeFn, signature: &Signature) -> BridgeResult<EntryHandle> {
        let index = match self.slots.iter().position(|s| s.function.is_none()) {
            Some(free) => free,
            None if self.slots.len() < self.capacity => {
                self.slots.push(Slot {
                    function: None,
                    generation: 0,
                });
                self.slots.len() - 1
            }
            None => {
                return Err(BridgeError::TableExhausted {
                    capacity: self.capacity,
                })
            }
        };

        let slot = &mut self.slots[index];
        slot.function = Some((function, signature.clone()));
        slot.generation = slot.generation.wrapping_add(1);
        Ok(EntryHandle::new(index as u32 + 1))
    }

    /// Free an occupied slot. Its next install bumps the generation.
    pub fn remove(&mut self, entry: EntryHandle) -> BridgeResult<()> {
        match self.slot_mut(entry) {
            Some(slot) if slot.function.is_some() => {
                slot.function = None;
                Ok(())
            }
            _ => Err(BridgeError::UnknownEntry { entry }),
        }
    }

    /// Generation of an occupied slot.
    pub fn generation(&self, entry: EntryHandle) -> Option<u32> {
        self.slot(entry)
            .filter(|s| s.function.is_some())
            .map(|s| s.generation)
    }

    /// Resolve a binding to its function, refusing stale generations.
    pub fn resolve(&self, binding: &MethodBinding) -> Option<NativeFn> {
        let slot = self.slot(binding.entry)?;
        match &slot.function {
            Some((function, _)) if slot.generation == binding.generation => Some(function.clone()),
            _ => None,
        }
    }

    /// Signature of an occupied slot.
    pub fn signature(&self, entry: EntryHandle) -> Option<&Signature> {
        self.slot(entry)?.function.as_ref().map(|(_, sig)| sig)
    }

    fn slot(&self, entry: EntryHandle) -> Option<&Slot> {
        let index = (entry.index() as usize).checked_sub(1)?;
        self.slots.get(index)
    }

    fn slot_mut(&mut self, entry: EntryHandle) -> Option<&mut Slot> {
        let index = (entry.index() as usize).checked_sub(1)?;
        self.slots.get_mut(index)
    }
}

/// A method name bound to a specific generation of a table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodBinding {
    /// Slot the method dispatches through.
    pub entry: EntryHandle,
    /// Slot generation at bind time.
    pub generation: u32,
}

struct ClassDef {
    name: String,
    super_class: ClassHandle,
    methods: HashMap<String, MethodBinding>,
}

/// Classes known to a runtime. Handle 1 is always `Object`.
pub struct ClassTable {
    classes: Vec<ClassDef>,
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassTable {
    /// The root class every user class inherits from.
    pub const OBJECT: ClassHandle = ClassHandle::new(1);

    /// Table holding only the root class.
    pub fn new() -> Self {
        Self {
            classes: vec![ClassDef {
                name: "Object".to_string(),
                super_class: ClassHandle::NULL,
                methods: HashMap::new(),
            }],
        }
    }

    /// Define `name` under `super_class`.
    ///
    /// Redefining an existing class with the same superclass reopens it and
    /// returns the existing handle. A different superclass, or an unknown one,
    /// yields `ClassHandle::NULL`.
    pub fn define(&mut self, name: &str, super_class: ClassHandle) -> ClassHandle {
        if name.is_empty() || self.get(super_class).is_none() {
            return ClassHandle::NULL;
        }
        if let Some(existing) = self.find(name) {
            return match self.get(existing) {
                Some(def) if def.super_class == super_class => existing,
                _ => ClassHandle::NULL,
            };
        }
        self.classes.push(ClassDef {
            name: name.to_string(),
            super_class,
            methods: HashMap::new(),
        });
        ClassHandle::new(self.classes.len() as u32)
    }

    /// Class called `name`, if defined.
    pub fn find(&self, name: &str) -> Option<ClassHandle> {
        self.classes
            .iter()
            .position(|c| c.name == name)
            .map(|i| ClassHandle::new(i as u32 + 1))
    }

    /// Name of `class`.
    pub fn name(&self, class: ClassHandle) -> Option<&str> {
        self.get(class).map(|c| c.name.as_str())
    }

    /// Bind a method. Returns `false` for an unknown class.
    pub fn bind(&mut self, class: ClassHandle, name: &str, binding: MethodBinding) -> bool {
        match self.get_mut(class) {
            Some(def) => {
                def.methods.insert(name.to_string(), binding);
                true
            }
            None => false,
        }
    }

    /// Remove a method from `class` itself. Returns whether one was bound.
    pub fn unbind(&mut self, class: ClassHandle, name: &str) -> bool {
        self.get_mut(class)
            .is_some_and(|def| def.methods.remove(name).is_some())
    }

    /// Look a method up on `class`, then on its superclasses.
    pub fn lookup(&self, class: ClassHandle, name: &str) -> Option<MethodBinding> {
        let mut current = class;
        while let Some(def) = self.get(current) {
            if let Some(binding) = def.methods.get(name) {
                return Some(*binding);
            }
            current = def.super_class;
        }
        None
    }

    /// Classes other than `Object`, with their method names sorted.
    pub fn user_classes(&self) -> Vec<(ClassHandle, String, Vec<String>)> {
        self.classes
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, def)| {
                let mut methods: Vec<String> = def.methods.keys().cloned().collect();
                methods.sort();
                (ClassHandle::new(i as u32 + 1), def.name.clone(), methods)
            })
            .collect()
    }

    fn get(&self, class: ClassHandle) -> Option<&ClassDef> {
        let index = (class.raw() as usize).checked_sub(1)?;
        self.classes.get(index)
    }

    fn get_mut(&mut self, class: ClassHandle) -> Option<&mut ClassDef> {
        let index = (class.raw() as usize).checked_sub(1)?;
        self.classes.get_mut(index)
    }
}

/// Resolve `class.method` to the native function currently bound to it.
pub(crate) fn resolve_method(
    functions: &FunctionTable,
    classes: &ClassTable,
    class: ClassHandle,
    method: &str,
) -> BridgeResult<NativeFn> {
    let binding = classes
        .lookup(class, method)
        .ok_or_else(|| BridgeError::UndefinedMethod {
            class,
            method: method.to_string(),
        })?;
    functions
        .resolve(&binding)
        .ok_or_else(|| BridgeError::DanglingEntry {
            method: method.to_string(),
            entry: binding.entry,
        })
}

/// Run a native body for one call. Slot 0 starts out as the receiver, so a
/// body that never writes a return value returns its receiver.
pub(crate) fn invoke(function: &NativeFn, class: ClassHandle, args: Vec<Value>) -> Value {
    let mut argv = ArgumentVector::new(Value::Object(class), args);
    function(&mut argv);
    argv.into_return_value()
}
