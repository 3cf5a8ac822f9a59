//! Class and method binding through the runtime's reflection entry points.

use tracing::debug;

use crate::error::{BridgeError, BridgeResult};
use crate::registry::{CallbackRegistry, FunctionTableEntry};
use crate::runtime::{ClassHandle, RuntimeModule};

/// The runtime's root class, failing if the runtime reports none.
pub fn object_class<R: RuntimeModule + ?Sized>(runtime: &R) -> BridgeResult<ClassHandle> {
    let class = runtime.object_class();
    if class.is_null() {
        return Err(BridgeError::ClassDefinitionFailed {
            name: "Object".to_string(),
        });
    }
    Ok(class)
}

/// Define `name` as a subclass of `super_class`.
pub fn bind_class<R: RuntimeModule + ?Sized>(
    runtime: &mut R,
    name: &str,
    super_class: ClassHandle,
) -> BridgeResult<ClassHandle> {
    let class = runtime.define_class(name, super_class);
    if class.is_null() {
        return Err(BridgeError::ClassDefinitionFailed {
            name: name.to_string(),
        });
    }
    debug!(name, %class, "Bound class");
    Ok(class)
}

/// Attach a live registry entry to `class` as method `name`.
///
/// Rebinding an existing name replaces it. An entry that is not live in
/// `registry` (released, or never installed there) is refused, so a released
/// entry can never become a dispatch target again.
pub fn bind_method<R: RuntimeModule + ?Sized>(
    runtime: &mut R,
    registry: &CallbackRegistry,
    class: ClassHandle,
    name: &str,
    entry: &FunctionTableEntry,
) -> BridgeResult<()> {
    if !registry.is_live(entry) || entry.module() != runtime.module_id() {
        return Err(BridgeError::EntryNotLive {
            entry: entry.handle(),
        });
    }
    runtime.define_method(class, name, entry.handle())?;
    debug!(%class, method = name, %entry, "Bound method");
    Ok(())
}
