//! Rhai Implementation of RuntimeModule
//!
//! Hosts scripts in the Rhai engine while keeping the function-table
//! discipline of a foreign runtime module: methods are never registered with
//! Rhai directly. Instead every bound method name is registered once per
//! arity as a thin trampoline that looks the method up in the class table,
//! resolves its entry in the function table, and invokes the native body with
//! an [`ArgumentVector`].
//!
//! # Script surface
//!
//! Each user class is pushed into the script scope as a constant of the same
//! name, so methods are called on the class object:
//!
//! ```text
//! PIXELS.set(5, 255, 0, 0);   // -> true
//! PIXELS.update();            // -> true
//! ```
//!
//! Methods accept 0 to [`MAX_METHOD_ARITY`] positional arguments.
//!
//! # Safety Limits
//!
//! - Operation limit per execution (`max_operations`, default 100,000)
//! - A method whose entry was released resolves to a runtime error rather
//!   than a call
//!
//! # Example
//!
//! ```rust,ignore
//! let mut runtime = RhaiRuntime::new();
//! define_pixels(&mut registry, &mut runtime, &board, strip.clone())?;
//! let outcome = runtime.run_script("PIXELS.set(0, 10, 20, 30)")?;
//! assert_eq!(outcome.value, Value::Bool(true));
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rhai::{Dynamic, Engine, EvalAltResult, Position, Scope};
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::runtime::mock::DEFAULT_TABLE_CAPACITY;
use crate::runtime::table::{invoke, resolve_method};
use crate::runtime::{
    ClassHandle, ClassTable, EntryHandle, FunctionTable, MethodBinding, ModuleId, NativeFn,
    RuntimeModule, Signature, Value,
};

/// Largest number of positional arguments a bound method accepts.
pub const MAX_METHOD_ARITY: usize = 6;

/// Default operation limit per script execution.
pub const DEFAULT_MAX_OPERATIONS: u64 = 100_000;

// =============================================================================
// Script-side class object
// =============================================================================

/// A runtime class as seen by scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptClass {
    handle: ClassHandle,
}

impl ScriptClass {
    /// Runtime handle of the class.
    pub fn handle(&self) -> ClassHandle {
        self.handle
    }
}

// =============================================================================
// Dispatch
// =============================================================================

struct Tables {
    functions: FunctionTable,
    classes: ClassTable,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
struct Dispatcher {
    tables: Arc<Mutex<Tables>>,
}

impl Dispatcher {
    fn invoke(
        &self,
        this: &ScriptClass,
        method: &str,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        let tables = lock(&self.tables);
        let resolved = resolve_method(&tables.functions, &tables.classes, this.handle, method);
        // Native bodies run without the table lock held.
        drop(tables);
        let function = resolved.map_err(runtime_error)?;

        let args = args.into_iter().map(from_dynamic).collect();
        Ok(to_dynamic(invoke(&function, this.handle, args)))
    }
}

macro_rules! register_arities {
    ($engine:expr, $dispatcher:expr, $method:expr; $([$($arg:ident),*])*) => {
        $(
            {
                let dispatcher = $dispatcher.clone();
                let name = $method.to_string();
                $engine.register_fn(
                    $method,
                    move |this: ScriptClass $(, $arg: Dynamic)*| -> Result<Dynamic, Box<EvalAltResult>> {
                        dispatcher.invoke(&this, &name, vec![$($arg),*])
                    },
                );
            }
        )*
    };
}

fn register_method(engine: &mut Engine, dispatcher: &Dispatcher, method: &str) {
    register_arities!(engine, dispatcher, method;
        []
        [a]
        [a, b]
        [a, b, c]
        [a, b, c, d]
        [a, b, c, d, e]
        [a, b, c, d, e, f]
    );
}

fn runtime_error(err: BridgeError) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(err.to_string().into(), Position::NONE).into()
}

fn from_dynamic(value: Dynamic) -> Value {
    if value.is_unit() {
        return Value::Nil;
    }
    if let Ok(b) = value.as_bool() {
        return Value::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return Value::Integer(i);
    }
    if let Ok(f) = value.as_float() {
        return Value::Float(f);
    }
    if value.is_string() {
        return value.into_string().map_or(Value::Nil, Value::String);
    }
    let type_name = value.type_name();
    match value.try_cast::<ScriptClass>() {
        Some(class) => Value::Object(class.handle),
        None => Value::Opaque(type_name),
    }
}

fn to_dynamic(value: Value) -> Dynamic {
    match value {
        Value::Nil => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(b),
        Value::Integer(i) => Dynamic::from(i),
        Value::Float(f) => Dynamic::from(f),
        Value::String(s) => Dynamic::from(s),
        Value::Object(handle) => Dynamic::from(ScriptClass { handle }),
        Value::Opaque(name) => Dynamic::from(name.to_string()),
    }
}

// =============================================================================
// RhaiRuntime
// =============================================================================

/// Result of running one script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutcome {
    /// Value of the final expression.
    pub value: Value,
    /// Lines written by `print` and `debug`, in order.
    pub output: Vec<String>,
}

/// Rhai-backed runtime module.
pub struct RhaiRuntime {
    id: ModuleId,
    tables: Arc<Mutex<Tables>>,
    max_operations: u64,
}

impl RhaiRuntime {
    /// Version string reported by `version()`.
    pub const VERSION: &'static str = concat!("rhai-bridge/", env!("CARGO_PKG_VERSION"));

    /// Create a runtime with default table capacity and operation limit.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_TABLE_CAPACITY, DEFAULT_MAX_OPERATIONS)
    }

    /// Runtime with explicit table capacity and operation limit.
    pub fn with_limits(table_capacity: usize, max_operations: u64) -> Self {
        Self {
            id: ModuleId::next(),
            tables: Arc::new(Mutex::new(Tables {
                functions: FunctionTable::with_capacity(table_capacity),
                classes: ClassTable::new(),
            })),
            max_operations,
        }
    }

    /// Runtime sized from the `[runtime]` configuration.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::with_limits(config.table_capacity, config.max_operations)
    }

    /// Execute `script` against the currently bound classes.
    pub fn run_script(&self, script: &str) -> BridgeResult<ScriptOutcome> {
        let output = Arc::new(Mutex::new(Vec::new()));
        let (engine, mut scope) = self.build_engine(output.clone());

        let result = engine
            .eval_with_scope::<Dynamic>(&mut scope, script)
            .map_err(|e| BridgeError::Runtime(e.to_string()))?;

        let output = std::mem::take(&mut *lock(&output));
        Ok(ScriptOutcome {
            value: from_dynamic(result),
            output,
        })
    }

    /// Check `script` compiles, without running it.
    pub fn validate_script(&self, script: &str) -> BridgeResult<()> {
        let (engine, _) = self.build_engine(Arc::new(Mutex::new(Vec::new())));
        engine
            .compile(script)
            .map_err(|e| BridgeError::Runtime(e.to_string()))?;
        Ok(())
    }

    fn build_engine(&self, output: Arc<Mutex<Vec<String>>>) -> (Engine, Scope<'static>) {
        let mut engine = Engine::new();

        let limit = self.max_operations;
        engine.on_progress(move |count| {
            if count > limit {
                Some(format!("Safety limit exceeded: maximum {} operations", limit).into())
            } else {
                None
            }
        });

        let printed = output.clone();
        engine.on_print(move |text| {
            info!(target: "script", "{}", text);
            lock(&printed).push(text.to_string());
        });
        engine.on_debug(move |text, _source, pos| {
            debug!(target: "script", %pos, "{}", text);
            lock(&output).push(text.to_string());
        });

        engine.register_type_with_name::<ScriptClass>("Class");

        let dispatcher = Dispatcher {
            tables: self.tables.clone(),
        };
        let classes = lock(&self.tables).classes.user_classes();
        let mut scope = Scope::new();
        let mut registered = HashSet::new();
        for (handle, name, methods) in classes {
            scope.push_constant(name, ScriptClass { handle });
            for method in methods {
                if registered.insert(method.clone()) {
                    register_method(&mut engine, &dispatcher, &method);
                }
            }
        }

        (engine, scope)
    }
}

impl Default for RhaiRuntime {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// RuntimeModule Trait Implementation
// =============================================================================

impl RuntimeModule for RhaiRuntime {
    fn module_id(&self) -> ModuleId {
        self.id
    }

    fn version(&self) -> &str {
        Self::VERSION
    }

    fn object_class(&self) -> ClassHandle {
        ClassTable::OBJECT
    }

    fn define_class(&mut self, name: &str, super_class: ClassHandle) -> ClassHandle {
        lock(&self.tables).classes.define(name, super_class)
    }

    fn define_method(
        &mut self,
        class: ClassHandle,
        name: &str,
        entry: EntryHandle,
    ) -> BridgeResult<()> {
        let mut tables = lock(&self.tables);
        let generation = tables.functions.generation(entry).unwrap_or(0);
        if !tables
            .classes
            .bind(class, name, MethodBinding { entry, generation })
        {
            return Err(BridgeError::MethodDefinitionFailed {
                class,
                method: name.to_string(),
            });
        }
        Ok(())
    }

    fn undefine_method(&mut self, class: ClassHandle, name: &str) {
        lock(&self.tables).classes.unbind(class, name);
    }

    fn install_function(
        &mut self,
        function: NativeFn,
        signature: &Signature,
    ) -> BridgeResult<EntryHandle> {
        lock(&self.tables).functions.install(function, signature)
    }

    fn remove_function(&mut self, entry: EntryHandle) -> BridgeResult<()> {
        lock(&self.tables).functions.remove(entry)
    }

    fn table_capacity(&self) -> usize {
        lock(&self.tables).functions.capacity()
    }

    fn installed_functions(&self) -> usize {
        lock(&self.tables).functions.len()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
