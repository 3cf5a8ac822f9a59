//! The `PIXELS` scripting API.
//!
//! Exposes a class (named by the board, `PIXELS` by default) with two
//! methods:
//!
//! | Method                   | Returns | Effect                                   |
//! |--------------------------|---------|------------------------------------------|
//! | `set(index, r, g, b)`    | `bool`  | one `set_element_color` call when valid  |
//! | `update()`               | `true`  | `flush()` on the sink                    |
//!
//! Native bodies never fail across the runtime boundary. Bad arguments
//! (non-numeric, index outside `0..max_leds`, component outside `0..=255`)
//! produce `false` and leave the sink untouched.
//!
//! # Example
//!
//! ```rust,ignore
//! let strip = Arc::new(LedStrip::new(60));
//! let binding = define_pixels(&mut registry, &mut runtime, &board, strip.clone())?;
//! runtime.call("PIXELS", "set", vec![Value::Integer(5), Value::Integer(255), Value::Integer(0), Value::Integer(0)])?;
//! assert_eq!(strip.get(5), Some(Rgb::new(255, 0, 0)));
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::binder;
use crate::config::BoardConfig;
use crate::device::{DeviceStateSink, Rgb};
use crate::error::{BridgeError, BridgeResult};
use crate::marshal;
use crate::registry::{CallbackRegistry, FunctionTableEntry};
use crate::runtime::{ArgumentVector, ClassHandle, ModuleId, NativeFn, RuntimeModule, Signature};

/// Method name of the per-element setter.
pub const SET_METHOD: &str = "set";
/// Method name of the flush.
pub const UPDATE_METHOD: &str = "update";

/// A successfully defined `PIXELS` API on one module instance.
#[derive(Debug, Clone)]
pub struct PixelsBinding {
    class: ClassHandle,
    class_name: String,
    set_entry: FunctionTableEntry,
    update_entry: FunctionTableEntry,
}

impl PixelsBinding {
    /// Handle of the defined class.
    pub fn class(&self) -> ClassHandle {
        self.class
    }

    /// Name the class is visible under.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Module both entries were installed into.
    pub fn module(&self) -> ModuleId {
        self.set_entry.module()
    }

    /// Entry backing `set`.
    pub fn set_entry(&self) -> &FunctionTableEntry {
        &self.set_entry
    }

    /// Entry backing `update`.
    pub fn update_entry(&self) -> &FunctionTableEntry {
        &self.update_entry
    }

    /// Both entries, `set` first.
    pub fn entries(&self) -> [&FunctionTableEntry; 2] {
        [&self.set_entry, &self.update_entry]
    }
}

/// Define the `PIXELS` class on `runtime` and wire it to `sink`.
///
/// The class is created first, then both callbacks are installed, then both
/// methods are bound. If anything fails after the first install, the methods
/// bound by this call are removed and every entry it installed is released
/// before the error is returned.
pub fn define_pixels<R: RuntimeModule + ?Sized>(
    registry: &mut CallbackRegistry,
    runtime: &mut R,
    board: &BoardConfig,
    sink: Arc<dyn DeviceStateSink>,
) -> BridgeResult<PixelsBinding> {
    let object = binder::object_class(runtime)?;
    let class = binder::bind_class(runtime, &board.class_name, object)?;

    let entries = registry.install_all(
        runtime,
        vec![
            (set_pixel_fn(sink.clone(), board.max_leds), Signature::native_method()),
            (update_fn(sink), Signature::native_method()),
        ],
    )?;

    let methods = [SET_METHOD, UPDATE_METHOD];
    for (bound, (method, entry)) in methods.iter().zip(&entries).enumerate() {
        if let Err(err) = binder::bind_method(runtime, registry, class, method, entry) {
            for done in &methods[..bound] {
                runtime.undefine_method(class, done);
            }
            let report = registry.release_entries(runtime, entries.clone());
            warn!(
                class = %board.class_name,
                method,
                error = %err,
                %report,
                "Method binding failed, rolled back"
            );
            return Err(err);
        }
    }

    let [set_entry, update_entry]: [FunctionTableEntry; 2] = entries
        .try_into()
        .map_err(|_| BridgeError::Runtime("expected two PIXELS entries".to_string()))?;

    info!(
        class = %board.class_name,
        board = %board.name,
        max_leds = board.max_leds,
        module = %set_entry.module(),
        "Defined PIXELS API"
    );

    Ok(PixelsBinding {
        class,
        class_name: board.class_name.clone(),
        set_entry,
        update_entry,
    })
}

/// Native body for `set(index, r, g, b)`.
pub fn set_pixel_fn(sink: Arc<dyn DeviceStateSink>, max_leds: usize) -> NativeFn {
    Arc::new(move |args| set_pixel(args, sink.as_ref(), max_leds))
}

/// Native body for `update()`.
pub fn update_fn(sink: Arc<dyn DeviceStateSink>) -> NativeFn {
    Arc::new(move |args| {
        sink.flush();
        marshal::set_return_bool(args, true);
    })
}

fn set_pixel(args: &mut ArgumentVector, sink: &dyn DeviceStateSink, max_leds: usize) {
    let [index, r, g, b] = match marshal::int_args::<4>(args) {
        Ok(values) => values,
        Err(err) => {
            debug!(error = %err, "PIXELS.set rejected");
            marshal::set_return_bool(args, false);
            return;
        }
    };

    let Some(index) = usize::try_from(index).ok().filter(|i| *i < max_leds) else {
        debug!(index, max_leds, "Invalid LED index");
        marshal::set_return_bool(args, false);
        return;
    };

    let Some(color) = Rgb::from_components(r, g, b) else {
        debug!(r, g, b, "Invalid RGB values");
        marshal::set_return_bool(args, false);
        return;
    };

    sink.set_element_color(index, color);
    marshal::set_return_bool(args, true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Value;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(usize, Rgb)>>,
        flushes: Mutex<usize>,
    }

    impl DeviceStateSink for RecordingSink {
        fn set_element_color(&self, index: usize, color: Rgb) {
            self.calls.lock().unwrap().push((index, color));
        }

        fn flush(&self) {
            *self.flushes.lock().unwrap() += 1;
        }
    }

    fn call(function: &NativeFn, args: Vec<Value>) -> Value {
        let mut argv = ArgumentVector::new(Value::Nil, args);
        function(&mut argv);
        argv.into_return_value()
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::Integer).collect()
    }

    #[test]
    fn test_set_valid() {
        let sink = Arc::new(RecordingSink::default());
        let set = set_pixel_fn(sink.clone(), 60);
        assert_eq!(call(&set, ints(&[5, 255, 0, 0])), Value::Bool(true));
        assert_eq!(*sink.calls.lock().unwrap(), vec![(5, Rgb::new(255, 0, 0))]);
    }

    #[test]
    fn test_set_boundaries() {
        let sink = Arc::new(RecordingSink::default());
        let set = set_pixel_fn(sink.clone(), 60);
        assert_eq!(call(&set, ints(&[0, 0, 0, 0])), Value::Bool(true));
        assert_eq!(call(&set, ints(&[59, 255, 255, 255])), Value::Bool(true));
        assert_eq!(call(&set, ints(&[60, 0, 0, 0])), Value::Bool(false));
        assert_eq!(call(&set, ints(&[-1, 0, 0, 0])), Value::Bool(false));
        assert_eq!(call(&set, ints(&[1, 256, 0, 0])), Value::Bool(false));
        assert_eq!(call(&set, ints(&[1, 0, -1, 0])), Value::Bool(false));
        assert_eq!(call(&set, ints(&[1, 0, 0, 1000])), Value::Bool(false));
        assert_eq!(sink.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_set_non_numeric_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let set = set_pixel_fn(sink.clone(), 60);
        for position in 0..4 {
            let mut args = ints(&[1, 2, 3, 4]);
            args[position] = Value::from("red");
            assert_eq!(call(&set, args), Value::Bool(false));
        }
        assert_eq!(call(&set, ints(&[1, 2, 3])), Value::Bool(false));
        assert_eq!(call(&set, vec![Value::Nil; 4]), Value::Bool(false));
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_set_accepts_integral_floats() {
        let sink = Arc::new(RecordingSink::default());
        let set = set_pixel_fn(sink.clone(), 60);
        let args = vec![
            Value::Float(2.0),
            Value::Integer(10),
            Value::Float(20.0),
            Value::Integer(30),
        ];
        assert_eq!(call(&set, args), Value::Bool(true));
        assert_eq!(*sink.calls.lock().unwrap(), vec![(2, Rgb::new(10, 20, 30))]);
    }

    #[test]
    fn test_set_rejects_fractional_floats() {
        let sink = Arc::new(RecordingSink::default());
        let set = set_pixel_fn(sink.clone(), 60);
        let cases = [
            [Value::Float(-0.5), Value::Integer(1), Value::Integer(2), Value::Integer(3)],
            [Value::Integer(0), Value::Float(255.7), Value::Integer(0), Value::Integer(0)],
            [Value::Float(59.9), Value::Integer(1), Value::Integer(0), Value::Integer(0)],
        ];
        for args in cases {
            assert_eq!(call(&set, args.to_vec()), Value::Bool(false));
        }
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_update_always_true() {
        let sink = Arc::new(RecordingSink::default());
        let update = update_fn(sink.clone());
        assert_eq!(call(&update, vec![]), Value::Bool(true));
        assert_eq!(call(&update, ints(&[1, 2])), Value::Bool(true));
        assert_eq!(*sink.flushes.lock().unwrap(), 2);
        assert!(sink.calls.lock().unwrap().is_empty());
    }
}
