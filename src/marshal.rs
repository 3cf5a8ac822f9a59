//! Value marshalling between runtime argument vectors and host types.
//!
//! Every read of a positional argument and every write of the return slot
//! goes through this module. Argument indices are 1-based, slot 0 being the
//! receiver.
//!
//! The getters follow the runtime's own C-level contract: they are only
//! meaningful after [`is_numeric`] has returned `true` for the same index.
//! Called on anything else they return zero rather than failing.

use crate::error::{BridgeError, BridgeResult};
use crate::runtime::{ArgumentVector, Value};

/// Whether argument `index` is an integer or a float.
///
/// Index 0 and out-of-range indices return `false`.
pub fn is_numeric(args: &ArgumentVector, index: usize) -> bool {
    index > 0 && matches!(args.slot(index), Some(Value::Integer(_) | Value::Float(_)))
}

/// Integer value of argument `index`. Floats truncate toward zero.
pub fn get_int(args: &ArgumentVector, index: usize) -> i64 {
    match argument(args, index) {
        Some(Value::Integer(v)) => *v,
        Some(Value::Float(v)) => *v as i64,
        _ => 0,
    }
}

/// Float value of argument `index`. Integers widen.
pub fn get_float(args: &ArgumentVector, index: usize) -> f64 {
    match argument(args, index) {
        Some(Value::Float(v)) => *v,
        Some(Value::Integer(v)) => *v as f64,
        _ => 0.0,
    }
}

/// Write `true` or `false` into the return slot.
pub fn set_return_bool(args: &mut ArgumentVector, value: bool) {
    args.set_return_slot(Value::Bool(value));
}

/// Write `nil` into the return slot.
pub fn set_return_nil(args: &mut ArgumentVector) {
    args.set_return_slot(Value::Nil);
}

/// Write an integer into the return slot.
pub fn set_return_int(args: &mut ArgumentVector, value: i64) {
    args.set_return_slot(Value::Integer(value));
}

/// Write a float into the return slot.
pub fn set_return_float(args: &mut ArgumentVector, value: f64) {
    args.set_return_slot(Value::Float(value));
}

/// Check arguments `1..=N` are integers and extract them.
///
/// Floats are accepted only when they have no fractional part, so `20.0`
/// passes and `-0.5` does not. The error names the first offending position.
pub fn int_args<const N: usize>(args: &ArgumentVector) -> BridgeResult<[i64; N]> {
    let mut out = [0_i64; N];
    for (i, slot) in out.iter_mut().enumerate() {
        let index = i + 1;
        if !is_numeric(args, index) {
            return Err(BridgeError::ArgumentTypeMismatch {
                index,
                found: argument(args, index).map_or("missing", Value::type_name),
            });
        }
        if let Some(Value::Float(value)) = argument(args, index) {
            if value.fract() != 0.0 {
                return Err(BridgeError::NonIntegralArgument {
                    index,
                    value: *value,
                });
            }
        }
        *slot = get_int(args, index);
    }
    Ok(out)
}

fn argument(args: &ArgumentVector, index: usize) -> Option<&Value> {
    if index == 0 {
        None
    } else {
        args.slot(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(values: Vec<Value>) -> ArgumentVector {
        ArgumentVector::new(Value::Nil, values)
    }

    #[test]
    fn test_is_numeric() {
        let args = argv(vec![
            Value::Integer(5),
            Value::Float(1.5),
            Value::from("five"),
            Value::Nil,
        ]);
        assert!(is_numeric(&args, 1));
        assert!(is_numeric(&args, 2));
        assert!(!is_numeric(&args, 3));
        assert!(!is_numeric(&args, 4));
    }

    #[test]
    fn test_is_numeric_out_of_range() {
        let args = argv(vec![Value::Integer(1)]);
        assert!(!is_numeric(&args, 0));
        assert!(!is_numeric(&args, 2));
        assert!(!is_numeric(&args, usize::MAX));
    }

    #[test]
    fn test_get_int_and_float() {
        let args = argv(vec![Value::Integer(-3), Value::Float(2.9), Value::Float(-2.9)]);
        assert_eq!(get_int(&args, 1), -3);
        assert_eq!(get_int(&args, 2), 2);
        assert_eq!(get_int(&args, 3), -2);
        assert_eq!(get_float(&args, 1), -3.0);
        assert_eq!(get_float(&args, 2), 2.9);
    }

    #[test]
    fn test_getters_on_non_numeric_return_zero() {
        let args = argv(vec![Value::from("x")]);
        assert_eq!(get_int(&args, 1), 0);
        assert_eq!(get_float(&args, 1), 0.0);
        assert_eq!(get_int(&args, 9), 0);
    }

    #[test]
    fn test_return_slot_last_write_wins() {
        let mut args = argv(vec![Value::Integer(1)]);
        set_return_bool(&mut args, false);
        set_return_int(&mut args, 42);
        assert_eq!(args.return_value(), &Value::Integer(42));
        set_return_float(&mut args, 0.5);
        set_return_nil(&mut args);
        assert_eq!(args.return_value(), &Value::Nil);
        // positional arguments untouched
        assert!(is_numeric(&args, 1));
    }

    #[test]
    fn test_int_args_reports_first_mismatch() {
        let args = argv(vec![Value::Integer(1), Value::Integer(2), Value::Bool(true)]);
        let err = int_args::<4>(&args).unwrap_err();
        match err {
            BridgeError::ArgumentTypeMismatch { index, found } => {
                assert_eq!(index, 3);
                assert_eq!(found, "bool");
            }
            other => panic!("unexpected error: {other}"),
        }

        let short = argv(vec![Value::Integer(1)]);
        assert!(matches!(
            int_args::<2>(&short),
            Err(BridgeError::ArgumentTypeMismatch { index: 2, found: "missing" })
        ));

        let ok = argv(vec![Value::Integer(5), Value::Float(255.0)]);
        assert_eq!(int_args::<2>(&ok).unwrap(), [5, 255]);
    }

    #[test]
    fn test_int_args_rejects_fractional_floats() {
        for value in [-0.5, 255.7, 59.9, f64::NAN, f64::INFINITY] {
            let args = argv(vec![Value::Integer(1), Value::Float(value)]);
            assert!(matches!(
                int_args::<2>(&args),
                Err(BridgeError::NonIntegralArgument { index: 2, .. })
            ));
        }
    }
}
