//! End-to-end scripts through the Rhai runtime.

use pixel_bridge::config::{BoardConfig, RuntimeConfig};
use pixel_bridge::runtime::RhaiRuntime;
use pixel_bridge::{BridgeError, DeviceHost, Rgb, RuntimeModule, Value};

fn host(leds: usize) -> DeviceHost<RhaiRuntime> {
    let mut host = DeviceHost::new(RhaiRuntime::new(), BoardConfig::with_leds("test", leds));
    host.initialize().unwrap();
    host
}

#[test]
fn test_simple_script() {
    let host = host(60);
    let outcome = host.runtime().run_script("5 + 5").unwrap();
    assert_eq!(outcome.value, Value::Integer(10));
}

#[test]
fn test_set_from_script() {
    let host = host(60);
    let outcome = host
        .runtime()
        .run_script("PIXELS.set(5, 255, 0, 0)")
        .unwrap();
    assert_eq!(outcome.value, Value::Bool(true));
    assert_eq!(host.strip().get(5), Some(Rgb::new(255, 0, 0)));
}

#[test]
fn test_invalid_calls_return_false() {
    let host = host(60);
    let script = r#"
        [
            PIXELS.set(60, 0, 0, 0),
            PIXELS.set(0, 256, 0, 0),
            PIXELS.set(0, -1, 0, 0),
            PIXELS.set("0", 1, 1, 1),
            PIXELS.set(0, 1, 1),
        ].all(|ok| ok == false)
    "#;
    let outcome = host.runtime().run_script(script).unwrap();
    assert_eq!(outcome.value, Value::Bool(true));
    assert!(host.strip().snapshot().iter().all(|c| *c == Rgb::BLACK));
}

#[test]
fn test_integral_floats_accepted() {
    let host = host(60);
    let outcome = host
        .runtime()
        .run_script("PIXELS.set(3.0, 10, 20.0, 30)")
        .unwrap();
    assert_eq!(outcome.value, Value::Bool(true));
    assert_eq!(host.strip().get(3), Some(Rgb::new(10, 20, 30)));
}

#[test]
fn test_fractional_floats_rejected() {
    let host = host(60);
    for script in [
        "PIXELS.set(-0.5, 1, 2, 3)",
        "PIXELS.set(0, 255.7, 0, 0)",
        "PIXELS.set(59.9, 1, 0, 0)",
        "PIXELS.set(3.9, 10.5, 20.0, 30.99)",
    ] {
        let outcome = host.runtime().run_script(script).unwrap();
        assert_eq!(outcome.value, Value::Bool(false), "{script}");
    }
    assert!(host.strip().snapshot().iter().all(|c| *c == Rgb::BLACK));
}

#[test]
fn test_update_and_output() {
    let host = host(8);
    let script = r#"
        for i in 0..8 {
            PIXELS.set(i, i * 10, 0, 255 - i * 10);
        }
        print("frame done");
        PIXELS.update()
    "#;
    let outcome = host.runtime().run_script(script).unwrap();
    assert_eq!(outcome.value, Value::Bool(true));
    assert_eq!(outcome.output, vec!["frame done".to_string()]);
    assert_eq!(host.strip().flush_count(), 1);
    assert_eq!(host.strip().get(7), Some(Rgb::new(70, 0, 185)));
}

#[test]
fn test_calls_after_cleanup_fail() {
    let mut host = host(60);
    host.cleanup();

    let err = host.runtime().run_script("PIXELS.update()").unwrap_err();
    assert!(matches!(err, BridgeError::Runtime(_)));
    assert_eq!(host.strip().flush_count(), 0);
}

#[test]
fn test_reinitialize_after_cleanup() {
    let mut host = host(60);
    host.cleanup();
    host.initialize().unwrap();

    let outcome = host.runtime().run_script("PIXELS.update()").unwrap();
    assert_eq!(outcome.value, Value::Bool(true));
    assert_eq!(host.runtime().installed_functions(), 2);
}

#[test]
fn test_switch_board_with_scripts() {
    let mut host = host(60);
    host.runtime().run_script("PIXELS.set(50, 1, 2, 3)").unwrap();

    let report = host
        .switch_board(RhaiRuntime::new(), BoardConfig::with_leds("short", 10))
        .unwrap();
    assert_eq!(report.released(), 2);

    let outcome = host.runtime().run_script("PIXELS.set(50, 1, 2, 3)").unwrap();
    assert_eq!(outcome.value, Value::Bool(false));
    let outcome = host.runtime().run_script("PIXELS.set(9, 1, 2, 3)").unwrap();
    assert_eq!(outcome.value, Value::Bool(true));
}

#[test]
fn test_safety_limit() {
    let runtime = RhaiRuntime::from_config(&RuntimeConfig {
        table_capacity: 8,
        max_operations: 5_000,
    });
    let mut host = DeviceHost::new(runtime, BoardConfig::with_leds("test", 4));
    host.initialize().unwrap();

    let result = host.runtime().run_script("loop { PIXELS.update(); }");
    assert!(result.is_err());
    let err_msg = result.unwrap_err().to_string();
    assert!(err_msg.contains("Script terminated") || err_msg.contains("Safety limit exceeded"));
    assert!(host.strip().flush_count() > 0);
}

#[test]
fn test_script_validation() {
    let host = host(60);
    assert!(host.runtime().validate_script("PIXELS.set(0, 1, 2, 3);").is_ok());
    assert!(host.runtime().validate_script("PIXELS.set(0, 1, 2, ").is_err());
}

#[test]
fn test_demo_scripts_run() {
    for (name, source) in [
        ("rainbow", include_str!("../demos/rainbow.rhai")),
        ("blink", include_str!("../demos/blink.rhai")),
    ] {
        let host = host(60);
        let outcome = host.runtime().run_script(source);
        assert!(outcome.is_ok(), "{name}: {:?}", outcome.err());
        assert!(host.strip().flush_count() > 0, "{name} never updated");
    }
}
