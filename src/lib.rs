//! Core library for the pixel_bridge application.
//!
//! Exposes host-native functions to an embedded scripting runtime through the
//! runtime's shared function table, and models the device state (a strip of
//! RGB elements) that scripts mutate through the `PIXELS` class.
//!
//! Layers, leaf first:
//!
//! - [`marshal`]: argument-vector access and return-slot writes
//! - [`registry`]: installs and releases function-table entries
//! - [`binder`]: class and method definition through runtime reflection
//! - [`pixels`]: the `PIXELS.set` / `PIXELS.update` native bodies
//! - [`host`]: initialize / cleanup / switch-board lifecycle
//!
//! [`runtime`] holds the `RuntimeModule` seam with a mock and a Rhai-backed
//! implementation.

pub mod binder;
pub mod config;
pub mod device;
pub mod error;
pub mod host;
pub mod marshal;
pub mod pixels;
pub mod registry;
pub mod runtime;
pub mod telemetry;

pub use config::{BoardConfig, BridgeConfig};
pub use device::{DeviceStateSink, LedStrip, Rgb};
pub use error::{BridgeError, BridgeResult};
pub use host::DeviceHost;
pub use pixels::{define_pixels, PixelsBinding};
pub use registry::{CallbackRegistry, FunctionTableEntry, ReleaseOutcome, ReleaseReport};
pub use runtime::{MockRuntime, RhaiRuntime, RuntimeModule, ScriptOutcome, Value};
