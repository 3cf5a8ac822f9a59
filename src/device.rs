//! Device state: colors, the sink interface, and a simulated LED strip.
//!
//! The bridge never renders anything. It hands validated color changes to a
//! [`DeviceStateSink`], which belongs to whatever presents the device.
//! [`LedStrip`] is the in-memory model used by the CLI and the tests.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
}

impl Rgb {
    /// All components zero; the power-on color.
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    /// Color from its three components.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from script integers, `None` if any is outside `0..=255`.
    pub fn from_components(r: i64, g: i64, b: i64) -> Option<Self> {
        Some(Self {
            r: u8::try_from(r).ok()?,
            g: u8::try_from(g).ok()?,
            b: u8::try_from(b).ok()?,
        })
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Receiver of validated device-state changes.
///
/// Called synchronously from inside a native callback, so implementations
/// must not call back into the runtime.
pub trait DeviceStateSink: Send + Sync {
    /// Set element `index` to `color`.
    fn set_element_color(&self, index: usize, color: Rgb);

    /// Push pending changes out. The default does nothing.
    fn flush(&self) {}
}

/// Simulated addressable LED strip, all elements black initially.
pub struct LedStrip {
    leds: Mutex<Vec<Rgb>>,
    flushes: AtomicUsize,
}

impl LedStrip {
    /// Strip of `len` black elements.
    pub fn new(len: usize) -> Self {
        Self {
            leds: Mutex::new(vec![Rgb::BLACK; len]),
            flushes: AtomicUsize::new(0),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the strip has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Color of element `index`, if in range.
    pub fn get(&self, index: usize) -> Option<Rgb> {
        self.lock().get(index).copied()
    }

    /// Copy of every element's current color.
    pub fn snapshot(&self) -> Vec<Rgb> {
        self.lock().clone()
    }

    /// Number of `flush` calls so far.
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Turn every element off.
    pub fn clear(&self) {
        self.lock().fill(Rgb::BLACK);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Rgb>> {
        self.leds.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceStateSink for LedStrip {
    fn set_element_color(&self, index: usize, color: Rgb) {
        let mut leds = self.lock();
        match leds.get_mut(index) {
            Some(led) => *led = color,
            None => warn!(index, len = leds.len(), "LED index out of range; ignored"),
        }
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_from_components() {
        assert_eq!(Rgb::from_components(255, 0, 10), Some(Rgb::new(255, 0, 10)));
        assert_eq!(Rgb::from_components(256, 0, 0), None);
        assert_eq!(Rgb::from_components(0, -1, 0), None);
    }

    #[test]
    fn test_rgb_display() {
        assert_eq!(Rgb::new(1, 2, 3).to_string(), "rgb(1, 2, 3)");
    }

    #[test]
    fn test_strip_set_and_snapshot() {
        let strip = LedStrip::new(3);
        strip.set_element_color(1, Rgb::new(9, 8, 7));
        assert_eq!(
            strip.snapshot(),
            vec![Rgb::BLACK, Rgb::new(9, 8, 7), Rgb::BLACK]
        );
        strip.set_element_color(3, Rgb::new(1, 1, 1));
        assert_eq!(strip.len(), 3);
        assert_eq!(strip.get(3), None);

        strip.clear();
        assert_eq!(strip.get(1), Some(Rgb::BLACK));
    }

    #[test]
    fn test_strip_counts_flushes() {
        let strip = LedStrip::new(1);
        strip.flush();
        strip.flush();
        assert_eq!(strip.flush_count(), 2);
    }
}
