// Analytics Module - indicators, Fibonacci projection, and signal logic
// Everything here is pure: slices of candles in, values out

pub mod fibonacci;
pub mod indicators;
pub mod signal_engine;

// Re-export commonly used items
pub use fibonacci::{build_fib_levels, nearest_retracement, FibLevel, FibLevels};
pub use indicators::{atr, fractals, rsi, supertrend, Fractal, FractalKind, SupertrendPoint};
pub use signal_engine::generate_signal;
