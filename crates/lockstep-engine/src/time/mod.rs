//! Frame timing.
//!
//! Live runs advance animation by wall-clock time (`FrameClock`); file runs
//! advance by a fixed step so the encoded animation does not depend on how
//! fast frames were produced.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameStep, FrameTime};
