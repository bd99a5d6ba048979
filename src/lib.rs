//! vidstitch: merge video files with ffmpeg.
//!
//! Inputs that share codec parameters are stream-copied through the concat
//! demuxer. Anything else is normalized in parallel (scale, pad, fps, audio
//! layout) and then stream-copied.

pub mod config;
pub mod engine;
pub mod logging;
