// Merge engine - independent of any UI host

pub mod cancel;
pub mod compat;
pub mod concat;
pub mod core;
pub mod error;
pub mod events;
pub mod hardware;
pub mod merge;
pub mod probe;
pub mod process;
pub mod worker;

pub use cancel::CancelToken;
pub use compat::{Mismatch, first_mismatch, is_fast_mergeable};
pub use core::*;
pub use error::{MergeError, ProbeError, RunError, ToolFailure};
pub use events::{ChannelSink, MergeEvent, NullSink, ProgressSink};
pub use hardware::{
    EncoderAvailability, EncoderChoice, EncoderPolicy, HardwareEncoder, select_encoder,
    select_encoder_for,
};
pub use merge::MergeService;
