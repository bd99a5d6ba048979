mod ffmpeg_cmd;
mod ffmpeg_info;
mod scan;
mod types;

pub use ffmpeg_cmd::{
    AudioPlan, IntermediateFormat, NormalizeSettings, build_concat_cmd, build_encoders_cmd,
    build_normalize_cmd, build_probe_cmd, build_thumbnail_cmd, scale_pad_filter, split_extra_args,
};
pub use ffmpeg_info::Toolchain;
pub use scan::{is_video_file, scan, scan_streaming};
pub use types::{
    ConcatMode, MediaRecord, MergeOutcome, MergeRequest, MergeStrategy, MergeSummary,
    ProgressParser, Resolution, display_name,
};
