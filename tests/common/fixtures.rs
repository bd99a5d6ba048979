use vidstitch::engine::{MediaRecord, Resolution};

/// Stream parameters of a fake input, as ffprobe would report them
#[derive(Debug, Clone)]
pub struct FakeClip {
    pub codec: &'static str,
    pub width: u32,
    pub height: u32,
    pub frame_rate: &'static str,
    pub pix_fmt: &'static str,
    pub audio: Option<(u32, &'static str)>,
    pub duration: f64,
}

impl Default for FakeClip {
    fn default() -> Self {
        Self {
            codec: "h264",
            width: 1920,
            height: 1080,
            frame_rate: "30/1",
            pix_fmt: "yuv420p",
            audio: Some((48_000, "stereo")),
            duration: 5.0,
        }
    }
}

impl FakeClip {
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn silent(mut self) -> Self {
        self.audio = None;
        self
    }

    pub fn lasting(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    /// ffprobe `-print_format json -show_format -show_streams` output
    pub fn probe_json(&self, file_name: &str) -> String {
        let mut streams = vec![serde_json::json!({
            "index": 0,
            "codec_name": self.codec,
            "codec_type": "video",
            "width": self.width,
            "height": self.height,
            "pix_fmt": self.pix_fmt,
            // Timebase guess; the effective rate is avg_frame_rate
            "r_frame_rate": "60/1",
            "avg_frame_rate": self.frame_rate,
        })];
        if let Some((sample_rate, layout)) = self.audio {
            streams.push(serde_json::json!({
                "index": 1,
                "codec_name": "aac",
                "codec_type": "audio",
                "sample_rate": sample_rate.to_string(),
                "channels": 2,
                "channel_layout": layout,
            }));
        }

        serde_json::json!({
            "streams": streams,
            "format": {
                "filename": file_name,
                "duration": format!("{:.6}", self.duration),
                "size": "1048576",
            }
        })
        .to_string()
    }

    /// The record the prober should produce for this clip
    pub fn record(&self, path: &str) -> MediaRecord {
        let mut record = MediaRecord::new(path);
        record.codec = self.codec.to_string();
        record.resolution = Resolution::new(self.width, self.height);
        record.frame_rate = vidstitch::engine::probe::parse_frame_rate(self.frame_rate);
        record.pix_fmt = self.pix_fmt.to_string();
        record.duration = self.duration;
        record.size = 1_048_576;
        if let Some((sample_rate, layout)) = self.audio {
            record.has_audio = true;
            record.audio_sample_rate = sample_rate;
            record.audio_channel_layout = layout.to_string();
        }
        record
    }
}
