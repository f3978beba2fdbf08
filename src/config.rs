use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, Result};
use crate::frame::{MediaKind, PixelFormat, SampleFormat};

fn default_gop_size() -> u32 {
    12
}

fn default_pixel_format() -> PixelFormat {
    PixelFormat::Yuv420p
}

fn default_channels() -> u16 {
    2
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConfig {
    // "libx264", "mpeg4", ...
    pub codec: String,
    pub width: u32,
    pub height: u32,
    // frames per second; the encoder timebase is 1/frame_rate
    pub frame_rate: u32,
    // bps
    pub bit_rate: u64,
    // emit an intra frame at least this often
    #[serde(default = "default_gop_size")]
    pub gop_size: u32,
    #[serde(default)]
    pub max_b_frames: Option<u32>,
    // encoder input format; frames in any other format are converted
    #[serde(default = "default_pixel_format")]
    pub pixel_format: PixelFormat,
    // try a hardware encoder first, falling back to `codec`
    #[serde(default)]
    pub hardware: bool,
}

impl VideoConfig {
    pub fn new(codec: impl Into<String>, width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            codec: codec.into(),
            width,
            height,
            frame_rate,
            bit_rate: 400_000,
            gop_size: default_gop_size(),
            max_b_frames: None,
            pixel_format: default_pixel_format(),
            hardware: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    // "aac", "libopus", "pcm_s16le", ...
    pub codec: String,
    pub sample_rate: u32,
    // bps
    pub bit_rate: u64,
    #[serde(default = "default_channels")]
    pub channels: u16,
    // None = the codec's first supported format
    #[serde(default)]
    pub sample_format: Option<SampleFormat>,
}

impl AudioConfig {
    pub fn new(codec: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            codec: codec.into(),
            sample_rate,
            bit_rate: 64_000,
            channels: default_channels(),
            sample_format: None,
        }
    }
}

/// Either stream's settings, as handed to the output backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamConfig {
    Video(VideoConfig),
    Audio(AudioConfig),
}

impl StreamConfig {
    pub fn kind(&self) -> MediaKind {
        match self {
            StreamConfig::Video(_) => MediaKind::Video,
            StreamConfig::Audio(_) => MediaKind::Audio,
        }
    }

    pub fn codec(&self) -> &str {
        match self {
            StreamConfig::Video(v) => &v.codec,
            StreamConfig::Audio(a) => &a.codec,
        }
    }
}

/// Codec private options, passed through to the encoder unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncoderOptions(BTreeMap<String, String>);

impl EncoderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Container path; the backend picks the format from the extension.
    pub output: PathBuf,
    #[serde(default)]
    pub video: Option<VideoConfig>,
    #[serde(default)]
    pub audio: Option<AudioConfig>,
    #[serde(default)]
    pub options: EncoderOptions,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EncodeError::InvalidConfig(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            EncodeError::InvalidConfig(format!("read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Rejects settings no encoder could accept, before anything is opened.
    pub fn validate(&self) -> Result<()> {
        if self.video.is_none() && self.audio.is_none() {
            return Err(EncodeError::InvalidConfig(
                "at least one of video or audio must be enabled".to_string(),
            ));
        }
        if self.output.as_os_str().is_empty() {
            return Err(EncodeError::InvalidConfig("output path is empty".to_string()));
        }
        if let Some(video) = &self.video {
            if video.width == 0 || video.height == 0 {
                return Err(EncodeError::InvalidConfig(format!(
                    "video size {}x{}",
                    video.width, video.height
                )));
            }
            if video.pixel_format.is_subsampled() && (video.width % 2 != 0 || video.height % 2 != 0)
            {
                return Err(EncodeError::InvalidConfig(format!(
                    "{} needs even dimensions, got {}x{}",
                    video.pixel_format.name(),
                    video.width,
                    video.height
                )));
            }
            if video.frame_rate == 0 || video.frame_rate > i32::MAX as u32 {
                return Err(EncodeError::InvalidConfig(format!(
                    "video frame rate {}",
                    video.frame_rate
                )));
            }
        }
        if let Some(audio) = &self.audio {
            if audio.sample_rate == 0 || audio.sample_rate > i32::MAX as u32 {
                return Err(EncodeError::InvalidConfig(format!(
                    "audio sample rate {}",
                    audio.sample_rate
                )));
            }
            if audio.channels == 0 {
                return Err(EncodeError::InvalidConfig(
                    "audio needs at least one channel".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct PipelineConfigBuilder {
    output: Option<PathBuf>,
    video: Option<VideoConfig>,
    audio: Option<AudioConfig>,
    options: EncoderOptions,
}

impl PipelineConfigBuilder {
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn video(mut self, video: VideoConfig) -> Self {
        self.video = Some(video);
        self
    }

    pub fn audio(mut self, audio: AudioConfig) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.set(key, value);
        self
    }

    pub fn build(self) -> Result<PipelineConfig> {
        let config = PipelineConfig {
            output: self
                .output
                .ok_or_else(|| EncodeError::InvalidConfig("output is required".to_string()))?,
            video: self.video,
            audio: self.audio,
            options: self.options,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn builder_collects_streams_and_options() {
        let config = PipelineConfig::builder()
            .output("out.mp4")
            .video(VideoConfig::new("libx264", 640, 480, 25))
            .audio(AudioConfig::new("aac", 44100))
            .option("preset", "ultrafast")
            .build()
            .unwrap();

        assert_eq!(config.output, PathBuf::from("out.mp4"));
        assert_eq!(config.video.as_ref().unwrap().gop_size, 12);
        assert_eq!(config.audio.as_ref().unwrap().channels, 2);
        assert_eq!(config.options.get("preset"), Some("ultrafast"));
    }

    #[test]
    fn builder_requires_output_and_a_stream() {
        assert!(matches!(
            PipelineConfig::builder()
                .video(VideoConfig::new("mpeg4", 2, 2, 1))
                .build(),
            Err(EncodeError::InvalidConfig(_))
        ));
        assert!(matches!(
            PipelineConfig::builder().output("a.mkv").build(),
            Err(EncodeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn odd_dimensions_are_rejected_for_420() {
        let err = PipelineConfig::builder()
            .output("a.mp4")
            .video(VideoConfig::new("mpeg4", 641, 480, 25))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("even dimensions"), "{err}");

        let mut rgb = VideoConfig::new("rawvideo", 641, 481, 25);
        rgb.pixel_format = PixelFormat::Rgb24;
        assert!(
            PipelineConfig::builder()
                .output("a.nut")
                .video(rgb)
                .build()
                .is_ok()
        );
    }

    #[test]
    fn json_defaults_are_filled_in() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "output": "capture.mkv",
                "video": { "codec": "mpeg4", "width": 320, "height": 240,
                           "frame_rate": 30, "bit_rate": 800000 },
                "audio": { "codec": "aac", "sample_rate": 48000, "bit_rate": 96000,
                           "sample_format": "fltp" },
                "options": { "threads": "2" }
            }"#,
        )
        .unwrap();

        let video = config.video.unwrap();
        assert_eq!(video.pixel_format, PixelFormat::Yuv420p);
        assert_eq!(video.max_b_frames, None);
        assert!(!video.hardware);
        let audio = config.audio.unwrap();
        assert_eq!(audio.sample_format, Some(SampleFormat::F32p));
        assert_eq!(audio.channels, 2);
        assert_eq!(config.options.get("threads"), Some("2"));
    }

    #[test]
    fn unknown_pixel_format_in_json_is_rejected() {
        let err = PipelineConfig::from_json_str(
            r#"{ "output": "a.mp4",
                 "video": { "codec": "mpeg4", "width": 2, "height": 2, "frame_rate": 1,
                            "bit_rate": 1, "pixel_format": "yuv9" } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("yuv9"), "{err}");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "output": "tone.wav", "audio": {{ "codec": "pcm_s16le", "sample_rate": 8000, "bit_rate": 0 }} }}"#
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert!(config.video.is_none());
        assert_eq!(config.audio.unwrap().sample_rate, 8000);
        assert!(matches!(
            PipelineConfig::from_json_file("/nonexistent/pipeline.json"),
            Err(EncodeError::InvalidConfig(_))
        ));
    }
}
