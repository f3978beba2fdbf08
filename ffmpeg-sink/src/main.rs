//! Encodes a synthetic test pattern and tone.
//!
//! `ffmpeg-sink [output]` writes five seconds of mpeg4/aac. Set
//! `LITE_ENCODER_CONFIG` to a JSON pipeline config to encode something else.

use std::f32::consts::TAU;
use std::time::Duration;

use lite_encoder::{
    AudioConfig, FrameSender, Pipeline, PipelineConfig, PixelFormat, RawFrame, VideoConfig,
};
use tokio_util::sync::CancellationToken;

const CONFIG_ENV: &str = "LITE_ENCODER_CONFIG";
const DURATION_SECS: u64 = 5;
// aac takes 1024 samples per frame
const AUDIO_CHUNK: usize = 1024;
const TONE_HZ: f32 = 440.0;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_module("lite_encoder", log::LevelFilter::Debug)
        .filter_module("ffmpeg_sink", log::LevelFilter::Debug)
        .init();
}

fn load_config() -> anyhow::Result<PipelineConfig> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PipelineConfig::from_json_file(path)?);
    }
    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "test-pattern.mp4".to_string());
    Ok(PipelineConfig::builder()
        .output(output)
        .video(VideoConfig::new("mpeg4", 640, 360, 25))
        .audio(AudioConfig::new("aac", 44100))
        .build()?)
}

/// Moving RGB bars; the encoder converts them to its own pixel format.
fn test_pattern(width: u32, height: u32, index: u64) -> anyhow::Result<RawFrame> {
    let mut frame = RawFrame::make_video(PixelFormat::Rgb24, width, height)?;
    let stride = frame.stride(0).unwrap_or(0);
    let plane = frame
        .plane_mut(0)
        .ok_or(anyhow::anyhow!("new frame is not writable"))?;
    let shift = (index * 4) as usize;
    for y in 0..height as usize {
        let row = &mut plane[y * stride..y * stride + width as usize * 3];
        for (x, pixel) in row.chunks_exact_mut(3).enumerate() {
            pixel[0] = ((x + shift) % 256) as u8;
            pixel[1] = (y % 256) as u8;
            pixel[2] = ((index * 8) % 256) as u8;
        }
    }
    Ok(frame)
}

fn produce_video(
    sender: FrameSender,
    config: VideoConfig,
    cancel: CancellationToken,
) -> anyhow::Result<u64> {
    let interval = Duration::from_secs(1) / config.frame_rate;
    let total = config.frame_rate as u64 * DURATION_SECS;
    let mut produced = 0;
    while produced < total && !cancel.is_cancelled() {
        sender.push(test_pattern(config.width, config.height, produced)?)?;
        produced += 1;
        std::thread::sleep(interval);
    }
    Ok(produced)
}

fn produce_audio(
    sender: FrameSender,
    config: AudioConfig,
    cancel: CancellationToken,
) -> anyhow::Result<u64> {
    let rate = config.sample_rate as usize;
    let channels = config.channels as usize;
    let interval = Duration::from_secs_f64(AUDIO_CHUNK as f64 / rate as f64);
    let total = (rate * DURATION_SECS as usize).div_ceil(AUDIO_CHUNK) as u64;
    let mut samples = vec![0i16; AUDIO_CHUNK * channels];
    let mut position = 0usize;
    let mut produced = 0;
    while produced < total && !cancel.is_cancelled() {
        for frame in samples.chunks_exact_mut(channels) {
            let t = position as f32 / rate as f32;
            let value = ((TAU * TONE_HZ * t).sin() * i16::MAX as f32 * 0.25) as i16;
            frame.fill(value);
            position += 1;
        }
        sender.push(RawFrame::audio_from_s16(
            config.channels,
            AUDIO_CHUNK,
            &samples,
        )?)?;
        produced += 1;
        std::thread::sleep(interval);
    }
    Ok(produced)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    ffmpeg_sink::init()?;
    let config = load_config()?;
    log::info!("config: {}", serde_json::to_string(&config)?);

    let mut pipeline = Pipeline::open(config.clone(), &ffmpeg_sink::FfmpegBackend)?;
    let cancel = CancellationToken::new();

    let mut producers = Vec::new();
    if let Some(video) = config.video.clone() {
        let (sender, cancel) = (pipeline.sender(), cancel.clone());
        producers.push(tokio::task::spawn_blocking(move || {
            produce_video(sender, video, cancel)
        }));
    }
    if let Some(audio) = config.audio.clone() {
        let (sender, cancel) = (pipeline.sender(), cancel.clone());
        producers.push(tokio::task::spawn_blocking(move || {
            produce_audio(sender, audio, cancel)
        }));
    }

    let producing = async {
        let mut frames = 0;
        for producer in producers {
            frames += producer.await??;
        }
        anyhow::Ok(frames)
    };
    tokio::pin!(producing);

    let produced = tokio::select! {
        result = &mut producing => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupted, finishing {}", config.output.display());
            cancel.cancel();
            producing.await
        }
    };
    match produced {
        Ok(frames) => log::info!("produced {} frames", frames),
        Err(e) => log::error!("producer failed: {:#}", e),
    }

    pipeline.flush();
    pipeline.close_async().await?;
    Ok(())
}
