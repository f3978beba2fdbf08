//! Copies between [`RawFrame`] and FFmpeg frames, plus format name mapping.

use ffmpeg_next::format::{Pixel, Sample, sample::Type};
use ffmpeg_next::{ChannelLayout, frame};
use lite_encoder::{AudioFormat, PixelFormat, RawFrame, SampleFormat, VideoFormat};

pub fn pixel_to_av(format: PixelFormat) -> Pixel {
    match format {
        PixelFormat::Yuv420p => Pixel::YUV420P,
        PixelFormat::Nv12 => Pixel::NV12,
        PixelFormat::Rgb24 => Pixel::RGB24,
        PixelFormat::Bgra => Pixel::BGRA,
    }
}

pub fn pixel_from_av(pixel: Pixel) -> Option<PixelFormat> {
    match pixel {
        Pixel::YUV420P => Some(PixelFormat::Yuv420p),
        Pixel::NV12 => Some(PixelFormat::Nv12),
        Pixel::RGB24 => Some(PixelFormat::Rgb24),
        Pixel::BGRA => Some(PixelFormat::Bgra),
        _ => None,
    }
}

pub fn sample_to_av(format: SampleFormat) -> Sample {
    match format {
        SampleFormat::S16 => Sample::I16(Type::Packed),
        SampleFormat::S16p => Sample::I16(Type::Planar),
        SampleFormat::F32 => Sample::F32(Type::Packed),
        SampleFormat::F32p => Sample::F32(Type::Planar),
    }
}

pub fn sample_from_av(sample: Sample) -> Option<SampleFormat> {
    match sample {
        Sample::I16(Type::Packed) => Some(SampleFormat::S16),
        Sample::I16(Type::Planar) => Some(SampleFormat::S16p),
        Sample::F32(Type::Packed) => Some(SampleFormat::F32),
        Sample::F32(Type::Planar) => Some(SampleFormat::F32p),
        _ => None,
    }
}

pub fn rational_to_av(r: lite_encoder::Rational) -> ffmpeg_next::Rational {
    ffmpeg_next::Rational::new(r.num, r.den)
}

pub fn rational_from_av(r: ffmpeg_next::Rational) -> lite_encoder::Rational {
    lite_encoder::Rational::new(r.numerator(), r.denominator())
}

pub fn channel_layout(channels: u16) -> ChannelLayout {
    ChannelLayout::default(channels as i32)
}

/// Copies row by row, skipping padding on either side.
fn copy_rows(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    row_bytes: usize,
    rows: usize,
) {
    for row in 0..rows {
        let s = &src[row * src_stride..row * src_stride + row_bytes];
        dst[row * dst_stride..row * dst_stride + row_bytes].copy_from_slice(s);
    }
}

pub fn to_av_video(raw: &RawFrame) -> anyhow::Result<frame::Video> {
    let VideoFormat {
        pixel_format,
        width,
        height,
    } = raw
        .video_format()
        .ok_or_else(|| anyhow::anyhow!("expected a video frame, got {}", raw.kind()))?;
    let mut av = frame::Video::new(pixel_to_av(pixel_format), width, height);
    for i in 0..raw.plane_count() {
        let (Some(src), Some(stride), Some(row_bytes), Some(rows)) =
            (raw.plane(i), raw.stride(i), raw.row_bytes(i), raw.rows(i))
        else {
            anyhow::bail!("plane {} missing", i);
        };
        let dst_stride = av.stride(i);
        copy_rows(src, stride, av.data_mut(i), dst_stride, row_bytes, rows);
    }
    Ok(av)
}

pub fn from_av_video(av: &frame::Video) -> anyhow::Result<RawFrame> {
    let pixel_format = pixel_from_av(av.format())
        .ok_or_else(|| anyhow::anyhow!("unsupported pixel format {:?}", av.format()))?;
    let planes: Vec<&[u8]> = (0..av.planes()).map(|i| av.data(i)).collect();
    let strides: Vec<usize> = (0..av.planes()).map(|i| av.stride(i)).collect();
    Ok(RawFrame::video_from_planes(
        pixel_format,
        av.width(),
        av.height(),
        &planes,
        &strides,
    )?)
}

pub fn to_av_audio(raw: &RawFrame, rate: u32) -> anyhow::Result<frame::Audio> {
    let AudioFormat {
        sample_format,
        channels,
    } = raw
        .audio_format()
        .ok_or_else(|| anyhow::anyhow!("expected an audio frame, got {}", raw.kind()))?;
    let mut av = frame::Audio::new(
        sample_to_av(sample_format),
        raw.samples(),
        channel_layout(channels),
    );
    av.set_rate(rate);
    for i in 0..raw.plane_count() {
        let (Some(src), Some(row_bytes)) = (raw.plane(i), raw.row_bytes(i)) else {
            anyhow::bail!("plane {} missing", i);
        };
        av.data_mut(i)[..row_bytes].copy_from_slice(&src[..row_bytes]);
    }
    Ok(av)
}

pub fn from_av_audio(av: &frame::Audio, channels: u16) -> anyhow::Result<RawFrame> {
    let sample_format = sample_from_av(av.format())
        .ok_or_else(|| anyhow::anyhow!("unsupported sample format {:?}", av.format()))?;
    let mut raw = RawFrame::make_audio(sample_format, channels, av.samples())?;
    for i in 0..raw.plane_count() {
        let row_bytes = raw.row_bytes(i).unwrap_or(0);
        let dst = raw
            .plane_mut(i)
            .ok_or_else(|| anyhow::anyhow!("plane {} missing", i))?;
        dst[..row_bytes].copy_from_slice(&av.data(i)[..row_bytes]);
    }
    Ok(raw)
}
