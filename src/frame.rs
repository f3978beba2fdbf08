use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, Result};

/// Row strides, plane offsets and the buffer start are all multiples of this.
pub const FRAME_ALIGN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => f.write_str("video"),
            MediaKind::Audio => f.write_str("audio"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum PixelFormat {
    Yuv420p,
    Nv12,
    Rgb24,
    Bgra,
}

impl PixelFormat {
    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgra => "bgra",
        }
    }

    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::Yuv420p => 3,
            PixelFormat::Nv12 => 2,
            PixelFormat::Rgb24 | PixelFormat::Bgra => 1,
        }
    }

    /// 4:2:0 formats need even output dimensions for most encoders.
    pub fn is_subsampled(self) -> bool {
        matches!(self, PixelFormat::Yuv420p | PixelFormat::Nv12)
    }

    /// `(row_bytes, rows)` for every plane.
    fn planes(self, width: usize, height: usize) -> Option<Vec<(usize, usize)>> {
        let cw = width.div_ceil(2);
        let ch = height.div_ceil(2);
        let planes = match self {
            PixelFormat::Yuv420p => vec![(width, height), (cw, ch), (cw, ch)],
            PixelFormat::Nv12 => vec![(width, height), (cw.checked_mul(2)?, ch)],
            PixelFormat::Rgb24 => vec![(width.checked_mul(3)?, height)],
            PixelFormat::Bgra => vec![(width.checked_mul(4)?, height)],
        };
        Some(planes)
    }
}

impl FromStr for PixelFormat {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "yuv420p" => Ok(PixelFormat::Yuv420p),
            "nv12" => Ok(PixelFormat::Nv12),
            "rgb24" => Ok(PixelFormat::Rgb24),
            "bgra" => Ok(PixelFormat::Bgra),
            other => Err(EncodeError::UnsupportedFormat(format!(
                "pixel format '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for PixelFormat {
    type Error = EncodeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PixelFormat> for &'static str {
    fn from(value: PixelFormat) -> Self {
        value.name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum SampleFormat {
    /// signed 16-bit, channels interleaved
    S16,
    /// signed 16-bit, one plane per channel
    S16p,
    /// 32-bit float, channels interleaved
    F32,
    /// 32-bit float, one plane per channel
    F32p,
}

impl SampleFormat {
    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::S16 => "s16",
            SampleFormat::S16p => "s16p",
            SampleFormat::F32 => "flt",
            SampleFormat::F32p => "fltp",
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16 | SampleFormat::S16p => 2,
            SampleFormat::F32 | SampleFormat::F32p => 4,
        }
    }

    pub fn is_planar(self) -> bool {
        matches!(self, SampleFormat::S16p | SampleFormat::F32p)
    }

    fn planes(self, channels: usize, samples: usize) -> Option<Vec<(usize, usize)>> {
        let per_channel = samples.checked_mul(self.bytes_per_sample())?;
        if self.is_planar() {
            Some(vec![(per_channel, 1); channels])
        } else {
            Some(vec![(per_channel.checked_mul(channels)?, 1)])
        }
    }
}

impl FromStr for SampleFormat {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "s16" => Ok(SampleFormat::S16),
            "s16p" => Ok(SampleFormat::S16p),
            "flt" => Ok(SampleFormat::F32),
            "fltp" => Ok(SampleFormat::F32p),
            other => Err(EncodeError::UnsupportedFormat(format!(
                "sample format '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for SampleFormat {
    type Error = EncodeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SampleFormat> for &'static str {
    fn from(value: SampleFormat) -> Self {
        value.name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_format: SampleFormat,
    pub channels: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Video(VideoFormat),
    Audio(AudioFormat),
}

impl FrameFormat {
    pub fn kind(&self) -> MediaKind {
        match self {
            FrameFormat::Video(_) => MediaKind::Video,
            FrameFormat::Audio(_) => MediaKind::Audio,
        }
    }
}

impl Display for FrameFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameFormat::Video(v) => write!(
                f,
                "{} {}x{}",
                v.pixel_format.name(),
                v.width,
                v.height
            ),
            FrameFormat::Audio(a) => {
                write!(f, "{} {}ch", a.sample_format.name(), a.channels)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Plane {
    offset: usize,
    stride: usize,
    row_bytes: usize,
    rows: usize,
}

impl Plane {
    // stride * rows is checked when the plane is laid out
    fn len(&self) -> usize {
        self.stride * self.rows
    }
}

struct AlignedBuf {
    buf: Vec<u8>,
    start: usize,
    len: usize,
}

impl AlignedBuf {
    fn alloc(len: usize) -> Result<Self> {
        let total = len
            .checked_add(FRAME_ALIGN)
            .ok_or(EncodeError::AllocationFailure(len))?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(total)
            .map_err(|_| EncodeError::AllocationFailure(total))?;
        buf.resize(total, 0);
        let start = match buf.as_ptr().align_offset(FRAME_ALIGN) {
            offset if offset < FRAME_ALIGN => offset,
            _ => 0,
        };
        Ok(Self { buf, start, len })
    }

    fn as_slice(&self) -> &[u8] {
        &self.buf[self.start..self.start + self.len]
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf[self.start..self.start + self.len]
    }
}

/// Who owns the frame's memory.
enum FrameData {
    /// One buffer allocated here; planes are sub-ranges of it.
    Owned(AlignedBuf),
    /// Caller planes referenced without copying. Dropping them only releases our reference.
    Borrowed(Vec<Bytes>),
}

struct FrameInner {
    format: FrameFormat,
    samples: usize,
    planes: Vec<Plane>,
    data: FrameData,
}

/// One decoded video picture or block of audio samples.
///
/// Cloning (or [`RawFrame::retain`]) yields another owning handle to the same
/// buffer; the buffer is freed when the last handle is released or dropped.
/// A freshly built frame has exactly one handle, which travels through the
/// queue to the encode worker and is released there after encoding.
#[derive(Clone)]
pub struct RawFrame {
    inner: Arc<FrameInner>,
}

fn align_up(n: usize) -> Option<usize> {
    Some(n.checked_add(FRAME_ALIGN - 1)? & !(FRAME_ALIGN - 1))
}

/// Lays planes out back to back with aligned strides. Returns the planes and total size.
fn aligned_layout(geometry: &[(usize, usize)]) -> Option<(Vec<Plane>, usize)> {
    let mut planes = Vec::with_capacity(geometry.len());
    let mut offset = 0usize;
    for &(row_bytes, rows) in geometry {
        let stride = align_up(row_bytes)?;
        planes.push(Plane {
            offset,
            stride,
            row_bytes,
            rows,
        });
        offset = offset.checked_add(stride.checked_mul(rows)?)?;
    }
    Some((planes, offset))
}

impl RawFrame {
    fn alloc(format: FrameFormat, samples: usize, geometry: Vec<(usize, usize)>) -> Result<Self> {
        let (planes, size) =
            aligned_layout(&geometry).ok_or(EncodeError::AllocationFailure(usize::MAX))?;
        let buf = AlignedBuf::alloc(size)?;
        Ok(Self {
            inner: Arc::new(FrameInner {
                format,
                samples,
                planes,
                data: FrameData::Owned(buf),
            }),
        })
    }

    /// Allocates a zeroed picture. Strides are rounded up to [`FRAME_ALIGN`] bytes.
    pub fn make_video(pixel_format: PixelFormat, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(EncodeError::InvalidLayout(format!(
                "video size {}x{}",
                width, height
            )));
        }
        let geometry = pixel_format
            .planes(width as usize, height as usize)
            .ok_or(EncodeError::AllocationFailure(usize::MAX))?;
        let format = FrameFormat::Video(VideoFormat {
            pixel_format,
            width,
            height,
        });
        Self::alloc(format, 0, geometry)
    }

    /// Allocates zeroed samples. Packed formats use a single plane, planar ones
    /// one aligned plane per channel, all inside the same buffer.
    pub fn make_audio(sample_format: SampleFormat, channels: u16, samples: usize) -> Result<Self> {
        if channels == 0 || samples == 0 {
            return Err(EncodeError::InvalidLayout(format!(
                "audio {} channels x {} samples",
                channels, samples
            )));
        }
        let geometry = sample_format
            .planes(channels as usize, samples)
            .ok_or(EncodeError::AllocationFailure(usize::MAX))?;
        let format = FrameFormat::Audio(AudioFormat {
            sample_format,
            channels,
        });
        Self::alloc(format, samples, geometry)
    }

    /// Copies planar image data with arbitrary strides into a new aligned frame.
    pub fn video_from_planes(
        pixel_format: PixelFormat,
        width: u32,
        height: u32,
        planes: &[&[u8]],
        strides: &[usize],
    ) -> Result<Self> {
        let mut frame = Self::make_video(pixel_format, width, height)?;
        if planes.len() != pixel_format.plane_count() || strides.len() != planes.len() {
            return Err(EncodeError::InvalidLayout(format!(
                "{} expects {} planes, got {} planes and {} strides",
                pixel_format.name(),
                pixel_format.plane_count(),
                planes.len(),
                strides.len()
            )));
        }
        let layout = frame.inner.planes.clone();
        for (i, (src, &src_stride)) in planes.iter().zip(strides).enumerate() {
            let dst_plane = layout[i];
            let needed = src_stride
                .checked_mul(dst_plane.rows - 1)
                .and_then(|n| n.checked_add(dst_plane.row_bytes));
            if src_stride < dst_plane.row_bytes || needed.is_none_or(|n| src.len() < n) {
                return Err(EncodeError::InvalidLayout(format!(
                    "plane {}: stride {} with {} bytes cannot hold {} rows of {} bytes",
                    i,
                    src_stride,
                    src.len(),
                    dst_plane.rows,
                    dst_plane.row_bytes
                )));
            }
            let dst = frame
                .plane_mut(i)
                .ok_or_else(|| EncodeError::InvalidLayout("frame is shared".to_string()))?;
            for row in 0..dst_plane.rows {
                let s = &src[row * src_stride..row * src_stride + dst_plane.row_bytes];
                let d = row * dst_plane.stride;
                dst[d..d + dst_plane.row_bytes].copy_from_slice(s);
            }
        }
        Ok(frame)
    }

    /// Copies packed native-endian 16-bit samples into a new frame.
    pub fn audio_from_s16(channels: u16, samples: usize, data: &[i16]) -> Result<Self> {
        let mut frame = Self::make_audio(SampleFormat::S16, channels, samples)?;
        if data.len() != channels as usize * samples {
            return Err(EncodeError::InvalidLayout(format!(
                "expected {} samples for {} channels, got {}",
                channels as usize * samples,
                channels,
                data.len()
            )));
        }
        let dst = frame
            .plane_mut(0)
            .ok_or_else(|| EncodeError::InvalidLayout("frame is shared".to_string()))?;
        for (chunk, sample) in dst.chunks_exact_mut(2).zip(data) {
            chunk.copy_from_slice(&sample.to_ne_bytes());
        }
        Ok(frame)
    }

    /// References caller planes without copying. Every stride must be a
    /// multiple of [`FRAME_ALIGN`] and every plane must hold `stride * rows` bytes.
    pub fn wrap_video(
        pixel_format: PixelFormat,
        width: u32,
        height: u32,
        planes: Vec<Bytes>,
        strides: &[usize],
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(EncodeError::InvalidLayout(format!(
                "video size {}x{}",
                width, height
            )));
        }
        let geometry = pixel_format
            .planes(width as usize, height as usize)
            .ok_or_else(|| EncodeError::InvalidLayout("video size overflows".to_string()))?;
        if planes.len() != geometry.len() || strides.len() != geometry.len() {
            return Err(EncodeError::InvalidLayout(format!(
                "{} expects {} planes, got {} planes and {} strides",
                pixel_format.name(),
                geometry.len(),
                planes.len(),
                strides.len()
            )));
        }
        let mut layout = Vec::with_capacity(geometry.len());
        for (i, ((row_bytes, rows), &stride)) in geometry.into_iter().zip(strides).enumerate() {
            if stride % FRAME_ALIGN != 0 || stride < row_bytes {
                return Err(EncodeError::InvalidLayout(format!(
                    "plane {}: stride {} must be a multiple of {} and at least {}",
                    i, stride, FRAME_ALIGN, row_bytes
                )));
            }
            let Some(needed) = stride.checked_mul(rows) else {
                return Err(EncodeError::InvalidLayout(format!(
                    "plane {}: stride {} times {} rows overflows",
                    i, stride, rows
                )));
            };
            if planes[i].len() < needed {
                return Err(EncodeError::InvalidLayout(format!(
                    "plane {}: {} bytes, need {}",
                    i,
                    planes[i].len(),
                    needed
                )));
            }
            layout.push(Plane {
                offset: 0,
                stride,
                row_bytes,
                rows,
            });
        }
        Ok(Self {
            inner: Arc::new(FrameInner {
                format: FrameFormat::Video(VideoFormat {
                    pixel_format,
                    width,
                    height,
                }),
                samples: 0,
                planes: layout,
                data: FrameData::Borrowed(planes),
            }),
        })
    }

    /// References caller sample planes without copying: one plane for packed
    /// formats, one per channel for planar formats.
    pub fn wrap_audio(
        sample_format: SampleFormat,
        channels: u16,
        samples: usize,
        planes: Vec<Bytes>,
    ) -> Result<Self> {
        if channels == 0 || samples == 0 {
            return Err(EncodeError::InvalidLayout(format!(
                "audio {} channels x {} samples",
                channels, samples
            )));
        }
        let geometry = sample_format
            .planes(channels as usize, samples)
            .ok_or_else(|| EncodeError::InvalidLayout("audio size overflows".to_string()))?;
        if planes.len() != geometry.len() {
            return Err(EncodeError::InvalidLayout(format!(
                "{} with {} channels expects {} planes, got {}",
                sample_format.name(),
                channels,
                geometry.len(),
                planes.len()
            )));
        }
        let mut layout = Vec::with_capacity(geometry.len());
        for (i, (row_bytes, _)) in geometry.into_iter().enumerate() {
            if planes[i].len() < row_bytes {
                return Err(EncodeError::InvalidLayout(format!(
                    "plane {}: {} bytes, need {}",
                    i,
                    planes[i].len(),
                    row_bytes
                )));
            }
            layout.push(Plane {
                offset: 0,
                stride: row_bytes,
                row_bytes,
                rows: 1,
            });
        }
        Ok(Self {
            inner: Arc::new(FrameInner {
                format: FrameFormat::Audio(AudioFormat {
                    sample_format,
                    channels,
                }),
                samples,
                planes: layout,
                data: FrameData::Borrowed(planes),
            }),
        })
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.format.kind()
    }

    pub fn format(&self) -> FrameFormat {
        self.inner.format
    }

    pub fn video_format(&self) -> Option<VideoFormat> {
        match self.inner.format {
            FrameFormat::Video(v) => Some(v),
            FrameFormat::Audio(_) => None,
        }
    }

    pub fn audio_format(&self) -> Option<AudioFormat> {
        match self.inner.format {
            FrameFormat::Audio(a) => Some(a),
            FrameFormat::Video(_) => None,
        }
    }

    /// Samples per channel; 0 for video.
    pub fn samples(&self) -> usize {
        self.inner.samples
    }

    /// Length of the owned buffer. Borrowed frames own nothing and report 0.
    pub fn size(&self) -> usize {
        match &self.inner.data {
            FrameData::Owned(buf) => buf.len,
            FrameData::Borrowed(_) => 0,
        }
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self.inner.data, FrameData::Borrowed(_))
    }

    pub fn plane_count(&self) -> usize {
        self.inner.planes.len()
    }

    pub fn stride(&self, index: usize) -> Option<usize> {
        self.inner.planes.get(index).map(|p| p.stride)
    }

    /// Meaningful bytes per row, excluding stride padding.
    pub fn row_bytes(&self, index: usize) -> Option<usize> {
        self.inner.planes.get(index).map(|p| p.row_bytes)
    }

    pub fn rows(&self, index: usize) -> Option<usize> {
        self.inner.planes.get(index).map(|p| p.rows)
    }

    /// The `stride * rows` bytes of one plane.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        let plane = self.inner.planes.get(index)?;
        match &self.inner.data {
            FrameData::Owned(buf) => buf.as_slice().get(plane.offset..plane.offset + plane.len()),
            FrameData::Borrowed(planes) => planes.get(index)?.get(..plane.len()),
        }
    }

    /// Writable plane; only for owned frames with a single handle.
    pub fn plane_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let inner = Arc::get_mut(&mut self.inner)?;
        let plane = *inner.planes.get(index)?;
        match &mut inner.data {
            FrameData::Owned(buf) => buf
                .as_mut_slice()
                .get_mut(plane.offset..plane.offset + plane.len()),
            FrameData::Borrowed(_) => None,
        }
    }

    /// Whole owned buffer; only for owned frames with a single handle.
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        let inner = Arc::get_mut(&mut self.inner)?;
        match &mut inner.data {
            FrameData::Owned(buf) => Some(buf.as_mut_slice()),
            FrameData::Borrowed(_) => None,
        }
    }

    /// Takes an extra owning handle, keeping the buffer alive past the worker's release.
    pub fn retain(&self) -> RawFrame {
        self.clone()
    }

    /// Gives up this handle and returns how many handles remain. 0 means the
    /// buffer has been freed.
    pub fn release(self) -> usize {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => {
                drop(inner);
                0
            }
            Err(shared) => Arc::strong_count(&shared) - 1,
        }
    }

    /// Number of live handles, this one included.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("format", &self.inner.format)
            .field("samples", &self.inner.samples)
            .field("size", &self.size())
            .field("borrowed", &self.is_borrowed())
            .field("holders", &self.holders())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn yuv420p_layout_is_aligned() {
        let frame = RawFrame::make_video(PixelFormat::Yuv420p, 101, 51).unwrap();
        assert_eq!(frame.kind(), MediaKind::Video);
        assert_eq!(frame.plane_count(), 3);
        assert_eq!(frame.stride(0), Some(128));
        assert_eq!(frame.stride(1), Some(64));
        assert_eq!(frame.row_bytes(1), Some(51));
        assert_eq!(frame.rows(0), Some(51));
        assert_eq!(frame.rows(2), Some(26));
        assert_eq!(frame.size(), 128 * 51 + 64 * 26 * 2);
        for i in 0..3 {
            let plane = frame.plane(i).unwrap();
            assert_eq!(plane.as_ptr() as usize % FRAME_ALIGN, 0);
        }
    }

    #[test]
    fn packed_and_planar_audio() {
        let packed = RawFrame::make_audio(SampleFormat::S16, 2, 1024).unwrap();
        assert_eq!(packed.plane_count(), 1);
        assert_eq!(packed.size(), 4096);
        assert_eq!(packed.samples(), 1024);

        let planar = RawFrame::make_audio(SampleFormat::F32p, 2, 1000).unwrap();
        assert_eq!(planar.plane_count(), 2);
        assert_eq!(planar.row_bytes(0), Some(4000));
        assert_eq!(planar.stride(0), Some(4000));
        assert_eq!(planar.plane(1).unwrap().as_ptr() as usize % FRAME_ALIGN, 0);
    }

    #[test]
    fn oversized_frame_is_allocation_failure() {
        let err = RawFrame::make_video(PixelFormat::Rgb24, u32::MAX, u32::MAX).unwrap_err();
        assert!(matches!(err, EncodeError::AllocationFailure(_)), "{err}");
    }

    #[test]
    fn zero_sized_frames_are_rejected() {
        assert!(matches!(
            RawFrame::make_video(PixelFormat::Bgra, 0, 10),
            Err(EncodeError::InvalidLayout(_))
        ));
        assert!(matches!(
            RawFrame::make_audio(SampleFormat::S16, 0, 10),
            Err(EncodeError::InvalidLayout(_))
        ));
    }

    #[test]
    fn unknown_format_names_are_unsupported() {
        assert!(matches!(
            "yuv410p".parse::<PixelFormat>(),
            Err(EncodeError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            "dbl".parse::<SampleFormat>(),
            Err(EncodeError::UnsupportedFormat(_))
        ));
        assert_eq!("fltp".parse::<SampleFormat>().unwrap(), SampleFormat::F32p);
        assert_eq!("nv12".parse::<PixelFormat>().unwrap(), PixelFormat::Nv12);
    }

    #[test]
    fn release_without_retain_frees() {
        let frame = RawFrame::make_audio(SampleFormat::S16, 1, 16).unwrap();
        let weak = Arc::downgrade(&frame.inner);
        assert_eq!(frame.release(), 0);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn retained_frame_survives_first_release() {
        let frame = RawFrame::make_video(PixelFormat::Rgb24, 4, 4).unwrap();
        let weak = Arc::downgrade(&frame.inner);
        let extra = frame.retain();
        assert_eq!(frame.holders(), 2);

        assert_eq!(frame.release(), 1);
        assert!(weak.upgrade().is_some());
        assert_eq!(extra.plane(0).unwrap().len(), 32 * 4);

        assert_eq!(extra.release(), 0);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn wrapped_planes_are_not_copied_or_freed() {
        let y = Bytes::from(vec![1u8; 32 * 2]);
        let u = Bytes::from(vec![2u8; 32]);
        let v = Bytes::from(vec![3u8; 32]);
        let frame = RawFrame::wrap_video(
            PixelFormat::Yuv420p,
            4,
            2,
            vec![y.clone(), u.clone(), v.clone()],
            &[32, 32, 32],
        )
        .unwrap();
        assert!(frame.is_borrowed());
        assert_eq!(frame.size(), 0);
        assert_eq!(frame.plane(0).unwrap().as_ptr(), y.as_ptr());

        assert_eq!(frame.release(), 0);
        // caller buffers are untouched
        assert_eq!(y[0], 1);
        assert_eq!(v.len(), 32);
    }

    #[test]
    fn wrap_rejects_unaligned_stride() {
        let err = RawFrame::wrap_video(
            PixelFormat::Rgb24,
            4,
            1,
            vec![Bytes::from(vec![0u8; 12])],
            &[12],
        )
        .unwrap_err();
        assert!(matches!(err, EncodeError::InvalidLayout(_)));
    }

    #[test]
    fn huge_strides_are_invalid_layouts() {
        let huge = usize::MAX / 2 + 1;
        assert!(matches!(
            RawFrame::video_from_planes(PixelFormat::Rgb24, 2, 3, &[&[0u8; 64]], &[huge]),
            Err(EncodeError::InvalidLayout(_))
        ));
        // a multiple of FRAME_ALIGN, so only the size check can reject it
        let err = RawFrame::wrap_video(
            PixelFormat::Rgb24,
            2,
            3,
            vec![Bytes::from(vec![0u8; 64])],
            &[huge],
        )
        .unwrap_err();
        assert!(matches!(err, EncodeError::InvalidLayout(_)), "{err}");
    }

    #[test]
    fn wrapped_frames_are_not_writable() {
        let mut frame = RawFrame::wrap_audio(
            SampleFormat::S16,
            1,
            4,
            vec![Bytes::from_static(&[0u8; 8])],
        )
        .unwrap();
        assert!(frame.data_mut().is_none());
        assert!(frame.plane_mut(0).is_none());
    }

    #[test]
    fn copies_tight_planes_into_aligned_frame() {
        let y: Vec<u8> = (0..6).collect();
        let u = [100u8, 101];
        let v = [200u8, 201];
        let frame = RawFrame::video_from_planes(
            PixelFormat::Yuv420p,
            3,
            2,
            &[&y, &u, &v],
            &[3, 2, 2],
        )
        .unwrap();
        let plane = frame.plane(0).unwrap();
        assert_eq!(&plane[..3], &[0, 1, 2]);
        assert_eq!(&plane[32..35], &[3, 4, 5]);
        assert_eq!(&frame.plane(2).unwrap()[..2], &[200, 201]);
    }

    #[test]
    fn audio_from_s16_checks_length() {
        let frame = RawFrame::audio_from_s16(2, 2, &[1, -1, 2, -2]).unwrap();
        let bytes = frame.plane(0).unwrap();
        assert_eq!(&bytes[..2], &1i16.to_ne_bytes());
        assert_eq!(&bytes[2..4], &(-1i16).to_ne_bytes());

        assert!(matches!(
            RawFrame::audio_from_s16(2, 2, &[1, 2, 3]),
            Err(EncodeError::InvalidLayout(_))
        ));
    }

    #[test]
    fn formats_round_trip_through_serde() {
        let json = serde_json::to_string(&PixelFormat::Yuv420p).unwrap();
        assert_eq!(json, "\"yuv420p\"");
        let parsed: SampleFormat = serde_json::from_str("\"fltp\"").unwrap();
        assert_eq!(parsed, SampleFormat::F32p);
        assert!(serde_json::from_str::<PixelFormat>("\"p010\"").is_err());
    }
}
