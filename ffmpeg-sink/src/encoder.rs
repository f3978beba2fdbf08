use bytes::Bytes;
use ffmpeg_next::{Dictionary, codec};
use lite_encoder::codec::{Converter, Encoder, Packet};
use lite_encoder::{
    AudioConfig, AudioFormat, EncoderOptions, FrameFormat, PixelFormat, RawFrame, Rational,
    SampleFormat, VideoConfig, VideoFormat,
};

use crate::convert;
use crate::hw::{find_hw_encoder, pixel_format_for_encoder};
use crate::resampler::Resampler;
use crate::scaler::Scaler;

pub enum EncoderType {
    Video(codec::encoder::Video),
    Audio(codec::encoder::Audio),
}

impl EncoderType {
    pub fn send_eof(&mut self) -> anyhow::Result<()> {
        match self {
            EncoderType::Video(encoder) => encoder.send_eof()?,
            EncoderType::Audio(encoder) => encoder.send_eof()?,
        }
        Ok(())
    }

    pub fn receive_packet(&mut self) -> anyhow::Result<Option<Packet>> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        let encode_result = match self {
            EncoderType::Video(encoder) => encoder.receive_packet(&mut packet),
            EncoderType::Audio(encoder) => encoder.receive_packet(&mut packet),
        };

        match encode_result {
            Ok(()) => Ok(Some(Packet {
                data: Bytes::copy_from_slice(packet.data().unwrap_or_default()),
                pts: packet.pts(),
                dts: packet.dts(),
                duration: packet.duration(),
                key: packet.is_key(),
            })),
            Err(ffmpeg_next::Error::Other { errno })
                if errno == ffmpeg_next::util::error::EAGAIN =>
            {
                Ok(None)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn parameters(&self) -> codec::Parameters {
        match self {
            EncoderType::Video(encoder) => codec::Parameters::from(encoder),
            EncoderType::Audio(encoder) => codec::Parameters::from(encoder),
        }
    }
}

/// Codec options as an FFmpeg dictionary. libx264 without options gets the
/// low latency defaults.
fn dictionary(options: &EncoderOptions, codec_name: &str) -> Dictionary<'static> {
    let mut dict = Dictionary::new();
    if options.is_empty() && codec_name == "libx264" {
        dict.set("preset", "ultrafast");
        dict.set("tune", "zerolatency");
    }
    for (key, value) in options.iter() {
        dict.set(key, value);
    }
    dict
}

fn context_time_base(context: &codec::Context) -> ffmpeg_next::Rational {
    unsafe { (*context.as_ptr()).time_base.into() }
}

pub struct AvEncoder {
    inner: EncoderType,
    codec_name: String,
    time_base: Rational,
    input_format: FrameFormat,
    frame_size: Option<usize>,
    sample_rate: u32,
}

impl AvEncoder {
    pub fn open_video(
        config: &VideoConfig,
        options: &EncoderOptions,
        global_header: bool,
    ) -> anyhow::Result<Self> {
        let open = |codec: ffmpeg_next::Codec,
                    pixel_format: PixelFormat|
         -> anyhow::Result<codec::encoder::Video> {
            let mut encoder = codec::Context::new_with_codec(codec).encoder().video()?;
            encoder.set_width(config.width);
            encoder.set_height(config.height);
            encoder.set_format(convert::pixel_to_av(pixel_format));
            encoder.set_frame_rate(Some(ffmpeg_next::Rational::new(
                config.frame_rate as i32,
                1,
            )));
            encoder.set_time_base(ffmpeg_next::Rational::new(1, config.frame_rate as i32));
            encoder.set_bit_rate(config.bit_rate as usize);
            encoder.set_gop(config.gop_size);
            if let Some(max_b_frames) = config.max_b_frames {
                encoder.set_max_b_frames(max_b_frames as usize);
            }
            if global_header {
                encoder.set_flags(codec::Flags::GLOBAL_HEADER);
            }
            Ok(encoder.open_with(dictionary(options, codec.name()))?)
        };

        let software = || -> anyhow::Result<(codec::encoder::Video, String, PixelFormat)> {
            let codec = ffmpeg_next::encoder::find_by_name(&config.codec)
                .ok_or(anyhow::anyhow!("codec not found: {}", config.codec))?;
            let encoder = open(codec, config.pixel_format)?;
            Ok((encoder, config.codec.clone(), config.pixel_format))
        };

        // Try hardware encoder first, then fall back to software encoder.
        let hardware = if config.hardware {
            find_hw_encoder(&config.codec)
        } else {
            None
        };
        let (encoder, codec_name, pixel_format) = match hardware {
            Some(hw_codec) => {
                let hw_name = hw_codec.name().to_string();
                let pixel_format = pixel_format_for_encoder(config.pixel_format, &hw_name);
                log::info!("attempting hardware encoder: {}", hw_name);
                match open(hw_codec, pixel_format) {
                    Ok(encoder) => (encoder, hw_name, pixel_format),
                    Err(e) => {
                        log::warn!(
                            "hardware encoder {} failed: {}, falling back to {}",
                            hw_name,
                            e,
                            config.codec
                        );
                        software()?
                    }
                }
            }
            None => software()?,
        };
        log::info!("encoder opened successfully: {}", codec_name);

        let time_base = convert::rational_from_av(context_time_base(&encoder));
        Ok(Self {
            inner: EncoderType::Video(encoder),
            codec_name,
            time_base,
            input_format: FrameFormat::Video(VideoFormat {
                pixel_format,
                width: config.width,
                height: config.height,
            }),
            frame_size: None,
            sample_rate: 0,
        })
    }

    pub fn open_audio(
        config: &AudioConfig,
        options: &EncoderOptions,
        global_header: bool,
    ) -> anyhow::Result<Self> {
        let codec = ffmpeg_next::encoder::find_by_name(&config.codec)
            .ok_or(anyhow::anyhow!("codec not found: {}", config.codec))?;
        let sample_format = match config.sample_format {
            Some(format) => format,
            None => first_supported_format(codec)?,
        };

        let mut encoder = codec::Context::new_with_codec(codec).encoder().audio()?;
        encoder.set_rate(config.sample_rate as i32);
        encoder.set_channel_layout(convert::channel_layout(config.channels));
        encoder.set_format(convert::sample_to_av(sample_format));
        encoder.set_bit_rate(config.bit_rate as usize);
        encoder.set_time_base(ffmpeg_next::Rational::new(1, config.sample_rate as i32));
        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_with(dictionary(options, &config.codec))?;
        log::info!("encoder opened successfully: {}", config.codec);

        let frame_size = match encoder.frame_size() {
            0 => None,
            n => Some(n as usize),
        };
        let time_base = convert::rational_from_av(context_time_base(&encoder));
        Ok(Self {
            inner: EncoderType::Audio(encoder),
            codec_name: config.codec.clone(),
            time_base,
            input_format: FrameFormat::Audio(AudioFormat {
                sample_format,
                channels: config.channels,
            }),
            frame_size,
            sample_rate: config.sample_rate,
        })
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    pub fn parameters(&self) -> codec::Parameters {
        self.inner.parameters()
    }
}

/// The codec's preferred sample format among the ones raw frames can hold.
fn first_supported_format(codec: ffmpeg_next::Codec) -> anyhow::Result<SampleFormat> {
    let audio = codec.audio()?;
    match audio.formats() {
        None => Ok(SampleFormat::S16),
        Some(mut formats) => formats.find_map(convert::sample_from_av).ok_or(anyhow::anyhow!(
            "{} supports none of s16, s16p, flt, fltp",
            codec.name()
        )),
    }
}

impl Encoder for AvEncoder {
    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn input_format(&self) -> FrameFormat {
        self.input_format
    }

    fn frame_size(&self) -> Option<usize> {
        self.frame_size
    }

    fn converter(&mut self, source: &FrameFormat) -> anyhow::Result<Box<dyn Converter>> {
        match (*source, self.input_format) {
            (FrameFormat::Video(source), FrameFormat::Video(target)) => {
                Ok(Box::new(Scaler::new(source, target)?))
            }
            (FrameFormat::Audio(source), FrameFormat::Audio(target)) => {
                Ok(Box::new(Resampler::new(source, target, self.sample_rate)?))
            }
            _ => anyhow::bail!("cannot convert {} to {}", source, self.input_format),
        }
    }

    fn send_frame(&mut self, frame: &RawFrame, pts: i64) -> anyhow::Result<()> {
        match &mut self.inner {
            EncoderType::Video(encoder) => {
                let mut av = convert::to_av_video(frame)?;
                av.set_pts(Some(pts));
                encoder.send_frame(&av)?;
            }
            EncoderType::Audio(encoder) => {
                let mut av = convert::to_av_audio(frame, self.sample_rate)?;
                av.set_pts(Some(pts));
                encoder.send_frame(&av)?;
            }
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<Packet>> {
        self.inner.receive_packet()
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()
    }
}

// codec contexts are used by one thread at a time: the opener, then the encode worker
unsafe impl Send for AvEncoder {}
