use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lite_encoder::codec::{Encoder, Output, Packet};
use lite_encoder::{EncoderOptions, Rational, StreamConfig};

use crate::convert;
use crate::encoder::AvEncoder;
use crate::hw::find_hw_encoder;

pub struct AvOutput {
    inner: ffmpeg_next::format::context::Output,
    path: PathBuf,
    streams: HashMap<usize, StreamConfig>,
    have_written_header: bool,
    have_written_trailer: bool,
}

impl AvOutput {
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        let output = ffmpeg_next::format::output(path)
            .map_err(|e| anyhow::anyhow!("open {}: {}", path.display(), e))?;
        Ok(Self {
            inner: output,
            path: path.to_path_buf(),
            streams: HashMap::new(),
            have_written_header: false,
            have_written_trailer: false,
        })
    }

    fn global_header(&self) -> bool {
        self.inner
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER)
    }
}

impl Output for AvOutput {
    fn add_stream(&mut self, config: &StreamConfig) -> anyhow::Result<usize> {
        let name = config.codec();
        let codec = ffmpeg_next::encoder::find_by_name(name)
            .or_else(|| find_hw_encoder(name))
            .ok_or(anyhow::anyhow!("codec not found: {}", name))?;
        let stream = self.inner.add_stream(codec)?;
        let index = stream.index();
        self.streams.insert(index, config.clone());
        Ok(index)
    }

    fn open_encoder(
        &mut self,
        index: usize,
        options: &EncoderOptions,
    ) -> anyhow::Result<Box<dyn Encoder>> {
        let config = match self.streams.get(&index) {
            Some(config) => config.clone(),
            None => return Err(anyhow::anyhow!("stream not found")),
        };
        let global_header = self.global_header();
        let encoder = match &config {
            StreamConfig::Video(video) => AvEncoder::open_video(video, options, global_header)?,
            StreamConfig::Audio(audio) => AvEncoder::open_audio(audio, options, global_header)?,
        };

        let mut stream = self
            .inner
            .stream_mut(index)
            .ok_or(anyhow::anyhow!("stream not found"))?;
        stream.set_parameters(encoder.parameters());
        stream.set_time_base(convert::rational_to_av(encoder.time_base()));
        log::debug!(
            "stream {} encodes with {} at {}",
            index,
            encoder.codec_name(),
            encoder.time_base()
        );
        Ok(Box::new(encoder))
    }

    fn write_header(&mut self) -> anyhow::Result<()> {
        self.inner.write_header()?;
        self.have_written_header = true;
        log::info!("wrote header: {}", self.path.display());
        Ok(())
    }

    fn stream_time_base(&self, index: usize) -> Rational {
        self.inner
            .stream(index)
            .map(|stream| convert::rational_from_av(stream.time_base()))
            .unwrap_or(Rational::new(0, 1))
    }

    fn write_packet(&mut self, index: usize, packet: Packet) -> anyhow::Result<()> {
        if !self.have_written_header {
            anyhow::bail!("packet for stream {} before header", index);
        }
        let mut p = ffmpeg_next::Packet::copy(&packet.data);
        p.set_pts(packet.pts);
        p.set_dts(packet.dts);
        p.set_duration(packet.duration);
        p.set_stream(index);
        p.set_position(-1);
        if packet.key {
            p.set_flags(ffmpeg_next::packet::Flags::KEY);
        }
        p.write_interleaved(&mut self.inner)?;
        Ok(())
    }

    fn write_trailer(&mut self) -> anyhow::Result<()> {
        if self.have_written_header && !self.have_written_trailer {
            self.have_written_trailer = true;
            self.inner.write_trailer()?;
            log::info!("wrote trailer: {}", self.path.display());
        }
        Ok(())
    }
}

// the format context is owned by one thread at a time: the opener, then the encode worker
unsafe impl Send for AvOutput {}
