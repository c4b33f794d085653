// crates/vigil-media/src/encode.rs
//
// H.264 single-stream sink shared by the re-broadcast and recorder stages.
//
// Design:
//   • `EncoderConfig` — the codec parameters the ingest stage hands its
//     children at spawn time (dimensions + frame rate).
//   • `H264Sink` — owns the output muxer, the opened encoder, the lazy
//     YUV420P scaler, and the monotonic timestamp guard. One sink per
//     open output (an RTMP session, or one recorder segment).
//
// PTS strategy:
//   Frames are stamped with a monotonically increasing frame counter in the
//   1/fps encoder time base; packets are rescaled to the muxer-assigned
//   stream time base and then pass through `MonotonicTs`, which repairs
//   AV_NOPTS_VALUE and non-increasing values the encoder may emit.
//
// Encoder ownership:
//   The encoder context is created with `new_with_codec` and never
//   retrieved from the output stream — `Stream::codec()` does not exist in
//   this version of ffmpeg-the-third. Copying the opened context into the
//   stream's codecpar goes through avcodec_parameters_from_context FFI.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{self, Id as CodecId};
use ffmpeg::encoder;
use ffmpeg::format::{self, Pixel};
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags as ScaleFlags};
use ffmpeg::util::frame::video::Video;
use ffmpeg::util::rational::Rational;
use ffmpeg::Packet;

use vigil_core::config;

use crate::error::StageError;
use crate::timestamp::{packet_duration, MonotonicTs};

/// Everything a child stage needs to configure its encoder, captured from
/// the ingest decoder at spawn time. Immutable after startup.
#[derive(Debug, Clone, Copy)]
pub struct EncoderConfig {
    pub width:  u32,
    pub height: u32,
    pub fps:    u32,
}

pub struct H264Sink {
    octx:         format::context::Output,
    encoder:      encoder::video::Video,
    stream_index: usize,
    enc_tb:       Rational,
    ost_tb:       Rational,
    ts:           MonotonicTs,
    scaler:       Option<(Pixel, u32, u32, SwsContext)>,
    frame_idx:    i64,
    cfg:          EncoderConfig,
}

impl H264Sink {
    /// Add one H.264 video stream to `octx`, open the encoder, and write the
    /// container header. The caller chooses the container by how it opened
    /// `octx` (`flv` for RTMP, `mp4` for recorder segments).
    pub fn open(mut octx: format::context::Output, cfg: EncoderConfig) -> Result<Self, StageError> {
        let enc_tb = Rational::new(1, cfg.fps as i32);

        let h264 = encoder::find(CodecId::H264).ok_or(StageError::EncoderMissing)?;

        let mut ost = octx.add_stream(h264).map_err(StageError::EncoderInitFailed)?;
        ost.set_time_base(enc_tb);
        let stream_index = ost.index();

        let enc_ctx = codec::context::Context::new_with_codec(h264);
        let mut video_enc = enc_ctx
            .encoder()
            .video()
            .map_err(StageError::EncoderInitFailed)?;

        video_enc.set_width(cfg.width);
        video_enc.set_height(cfg.height);
        video_enc.set_format(Pixel::YUV420P);
        video_enc.set_time_base(enc_tb);
        video_enc.set_frame_rate(Some(Rational::new(cfg.fps as i32, 1)));
        video_enc.set_bit_rate(config::REBROADCAST_BITRATE);
        video_enc.set_gop(config::GOP_SIZE);
        // No B-frames: a live sink wants DTS == PTS and minimal latency.
        video_enc.set_max_b_frames(0);

        if octx.format().flags().contains(format::Flags::GLOBAL_HEADER) {
            video_enc.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = ffmpeg::Dictionary::new();
        opts.set("preset", "veryfast");
        opts.set("tune", "zerolatency");

        let encoder = video_enc
            .open_as_with(h264, opts)
            .map_err(StageError::EncoderInitFailed)?;

        // Copy the opened encoder's params into the stream's codecpar so the
        // muxer sees resolution, format, and codec-private data. There is no
        // safe setter for this in ffmpeg-the-third; FFI is the only path.
        unsafe {
            let ret = ffmpeg::ffi::avcodec_parameters_from_context(
                (**(*octx.as_mut_ptr()).streams.add(stream_index)).codecpar,
                encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
            );
            if ret < 0 {
                return Err(StageError::EncoderInitFailed(ffmpeg::Error::from(ret)));
            }
        }

        octx.write_header().map_err(StageError::HeaderWriteFailed)?;

        // The muxer may rewrite the stream time base during write_header;
        // read it back for packet rescaling.
        let ost_tb = octx
            .stream(stream_index)
            .map(|s| s.time_base())
            .unwrap_or(enc_tb);
        let ts = MonotonicTs::new(packet_duration(cfg.fps, ost_tb));

        Ok(Self {
            octx,
            encoder,
            stream_index,
            enc_tb,
            ost_tb,
            ts,
            scaler: None,
            frame_idx: 0,
            cfg,
        })
    }

    /// Scale `frame` to the encoder's YUV420P geometry, stamp the counter
    /// PTS, encode, and interleave-write every produced packet.
    pub fn encode(&mut self, frame: &Video) -> Result<(), StageError> {
        let key = (frame.format(), frame.width(), frame.height());
        let stale = !matches!(&self.scaler, Some((f, w, h, _)) if (*f, *w, *h) == key);
        if stale {
            let ctx = SwsContext::get(
                frame.format(), frame.width(), frame.height(),
                Pixel::YUV420P, self.cfg.width, self.cfg.height,
                ScaleFlags::BILINEAR,
            )
            .map_err(|_| StageError::UnsupportedPixelFormat(frame.format()))?;
            self.scaler = Some((key.0, key.1, key.2, ctx));
        }

        let mut yuv = Video::empty();
        let (.., scaler) = self.scaler.as_mut().expect("scaler just built");
        scaler
            .run(frame, &mut yuv)
            .map_err(|_| StageError::UnsupportedPixelFormat(frame.format()))?;

        yuv.set_pts(Some(self.frame_idx));
        self.frame_idx += 1;

        if let Err(e) = self.encoder.send_frame(&yuv) {
            // A single rejected frame is not fatal; the counter PTS keeps
            // the output timeline contiguous regardless.
            log::warn!("encoder rejected frame: {e}");
            return Ok(());
        }
        self.write_packets()
    }

    /// Flush the encoder and finalize the container.
    pub fn finish(mut self) -> Result<(), StageError> {
        if let Err(e) = self.encoder.send_eof() {
            log::warn!("encoder EOF signal failed: {e}");
        }
        self.write_packets()?;
        self.octx
            .write_trailer()
            .map_err(StageError::PacketWriteFailed)?;
        Ok(())
    }

    fn write_packets(&mut self) -> Result<(), StageError> {
        let mut pkt = Packet::empty();
        while self.encoder.receive_packet(&mut pkt).is_ok() {
            pkt.set_stream(self.stream_index);
            pkt.rescale_ts(self.enc_tb, self.ost_tb);
            self.ts.apply(&mut pkt);
            pkt.write_interleaved(&mut self.octx)
                .map_err(StageError::PacketWriteFailed)?;
        }
        Ok(())
    }
}
