//! Media contracts shared between the backend and the engine.
//!
//! These traits break the dependency between `decbench-ffmpeg` and
//! `decbench-engine` by providing a neutral home: the engine drives any
//! [`MediaBackend`], the FFmpeg crate supplies the production one, and tests
//! supply synthetic ones.

use crate::error::Result;

// ─── Packet source (demuxer → channel) ───────────────────────────────────

/// Outcome of pulling one unit of work from a packet source.
pub enum ReadOutcome<P> {
    /// A compressed video packet, owned by the caller.
    Packet(P),
    /// A packet belonging to a non-video substream was read and released.
    NonVideo,
    /// File-mode end of input: the source has already sought back to the
    /// start.  The consumer's decoder must be flushed before packets from
    /// the next loop are decoded.
    LoopSeam,
    /// Live-mode end of input.  Terminal.
    EndOfStream,
    /// Fatal read error.  Terminal.
    Error(String),
}

/// Produces compressed video packets from one source.
///
/// Implementations: FFmpeg demuxer over a file or RTSP URL, synthetic
/// sources in tests.  One instance is owned per stream; `next_packet` is a
/// single cooperative step so a pool thread can service many sources.
pub trait PacketSource: Send + 'static {
    type Packet: Send + 'static;

    /// Pull the next unit of work.  Never blocks longer than one demuxer
    /// read.
    fn next_packet(&mut self) -> ReadOutcome<Self::Packet>;
}

// ─── Stream decoder (channel → frames) ───────────────────────────────────

/// Outcome of submitting one compressed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Exactly one frame was produced.
    Frame,
    /// The codec needs more input before it can emit a frame (normal
    /// back-pressure from B-frame reordering).
    NeedMore,
}

/// Decodes compressed packets into frames, counting but not retaining them.
pub trait StreamDecoder: Send + 'static {
    type Packet;

    /// Submit one packet and attempt to pull one frame.
    fn submit(&mut self, packet: &Self::Packet) -> Result<SubmitOutcome>;

    /// Discard internal codec state at a loop seam.  Produces no frames.
    fn flush_buffers(&mut self);

    /// After the stop signal, collect one remaining buffered frame.
    /// `Ok(true)` while frames keep emerging, `Ok(false)` once drained.
    fn drain(&mut self) -> Result<bool>;
}

// ─── Backend (per-stream construction) ───────────────────────────────────

/// Constructs matched reader/decoder pairs for the engine.
///
/// `open_stream` receives the stream count of the current test so the
/// backend can budget codec-internal threads across streams.
pub trait MediaBackend: Send + Sync + 'static {
    type Packet: Send + 'static;
    type Source: PacketSource<Packet = Self::Packet>;
    type Decoder: StreamDecoder<Packet = Self::Packet>;

    fn open_stream(&self, stream_count: u32) -> Result<(Self::Source, Self::Decoder)>;
}

// ─── Source description ──────────────────────────────────────────────────

/// Video codecs the benchmark accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    H265,
    Vp9,
    Av1,
    Unknown,
}

impl VideoCodec {
    pub fn name(self) -> &'static str {
        match self {
            Self::H264 => "H.264",
            Self::H265 => "H.265",
            Self::Vp9 => "VP9",
            Self::Av1 => "AV1",
            Self::Unknown => "Unknown",
        }
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Metadata extracted from a source before the sweep starts.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// Path or URL as given on the command line.
    pub path: String,
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    /// Native frame rate of the video substream.
    pub fps: f64,
    /// Container duration in seconds (0 when unknown, e.g. live).
    pub duration_seconds: f64,
    /// Frame count, taken from the stream or estimated from duration × fps.
    pub total_frames: i64,
    /// Index of the first video substream.
    pub video_stream_index: i32,
    /// True for RTSP and other non-seekable sources whose EOF is terminal.
    pub is_live_stream: bool,
}

impl SourceInfo {
    /// Human-readable resolution class ("720p", "1080p", "4K", ...).
    pub fn resolution_label(&self) -> String {
        match self.height {
            h if h >= 2160 => "4K".to_string(),
            h if h >= 1440 => "1440p".to_string(),
            h if h >= 1080 => "1080p".to_string(),
            h if h >= 720 => "720p".to_string(),
            h if h >= 480 => "480p".to_string(),
            h => format!("{h}p"),
        }
    }
}

/// Whether a source string names a live RTSP endpoint.
pub fn is_rtsp_url(source: &str) -> bool {
    source.starts_with("rtsp://") || source.starts_with("rtsps://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_labels() {
        let mut info = SourceInfo {
            path: "a.mp4".into(),
            codec: VideoCodec::H264,
            width: 1920,
            height: 1080,
            fps: 30.0,
            duration_seconds: 10.0,
            total_frames: 300,
            video_stream_index: 0,
            is_live_stream: false,
        };
        assert_eq!(info.resolution_label(), "1080p");
        info.height = 2160;
        assert_eq!(info.resolution_label(), "4K");
        info.height = 360;
        assert_eq!(info.resolution_label(), "360p");
    }

    #[test]
    fn rtsp_url_classification() {
        assert!(is_rtsp_url("rtsp://camera.local/live"));
        assert!(is_rtsp_url("rtsps://camera.local/live"));
        assert!(!is_rtsp_url("/data/video.mp4"));
        assert!(!is_rtsp_url("http://host/video.mp4"));
    }

    #[test]
    fn codec_support() {
        assert!(VideoCodec::H264.is_supported());
        assert!(VideoCodec::Av1.is_supported());
        assert!(!VideoCodec::Unknown.is_supported());
        assert_eq!(VideoCodec::H265.name(), "H.265");
    }
}
