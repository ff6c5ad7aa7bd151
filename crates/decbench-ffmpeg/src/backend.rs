//! [`MediaBackend`] implementation tying reader and decoder construction
//! together per stream.

use decbench_core::{MediaBackend, Result};

use crate::decoder::FfmpegStreamDecoder;
use crate::packet::OwnedPacket;
use crate::reader::FfmpegPacketReader;

/// Stream count at or above which codec-internal threading is disabled:
/// with enough concurrent streams, frame-level parallelism inside one
/// codec only steals cores from the others.
const MULTI_THREAD_STREAM_LIMIT: u32 = 4;

pub struct FfmpegBackend {
    source: String,
    is_live: bool,
    cores: u32,
}

impl FfmpegBackend {
    pub fn new(source: impl Into<String>, is_live: bool, cores: u32) -> Self {
        Self {
            source: source.into(),
            is_live,
            cores: cores.max(1),
        }
    }

    /// Codec-internal thread budget for one stream of an N-stream test.
    pub fn decoder_threads(&self, stream_count: u32) -> i32 {
        if stream_count >= MULTI_THREAD_STREAM_LIMIT {
            1
        } else {
            (self.cores / stream_count.max(1)).max(1) as i32
        }
    }
}

impl MediaBackend for FfmpegBackend {
    type Packet = OwnedPacket;
    type Source = FfmpegPacketReader;
    type Decoder = FfmpegStreamDecoder;

    fn open_stream(&self, stream_count: u32) -> Result<(Self::Source, Self::Decoder)> {
        let reader = FfmpegPacketReader::open(&self.source, self.is_live)?;
        // SAFETY: the parameters pointer is valid while `reader` lives,
        // and the decoder copies them before this call returns.
        let decoder = unsafe {
            FfmpegStreamDecoder::open_from_params(
                reader.codec_parameters(),
                self.decoder_threads(stream_count),
            )?
        };
        Ok((reader, decoder))
    }
}
