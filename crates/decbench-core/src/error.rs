//! Typed error hierarchy for the benchmark.
//!
//! Uses `thiserror` for library-grade errors.  Each variant maps to a stable
//! integer code via [`BenchError::error_code`] so the CLI can report a
//! meaningful exit status without string parsing.

/// All errors originating from the benchmark crates.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    // ── Source / probe ────────────────────────────────────────────────
    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Failed to open source: {0}")]
    SourceOpen(String),

    // ── Streaming / decode ────────────────────────────────────────────
    #[error("Read error: {0}")]
    Read(String),

    #[error("Stream ended")]
    StreamEnded,

    #[error("Decode error: {0}")]
    Decode(String),

    /// A specific stream failed during a test; aborts the sweep with the
    /// first message seen.
    #[error("Stream {id}: {message}")]
    Stream { id: u32, message: String },

    // ── Topology / harness ────────────────────────────────────────────
    #[error("Topology error: {0}")]
    Topology(String),

    // ── Platform monitors ─────────────────────────────────────────────
    #[error("Monitor error: {0}")]
    Monitor(String),

    // ── Configuration / output ────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Export error: {0}")]
    Export(String),

    // ── Audit invariants ──────────────────────────────────────────────
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl BenchError {
    /// Stable integer error code for exit statuses and structured output.
    ///
    /// Codes are grouped by category:
    /// - 1xx: source / probe
    /// - 2xx: streaming / decode
    /// - 3xx: topology / harness
    /// - 4xx: platform monitors
    /// - 5xx: configuration / output
    /// - 6xx: invariant
    pub fn error_code(&self) -> u32 {
        match self {
            Self::Probe(_) => 100,
            Self::UnsupportedCodec(_) => 101,
            Self::SourceOpen(_) => 102,
            Self::Read(_) => 200,
            Self::StreamEnded => 201,
            Self::Decode(_) => 202,
            Self::Stream { .. } => 203,
            Self::Topology(_) => 300,
            Self::Monitor(_) => 400,
            Self::Config(_) => 500,
            Self::Export(_) => 501,
            Self::InvariantViolation(_) => 600,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_grouped_by_category() {
        assert_eq!(BenchError::Probe("x".into()).error_code(), 100);
        assert_eq!(BenchError::StreamEnded.error_code(), 201);
        assert_eq!(BenchError::Topology("x".into()).error_code(), 300);
        assert_eq!(BenchError::InvariantViolation("x".into()).error_code(), 600);
    }

    #[test]
    fn stream_ended_message_is_stable() {
        // The harness matches on this text when a live source closes.
        assert_eq!(BenchError::StreamEnded.to_string(), "Stream ended");
    }
}
