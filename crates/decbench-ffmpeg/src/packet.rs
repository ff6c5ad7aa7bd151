//! Owned compressed-packet wrapper.

use ffmpeg_sys_next::{AVPacket, av_packet_clone, av_packet_free};

/// An owned, reference-counted `AVPacket`.
///
/// The reader reuses one packet buffer across `av_read_frame` calls, so
/// packets handed to the channel are cloned — a refcount bump on the shared
/// payload buffer, not a deep copy.  Whoever holds the `OwnedPacket` owns
/// that reference and releases it on drop.
pub struct OwnedPacket {
    ptr: *mut AVPacket,
}

// SAFETY: the packet is exclusively owned and AVPacket refcounting is
// thread-safe; the pointer is never aliased across threads.
unsafe impl Send for OwnedPacket {}

impl OwnedPacket {
    /// Clone `src` into an owned packet.  Returns `None` on allocation
    /// failure.
    ///
    /// # Safety
    /// `src` must point to a valid, initialized `AVPacket`.
    pub unsafe fn from_clone(src: *const AVPacket) -> Option<Self> {
        let ptr = unsafe { av_packet_clone(src) };
        if ptr.is_null() { None } else { Some(Self { ptr }) }
    }

    pub fn as_ptr(&self) -> *const AVPacket {
        self.ptr
    }
}

impl Drop for OwnedPacket {
    fn drop(&mut self) {
        // SAFETY: ptr was produced by av_packet_clone and is owned here.
        unsafe { av_packet_free(&mut self.ptr) };
    }
}
