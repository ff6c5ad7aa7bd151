//! FFmpeg FFI helpers — error translation, string conversion, and the
//! RTSP option dictionary.

use std::ffi::CString;
use std::fmt::{Display, Formatter};

use ffmpeg_sys_next::{AVDictionary, av_dict_free, av_dict_set, av_strerror};

/// POSIX EAGAIN — used with AVERROR() for "try again" semantics.
pub const EAGAIN: i32 = 11;

/// Structured FFmpeg error details for module-specific wrapping.
#[derive(Debug, Clone)]
pub struct FfmpegErrorDetail {
    /// Operation that failed (e.g. `"avformat_open_input"`).
    pub context: String,
    /// Raw FFmpeg error code (negative AVERROR value).
    pub code: i32,
    /// Human-readable message from `av_strerror`.
    pub message: String,
}

impl Display for FfmpegErrorDetail {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} (code {})", self.context, self.message, self.code)
    }
}

/// Translate an FFmpeg return code into a structured error.
///
/// On success (`ret >= 0`) this is a no-op.
pub fn check_ffmpeg(ret: i32, context: &str) -> std::result::Result<(), FfmpegErrorDetail> {
    if ret >= 0 {
        return Ok(());
    }
    Err(FfmpegErrorDetail {
        context: context.to_string(),
        code: ret,
        message: error_string(ret),
    })
}

/// Human-readable message for an FFmpeg error code.
pub fn error_string(ret: i32) -> String {
    let mut buf = [0 as std::ffi::c_char; 256];
    // SAFETY: buf is a valid mutable buffer of known length.
    unsafe {
        av_strerror(ret, buf.as_mut_ptr(), buf.len());
    }
    unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) }
        .to_str()
        .unwrap_or("unknown error")
        .to_string()
}

/// Convert a Rust `&str` to a `CString`, mapping NUL bytes to an error.
pub fn to_cstring(s: &str) -> std::result::Result<CString, String> {
    CString::new(s).map_err(|e| format!("Invalid path string: {e}"))
}

/// Owned `AVDictionary` of open options.
pub struct OptionDict {
    dict: *mut AVDictionary,
}

impl OptionDict {
    /// Standard options for live RTSP sources: TCP transport and a 5-second
    /// socket timeout.
    pub fn rtsp() -> Self {
        let mut dict: *mut AVDictionary = std::ptr::null_mut();
        // SAFETY: av_dict_set allocates the dictionary on first call; the
        // key/value literals are valid C strings.
        unsafe {
            av_dict_set(&mut dict, c"rtsp_transport".as_ptr(), c"tcp".as_ptr(), 0);
            av_dict_set(&mut dict, c"stimeout".as_ptr(), c"5000000".as_ptr(), 0);
        }
        Self { dict }
    }

    pub fn empty() -> Self {
        Self {
            dict: std::ptr::null_mut(),
        }
    }

    /// Pointer handed to `avformat_open_input`, which consumes entries and
    /// may reallocate the dictionary.
    pub fn as_mut_ptr(&mut self) -> *mut *mut AVDictionary {
        &mut self.dict
    }
}

impl Drop for OptionDict {
    fn drop(&mut self) {
        if !self.dict.is_null() {
            // SAFETY: dict was allocated by av_dict_set.
            unsafe { av_dict_free(&mut self.dict) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_ffmpeg_passes_non_negative() {
        assert!(check_ffmpeg(0, "op").is_ok());
        assert!(check_ffmpeg(42, "op").is_ok());
    }

    #[test]
    fn check_ffmpeg_reports_context_and_code() {
        let err = check_ffmpeg(-22, "avcodec_open2").expect_err("negative code");
        assert_eq!(err.context, "avcodec_open2");
        assert_eq!(err.code, -22);
        assert!(err.to_string().contains("avcodec_open2"));
    }

    #[test]
    fn to_cstring_rejects_interior_nul() {
        assert!(to_cstring("ok.mp4").is_ok());
        assert!(to_cstring("bad\0path").is_err());
    }
}
