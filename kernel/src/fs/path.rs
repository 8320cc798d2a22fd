//! Path text validation and NUL-separated segment iteration.
//!
//! Paths are passed as a single byte slice with segments separated by a
//! single NUL byte rather than `/`, mirroring the wire-friendly encoding
//! the syscall ABI uses for variable-length path arguments. `VerifyPathText`
//! from the reference implementation is reproduced here as
//! [`verify_path_text`]: empty segments, a leading or trailing separator,
//! a segment containing `/` or `\` (reserved so a NUL-separated path can
//! never be confused with a slash-joined one), and embedded control bytes
//! below 0x20 are all rejected up front so every later traversal step can
//! assume a well-formed segment list.

use crate::error::{KernelError, KernelResult};

pub const PATH_SEPARATOR: u8 = 0;
pub const MAX_PATH_BYTES: usize = 4096;
pub const MAX_SEGMENT_BYTES: usize = 255;

/// Validate a NUL-separated path, returning nothing on success.
///
/// Rejects: paths longer than [`MAX_PATH_BYTES`], a leading or trailing
/// separator (which would imply an empty first/last segment), any empty
/// segment, any segment longer than [`MAX_SEGMENT_BYTES`], and any byte
/// below `0x20` other than the separator itself.
pub fn verify_path_text(path: &[u8]) -> KernelResult<()> {
    if path.is_empty() {
        return Err(KernelError::InvalidPath {
            reason: "path is empty",
        });
    }
    if path.len() > MAX_PATH_BYTES {
        return Err(KernelError::InvalidPath {
            reason: "path exceeds maximum length",
        });
    }
    if path[0] == PATH_SEPARATOR || path[path.len() - 1] == PATH_SEPARATOR {
        return Err(KernelError::InvalidPath {
            reason: "leading or trailing separator",
        });
    }
    for segment in path.split(|&b| b == PATH_SEPARATOR) {
        if segment.is_empty() {
            return Err(KernelError::InvalidPath {
                reason: "empty path segment",
            });
        }
        if segment.len() > MAX_SEGMENT_BYTES {
            return Err(KernelError::InvalidPath {
                reason: "path segment exceeds maximum length",
            });
        }
        if segment.iter().any(|&b| b < 0x20) {
            return Err(KernelError::InvalidPath {
                reason: "control byte in path segment",
            });
        }
        if segment.iter().any(|&b| b == b'/' || b == b'\\') {
            return Err(KernelError::InvalidPath {
                reason: "path segment contains a slash",
            });
        }
    }
    Ok(())
}

/// Iterate the NUL-separated segments of an already-verified path.
pub fn segments(path: &[u8]) -> impl Iterator<Item = &[u8]> {
    path.split(|&b| b == PATH_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_path() {
        let path = b"usr\0bin\0ls";
        assert!(verify_path_text(path).is_ok());
        let segs: alloc::vec::Vec<&[u8]> = segments(path).collect();
        assert_eq!(segs, [&b"usr"[..], &b"bin"[..], &b"ls"[..]]);
    }

    #[test]
    fn rejects_empty_path() {
        assert!(verify_path_text(b"").is_err());
    }

    #[test]
    fn rejects_leading_separator() {
        assert!(verify_path_text(b"\0usr").is_err());
    }

    #[test]
    fn rejects_trailing_separator() {
        assert!(verify_path_text(b"usr\0").is_err());
    }

    #[test]
    fn rejects_empty_segment() {
        assert!(verify_path_text(b"usr\0\0bin").is_err());
    }

    #[test]
    fn rejects_control_byte() {
        assert!(verify_path_text(b"usr\0bi\x01n").is_err());
    }

    #[test]
    fn rejects_embedded_slash_in_segment() {
        assert!(verify_path_text(b"Sys/tem").is_err());
        assert!(verify_path_text(b"Sys\\tem").is_err());
    }

    #[test]
    fn accepts_single_segment_path() {
        assert!(verify_path_text(b"System").is_ok());
    }

    #[test]
    fn rejects_oversized_segment() {
        let long_segment = alloc::vec![b'a'; MAX_SEGMENT_BYTES + 1];
        let mut path = alloc::vec::Vec::from(&b"usr\0"[..]);
        path.extend_from_slice(&long_segment);
        assert!(verify_path_text(&path).is_err());
    }
}
