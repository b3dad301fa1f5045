//! File-naming conventions for the uploads directory.
//!
//! Two disjoint classes of files live in the directory and are told apart
//! purely by name: temp files (`vid-<opaque>.tmp`, alive only while one
//! handler runs) and finalized files (`YYYYMMDD_HHMMSSsss_<suffix>_<name>`,
//! immutable once present). Hidden files (leading `.`) belong to neither
//! class. Duplicate detection filters on these shapes, so they are
//! normative.

use chrono::{DateTime, Local};
use uuid::Uuid;

/// Prefix of every temp-file name.
pub const TEMP_PREFIX: &str = "vid-";

/// Extension of every temp-file name.
pub const TEMP_EXTENSION: &str = ".tmp";

/// Timestamp layout of finalized names: date, then time to milliseconds.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S%3f";

/// Sanitize a producer-supplied filename.
///
/// Directory components (`/` and `\` separated, plus `.`/`..` traversal
/// parts) are discarded, then every run of characters outside
/// `[A-Za-z0-9._-]` collapses into a single underscore. An input with
/// nothing left falls back to `"upload"`.
pub fn sanitize_filename(original: &str) -> String {
    let joined = original
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect::<Vec<_>>()
        .join("_");

    let mut sanitized = String::with_capacity(joined.len());
    let mut in_run = false;
    for ch in joined.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            sanitized.push(ch);
            in_run = false;
        } else if !in_run {
            sanitized.push('_');
            in_run = true;
        }
    }

    if sanitized.is_empty() {
        "upload".to_string()
    } else {
        sanitized
    }
}

/// Fresh opaque fragment for a temp-file name: 12 hex chars of a v4 UUID,
/// unique within the process.
pub fn fresh_opaque() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

pub fn temp_file_name(opaque: &str) -> String {
    format!("{TEMP_PREFIX}{opaque}{TEMP_EXTENSION}")
}

pub fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_EXTENSION)
}

pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

/// Compose a finalized name from a local wall-clock instant, an
/// alphanumeric suffix and an already-sanitized filename.
pub fn finalized_file_name(instant: DateTime<Local>, suffix: &str, sanitized: &str) -> String {
    format!("{}_{}_{}", instant.format(TIMESTAMP_FORMAT), suffix, sanitized)
}

/// Structural check for `YYYYMMDD_HHMMSSsss_<suffix>_<name>`.
pub fn is_finalized_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.len() < 21 {
        return false;
    }
    if !bytes[..8].iter().all(|b| b.is_ascii_digit()) || bytes[8] != b'_' {
        return false;
    }
    if !bytes[9..18].iter().all(|b| b.is_ascii_digit()) || bytes[18] != b'_' {
        return false;
    }
    match name[19..].split_once('_') {
        Some((suffix, stem)) => {
            !suffix.is_empty()
                && suffix.bytes().all(|b| b.is_ascii_alphanumeric())
                && !stem.is_empty()
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_safe_names() {
        assert_eq!(sanitize_filename("hello.mp4"), "hello.mp4");
        assert_eq!(sanitize_filename("clip_01-final.mkv"), "clip_01-final.mkv");
    }

    #[test]
    fn sanitize_flattens_traversal_paths() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("/var/tmp/x.mp4"), "var_tmp_x.mp4");
    }

    #[test]
    fn sanitize_handles_windows_paths() {
        assert_eq!(
            sanitize_filename("C:\\videos\\clip.mp4"),
            "C_videos_clip.mp4"
        );
    }

    #[test]
    fn sanitize_collapses_runs_of_unsafe_characters() {
        assert_eq!(sanitize_filename("a???b"), "a_b");
        assert_eq!(sanitize_filename("my file (1).mp4"), "my_file_1_.mp4");
    }

    #[test]
    fn sanitize_preserves_literal_underscores() {
        // A literal underscore followed by an unsafe run keeps both marks.
        assert_eq!(sanitize_filename("a_?b"), "a__b");
    }

    #[test]
    fn sanitize_falls_back_on_empty_input() {
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename("///"), "upload");
        assert_eq!(sanitize_filename("../.."), "upload");
    }

    #[test]
    fn temp_names_roundtrip() {
        let opaque = fresh_opaque();
        assert_eq!(opaque.len(), 12);
        assert!(opaque.bytes().all(|b| b.is_ascii_hexdigit()));

        let name = temp_file_name(&opaque);
        assert!(is_temp_name(&name));
        assert!(!is_hidden_name(&name));
        assert!(!is_finalized_name(&name));
    }

    #[test]
    fn hidden_names_are_recognized() {
        assert!(is_hidden_name(".DS_Store"));
        assert!(!is_hidden_name("video.mp4"));
    }

    #[test]
    fn finalized_names_have_the_documented_shape() {
        let name = finalized_file_name(Local::now(), "a1b2c3d4", "hello.mp4");
        assert!(name.ends_with("_a1b2c3d4_hello.mp4"));
        assert!(is_finalized_name(&name));
        assert!(!is_temp_name(&name));

        // Timestamp part: 8 date digits, separator, 9 time digits.
        let bytes = name.as_bytes();
        assert!(bytes[..8].iter().all(|b| b.is_ascii_digit()));
        assert_eq!(bytes[8], b'_');
        assert!(bytes[9..18].iter().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn malformed_names_are_not_finalized() {
        assert!(!is_finalized_name("short"));
        assert!(!is_finalized_name("vid-abc123def456.tmp"));
        assert!(!is_finalized_name("2026x801_123456789_ab_x.mp4"));
        assert!(!is_finalized_name("20260801_123456789_ab!_x.mp4"));
        assert!(!is_finalized_name("20260801_123456789__x.mp4"));
    }
}
