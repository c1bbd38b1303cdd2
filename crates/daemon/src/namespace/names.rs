//! Display name synthesis and sanitization

use catalog::{CatalogId, Child};

/// Characters that cannot appear inside a single path segment
const BAD_CHARS: [char; 3] = ['/', '\\', '\0'];

/// Assumed bitrate (kbps) for transcodes of unknown size: a 320 kbps CBR upper
/// bound, so the estimate errs on the large side.
pub const ESTIMATE_BITRATE_KBPS: u64 = 320;

/// Replace path separators so the name is a legal single path segment
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if BAD_CHARS.contains(&c) { '_' } else { c })
        .collect();

    match cleaned.as_str() {
        "" | "." => "_".to_string(),
        ".." => "__".to_string(),
        _ => cleaned,
    }
}

/// `"{track:02} - {artist} - {title}.{suffix}"`
pub fn audio_name(track: &Child, suffix: &str) -> String {
    sanitize(&format!(
        "{:02} - {} - {}.{}",
        track.track.unwrap_or(0),
        track.artist,
        track.title,
        suffix
    ))
}

/// `"{title}.{suffix}"`
pub fn video_name(video: &Child, suffix: &str) -> String {
    sanitize(&format!("{}.{}", video.title, suffix))
}

/// `"{id}.jpg"`
pub fn cover_art_name(id: &CatalogId) -> String {
    sanitize(&format!("{}.jpg", id))
}

/// Estimated byte size of a transcode for which the server reports no size
pub fn estimate_transcoded_size(duration_secs: u64) -> u64 {
    duration_secs * ESTIMATE_BITRATE_KBPS * 1024 / 8
}
