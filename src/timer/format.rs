const ZERO_DISPLAY: &str = "00:00:00";

/// Render seconds as zero-padded `HH:MM:SS`.
///
/// Anything that is not a finite, non-negative number renders as `00:00:00`.
/// Fractional seconds are truncated; hours grow past 99 instead of wrapping.
pub fn format_elapsed(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return ZERO_DISPLAY.to_string();
    }
    // Saturating cast; anything beyond u64 is not a real study session anyway.
    format_elapsed_secs(seconds.trunc() as u64)
}

pub fn format_elapsed_secs(seconds: u64) -> String {
    let hours = seconds / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}
