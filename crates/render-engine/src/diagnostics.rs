//! Reduce an engine log to a short diagnostic.

/// Longest diagnostic returned by [`classify`], in characters.
pub const MAX_DIAGNOSTIC_CHARS: usize = 500;

const ERROR_MARKERS: [&str; 4] = ["Error", "error", "Invalid", "No such file"];

/// Pick the most relevant excerpt of an engine log.
///
/// Starts at the first line that mentions an error marker and keeps at most
/// [`MAX_DIAGNOSTIC_CHARS`] characters from there. When no line matches, the
/// trailing characters of the log are returned instead.
pub fn classify(log: &str) -> String {
    let mut offset = 0;
    for line in log.split_inclusive('\n') {
        if ERROR_MARKERS.iter().any(|marker| line.contains(marker)) {
            return head(&log[offset..], MAX_DIAGNOSTIC_CHARS).to_string();
        }
        offset += line.len();
    }
    tail(log, MAX_DIAGNOSTIC_CHARS).to_string()
}

fn head(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_first_error_line() {
        let log = "ffmpeg version 6.0\nInput #0, image2\n[in] No such file or directory\nbye\n";
        assert_eq!(classify(log), "[in] No such file or directory\nbye\n");
    }

    #[test]
    fn test_matches_invalid_marker() {
        let log = "frame=1\nInvalid argument\n";
        assert_eq!(classify(log), "Invalid argument\n");
    }

    #[test]
    fn test_truncates_long_excerpt() {
        let log = format!("header\nError: {}", "x".repeat(2_000));
        let diagnostic = classify(&log);
        assert_eq!(diagnostic.chars().count(), MAX_DIAGNOSTIC_CHARS);
        assert!(diagnostic.starts_with("Error: "));
    }

    #[test]
    fn test_falls_back_to_tail() {
        let log = "a".repeat(100) + &"b".repeat(500);
        assert_eq!(classify(&log), "b".repeat(500));
        assert_eq!(classify("short log"), "short log");
        assert_eq!(classify(""), "");
    }

    #[test]
    fn test_multibyte_boundaries() {
        let log = "é".repeat(700);
        assert_eq!(classify(&log).chars().count(), MAX_DIAGNOSTIC_CHARS);

        let log = format!("Error {}", "ü".repeat(700));
        assert_eq!(classify(&log).chars().count(), MAX_DIAGNOSTIC_CHARS);
    }
}
