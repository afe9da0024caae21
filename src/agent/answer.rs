//! Final-answer extraction from `<answer>...</answer>` markers.

pub const ANSWER_OPEN: &str = "<answer>";
pub const ANSWER_CLOSE: &str = "</answer>";

/// Extract the final answer from assistant text.
///
/// Scans left to right. Each `<answer>` is paired with the nearest following
/// `</answer>` (non-greedy; the span may contain newlines). The first span
/// whose trimmed content is non-empty wins. An opening marker without a
/// closing one ends the scan.
pub fn extract_answer(text: &str) -> Option<String> {
    let mut rest = text;
    while let Some(start) = rest.find(ANSWER_OPEN) {
        let after_open = &rest[start + ANSWER_OPEN.len()..];
        let end = after_open.find(ANSWER_CLOSE)?;
        let content = after_open[..end].trim();
        if !content.is_empty() {
            return Some(content.to_string());
        }
        rest = &after_open[end + ANSWER_CLOSE.len()..];
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_delimited_answer() {
        assert_eq!(
            extract_answer("Weather is sunny. <answer>sunny</answer>"),
            Some("sunny".to_string())
        );
    }

    #[test]
    fn no_markers_means_no_answer() {
        assert_eq!(extract_answer("I need to look this up."), None);
        assert_eq!(extract_answer(""), None);
    }

    #[test]
    fn spans_newlines() {
        assert_eq!(
            extract_answer("<answer>\nline one\nline two\n</answer>"),
            Some("line one\nline two".to_string())
        );
    }

    #[test]
    fn is_non_greedy_and_first_match_wins() {
        assert_eq!(
            extract_answer("<answer>first</answer> and <answer>second</answer>"),
            Some("first".to_string())
        );
    }

    #[test]
    fn skips_empty_spans() {
        assert_eq!(
            extract_answer("<answer> </answer><answer>42</answer>"),
            Some("42".to_string())
        );
        assert_eq!(extract_answer("<answer></answer>"), None);
    }

    #[test]
    fn unterminated_marker_is_not_an_answer() {
        assert_eq!(extract_answer("<answer>still thinking"), None);
        assert_eq!(extract_answer("</answer>oops<answer>"), None);
    }

    #[test]
    fn handles_multibyte_text() {
        assert_eq!(
            extract_answer("température: <answer>21 °C</answer> ✓"),
            Some("21 °C".to_string())
        );
    }
}
