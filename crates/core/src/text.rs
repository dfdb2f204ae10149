const FENCE: &str = "```";

/// Normalize an assembled answer: unify line endings, trim, close a dangling
/// code fence and cap blank-line runs at two empty lines.
pub fn clean_response(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut cleaned = text.replace("\r\n", "\n").trim().to_string();
    if cleaned.matches(FENCE).count() % 2 == 1 {
        cleaned.push('\n');
        cleaned.push_str(FENCE);
    }
    while cleaned.contains("\n\n\n\n") {
        cleaned = cleaned.replace("\n\n\n\n", "\n\n\n");
    }
    cleaned
}
