//! Interpretation of free-text Generator and Planner replies.

/// Prefixes that mark a reply as a failure report rather than content.
pub const FAILURE_SENTINELS: &[&str] = &["Error:", "Erro:"];

/// True when the reply starts with a failure sentinel.
pub fn is_failure_sentinel(reply: &str) -> bool {
    let trimmed = reply.trim_start();
    FAILURE_SENTINELS
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
}

/// Body of the first fenced code block, without the info string.
///
/// Returns `None` when there is no opening fence. An unterminated fence runs
/// to the end of the text.
pub fn extract_fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let body_start = after_fence.find('\n').map_or(after_fence.len(), |i| i + 1);
    let body = &after_fence[body_start..];
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    Some(body.trim_end_matches(['\n', '\r']))
}

/// Code to write for a generator reply: fenced body if present, else the
/// whole reply.
pub fn code_from_reply(reply: &str) -> &str {
    extract_fenced_block(reply).unwrap_or_else(|| reply.trim())
}

/// Best-effort JSON slice of a reply: fenced body, bare document, or the
/// outermost `{...}` / `[...]` span.
pub fn json_from_reply(reply: &str) -> Option<&str> {
    let candidate = extract_fenced_block(reply).unwrap_or(reply).trim();
    if candidate.starts_with('{') || candidate.starts_with('[') {
        return Some(candidate);
    }
    outermost_span(candidate, '{', '}').or_else(|| outermost_span(candidate, '[', ']'))
}

fn outermost_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_prefixes_mark_failure() {
        assert!(is_failure_sentinel("Error: quota exceeded"));
        assert!(is_failure_sentinel("  Erro: falha"));
        assert!(!is_failure_sentinel("print('Error: not a sentinel')"));
        assert!(!is_failure_sentinel("error: lowercase is content"));
    }

    #[test]
    fn extracts_first_fenced_block() {
        let reply = "Here you go:\n```python\nprint('hi')\n```\nand\n```\nsecond\n```";
        assert_eq!(extract_fenced_block(reply), Some("print('hi')"));
    }

    #[test]
    fn unterminated_fence_runs_to_end() {
        assert_eq!(extract_fenced_block("```rust\nfn main() {}\n"), Some("fn main() {}"));
        assert_eq!(extract_fenced_block("no fences"), None);
    }

    #[test]
    fn code_falls_back_to_whole_reply() {
        assert_eq!(code_from_reply("  x = 1\n"), "x = 1");
        assert_eq!(code_from_reply("```\nx = 2\n```"), "x = 2");
    }

    #[test]
    fn json_is_found_in_prose() {
        assert_eq!(
            json_from_reply("Plan:\n{\"project_id\": \"a\"}\nThanks"),
            Some("{\"project_id\": \"a\"}")
        );
        assert_eq!(json_from_reply("```json\n[1, 2]\n```"), Some("[1, 2]"));
        assert_eq!(json_from_reply("nothing here"), None);
    }
}
