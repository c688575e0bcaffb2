//! Recovery of a single SQL statement from unconstrained model text.
//!
//! Heuristic by construction: model output may wrap the statement in a tag,
//! a JSON envelope, a fenced code block, or plain prose. The narrow
//! `recover_sql` interface keeps the rest of the pipeline ignorant of these
//! layers so a stricter parser can replace them later.

/// Extract then normalize in one step. This is what the pipeline calls.
pub fn recover_sql(text: &str) -> String {
    normalize_sql(&extract_sql(text))
}

/// Pull one SQL statement out of free-form text. Ordered, first match wins:
/// 1. strip an enclosing `<tag>...</tag>` wrapper,
/// 2. JSON-shaped object: use a fenced block found inside it,
/// 3. fenced block anywhere (optional `sql` language tag),
/// 4. first `SELECT`/`WITH` up to the next fence marker or end of text,
/// 5. the trimmed original, verbatim (soft failure; validation will reject
///    it downstream if it is not actually SQL).
pub fn extract_sql(text: &str) -> String {
    let unwrapped = strip_wrapper_tag(text.trim());

    if looks_like_json_object(unwrapped) {
        if let Some(block) = fenced_block(unwrapped) {
            return block.trim().to_string();
        }
    }

    if let Some(block) = fenced_block(unwrapped) {
        return block.trim().to_string();
    }

    if let Some(start) = find_query_start(unwrapped) {
        let tail = &unwrapped[start..];
        let end = tail.find("```").unwrap_or(tail.len());
        return tail[..end].trim().to_string();
    }

    unwrapped.trim().to_string()
}

/// Decode HTML entities and literal escape sequences the model (or a JSON
/// envelope) may have introduced, then trim.
pub fn normalize_sql(sql: &str) -> String {
    sql.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\\"", "\"")
        .replace("\\'", "'")
        .trim()
        .to_string()
}

/// Strip one enclosing `<tag>...</tag>` pair if the whole text is wrapped.
fn strip_wrapper_tag(text: &str) -> &str {
    let rest = match text.strip_prefix('<') {
        Some(rest) => rest,
        None => return text,
    };

    let close = match rest.find('>') {
        Some(pos) => pos,
        None => return text,
    };
    let name = &rest[..close];
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return text;
    }

    let inner = &rest[close + 1..];
    match inner.strip_suffix(&format!("</{name}>")) {
        Some(stripped) => stripped.trim(),
        None => text,
    }
}

fn looks_like_json_object(text: &str) -> bool {
    text.starts_with('{') && serde_json::from_str::<serde_json::Value>(text).is_ok()
}

/// Content of the first ``` fence. An `sql` language tag after the opening
/// fence is skipped. Works on both real newlines and the literal `\n`
/// sequences found inside JSON envelopes; normalization cleans up the rest.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let mut body = &text[open + 3..];

    // get() rather than slicing: the byte after the fence may sit inside a
    // multi-byte character
    if body.get(..3).is_some_and(|tag| tag.eq_ignore_ascii_case("sql")) {
        body = &body[3..];
    }

    let end = body.find("```").unwrap_or(body.len());
    Some(&body[..end])
}

/// Byte offset of the first `SELECT` or `WITH` on a word boundary,
/// case-insensitive.
fn find_query_start(text: &str) -> Option<usize> {
    let upper = text.to_ascii_uppercase();
    let mut earliest: Option<usize> = None;
    for keyword in ["SELECT", "WITH"] {
        let mut from = 0;
        while let Some(found) = upper[from..].find(keyword) {
            let at = from + found;
            let before_ok = at == 0
                || !upper[..at]
                    .chars()
                    .next_back()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
            let after = at + keyword.len();
            let after_ok = after >= upper.len()
                || !upper[after..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
            if before_ok && after_ok {
                earliest = Some(earliest.map_or(at, |best| best.min(at)));
                break;
            }
            from = at + keyword.len();
        }
    }
    earliest
}
