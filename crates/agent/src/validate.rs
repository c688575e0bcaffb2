//! Read-only SQL classifier.
//!
//! A pure, stateless keyword filter: the statement must open with a
//! `SELECT`/`WITH` construct and must not contain any write/DDL keyword,
//! `pg_`-prefixed identifier, or `SET ROLE` anywhere in its comment-stripped
//! body. This is deliberately not a SQL parser; it is a cheap first gate in
//! front of a database role that should itself be read-only. In particular,
//! comment stripping is not string-literal-aware: a `--` inside a quoted
//! literal swallows the rest of the line, so text after it escapes the
//! keyword scan. The read-only role is the backstop for that class of input.

use leadlens_core::ValidationOutcome;

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "EXECUTE", "EXEC", "COPY",
];

pub const REJECT_NOT_SELECT: &str =
    "Only SELECT queries are allowed. The statement must start with SELECT or WITH.";

/// Classify a candidate statement. Comments are stripped first so they can
/// neither hide forbidden tokens nor fool the leading-keyword check.
pub fn validate_sql(sql: &str) -> ValidationOutcome {
    let clean = strip_comments(sql);
    if !starts_with_query_keyword(&clean) {
        return ValidationOutcome::rejected(REJECT_NOT_SELECT);
    }

    let words = keyword_tokens(&clean);

    for word in &words {
        if FORBIDDEN_KEYWORDS.contains(&word.as_str()) {
            return ValidationOutcome::rejected(format!(
                "Forbidden keyword `{word}` is not permitted in queries."
            ));
        }
        if word.starts_with("PG_") {
            return ValidationOutcome::rejected(format!(
                "System identifier `{}` is not permitted in queries.",
                word.to_lowercase()
            ));
        }
    }

    for pair in words.windows(2) {
        if pair[0] == "SET" && pair[1] == "ROLE" {
            return ValidationOutcome::rejected(
                "`SET ROLE` is not permitted in queries.".to_string(),
            );
        }
    }

    ValidationOutcome::valid()
}

/// Only whitespace may precede the keyword: a statement opening with
/// punctuation, a parenthesis, or anything else is rejected even if a
/// `SELECT` appears later.
fn starts_with_query_keyword(sql: &str) -> bool {
    let head = sql.trim_start().as_bytes();
    for keyword in [b"SELECT".as_slice(), b"WITH".as_slice()] {
        if head.len() >= keyword.len() && head[..keyword.len()].eq_ignore_ascii_case(keyword) {
            let boundary = head
                .get(keyword.len())
                .map_or(true, |b| !(b.is_ascii_alphanumeric() || *b == b'_'));
            if boundary {
                return true;
            }
        }
    }
    false
}

/// Remove `--` line comments and `/* */` block comments.
fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let bytes = sql.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'-' && i + 1 < bytes.len() && bytes[i + 1] == b'-' {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'*' {
            i += 2;
            while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                i += 1;
            }
            i = (i + 2).min(bytes.len());
            // replaced with a space so adjacent tokens stay separated
            out.push(' ');
            continue;
        }
        let ch = sql[i..].chars().next().unwrap_or(' ');
        out.push(ch);
        i += ch.len_utf8();
    }

    out
}

/// Uppercased identifier-shaped tokens, in order. Splitting on everything
/// outside `[A-Za-z0-9_]` gives word boundaries for free, so `created_at`
/// never matches `CREATE`.
fn keyword_tokens(sql: &str) -> Vec<String> {
    sql.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .map(str::to_ascii_uppercase)
        .collect()
}
