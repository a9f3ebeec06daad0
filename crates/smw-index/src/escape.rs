//! Query-syntax escaping for identifiers.
//!
//! Identifiers are arbitrary strings (DOIs, URNs, UUIDs, free text) and are
//! placed inside an `id:( ... )` clause, so every character with meaning in
//! the query grammar is prefixed with a backslash.

/// Characters with query-syntax meaning.
pub const RESERVED_CHARS: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':',
];

/// Escape one identifier for use as a query term.
///
/// Besides [`RESERVED_CHARS`], a literal backslash (it would swallow the next
/// character), `/` (regex delimiter) and whitespace (term separator) are
/// escaped, so the result is always exactly one term.
pub fn escape_term(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 8);
    for c in term.chars() {
        if needs_escape(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn needs_escape(c: char) -> bool {
    c == '\\' || c == '/' || c.is_whitespace() || RESERVED_CHARS.contains(&c)
}

/// `id_field:(t1 OR t2 OR ...)` with every term escaped.
pub fn build_query(id_field: &str, ids: &[String]) -> String {
    let terms: Vec<String> = ids.iter().map(|id| escape_term(id)).collect();
    format!("{}:({})", id_field, terms.join(" OR "))
}
