const REGEX_METACHARACTERS: &[char] = &[
    '.', '^', '$', '*', '+', '?', '{', '}', '[', ']', '\\', '|', '(', ')',
];

/// Escapes every regex metacharacter in `text`.
pub fn escape_regex_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        if REGEX_METACHARACTERS.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Converts a LIKE pattern into an anchored regular expression: `%` matches
/// any run of characters, `_` exactly one, everything else itself.
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            ch if REGEX_METACHARACTERS.contains(&ch) => {
                out.push('\\');
                out.push(ch);
            }
            ch => out.push(ch),
        }
    }
    out.push('$');
    out
}
