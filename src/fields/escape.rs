//! String escaping for SQL literals, identifiers and TSV cells

/// Escape a string for use inside a single-quoted SQL literal
///
/// Backslash and single quote are backslash-escaped, as are the control
/// characters the server's text formats treat specially.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out
}

/// Escape and wrap a string in single quotes
pub fn quote(value: &str) -> String {
    format!("'{}'", escape(value))
}

/// Quote an identifier (table, column, database) with backticks
pub fn quote_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('`');
    for c in name.chars() {
        match c {
            '`' => out.push_str("\\`"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('`');
    out
}

/// Resolve a single backslash escape (the character after `\`)
pub(crate) fn unescape_char(c: char) -> char {
    match c {
        'b' => '\u{8}',
        'f' => '\u{c}',
        'r' => '\r',
        'n' => '\n',
        't' => '\t',
        '0' => '\0',
        'a' => '\u{7}',
        'v' => '\u{b}',
        other => other,
    }
}

/// Undo TSV escaping of a single cell
///
/// Returns `None` for the NULL marker `\N`.
pub fn unescape_tsv(cell: &str) -> Option<String> {
    if cell == "\\N" {
        return None;
    }
    if !cell.contains('\\') {
        return Some(cell.to_string());
    }

    let mut out = String::with_capacity(cell.len());
    let mut chars = cell.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(unescape_char(next)),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Split a TSV line into unescaped cells
pub fn split_tsv_line(line: &str) -> Vec<Option<String>> {
    line.split('\t').map(unescape_tsv).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_quotes_and_backslashes() {
        assert_eq!(escape("it's"), "it\\'s");
        assert_eq!(escape("C:\\temp"), "C:\\\\temp");
        assert_eq!(escape("line1\nline2\ttab"), "line1\\nline2\\ttab");
        assert_eq!(escape("nul\0byte"), "nul\\0byte");
    }

    #[test]
    fn test_quote_adversarial_strings() {
        // Classic injection attempts must stay inside the literal
        assert_eq!(quote("'; DROP TABLE users; --"), "'\\'; DROP TABLE users; --'");
        assert_eq!(quote("\\'"), "'\\\\\\''");
        assert_eq!(quote("\\"), "'\\\\'");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("person"), "`person`");
        assert_eq!(quote_ident("we`ird"), "`we\\`ird`");
    }

    #[test]
    fn test_unescape_tsv() {
        assert_eq!(unescape_tsv("\\N"), None);
        assert_eq!(unescape_tsv("plain").as_deref(), Some("plain"));
        assert_eq!(unescape_tsv("a\\tb\\nc").as_deref(), Some("a\tb\nc"));
        assert_eq!(unescape_tsv("it\\'s \\\\").as_deref(), Some("it's \\"));
    }

    #[test]
    fn test_escape_then_unescape_preserves_text() {
        let nasty = "quote ' backslash \\ tab \t newline \n nul \0 end";
        assert_eq!(unescape_tsv(&escape(nasty)).as_deref(), Some(nasty));
    }

    #[test]
    fn test_split_tsv_line() {
        let cells = split_tsv_line("1\t\\N\thello\\tworld");
        assert_eq!(
            cells,
            vec![Some("1".to_string()), None, Some("hello\tworld".to_string())]
        );
    }
}
