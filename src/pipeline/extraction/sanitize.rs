/// Clean raw OCR text before pattern matching.
/// Unifies line endings, strips control characters and odd spaces, trims
/// each line and drops blank lines. Line structure is kept because several
/// rules anchor on line boundaries.
pub fn sanitize_ocr_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter_map(|c| match c {
            '\n' | '\t' => Some(c),
            '\u{00A0}' | '\u{2007}' | '\u{202F}' => Some(' '),
            '\u{FEFF}' | '\u{200B}' => None,
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect::<String>()
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
