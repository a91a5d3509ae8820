//! Heuristic section heading detection.
//!
//! Policy documents carry no structural markup after text extraction, so
//! headings are recovered from the text itself. Three patterns, checked in
//! precedence order: numbered headings, ALL-CAPS lines, and lines starting
//! with a common policy-section keyword. Pure functions, no I/O.

/// Section label for text before any detected heading.
pub const PREAMBLE: &str = "Preamble";

const MAX_HEADING_CHARS: usize = 120;
const MAX_LABEL_CHARS: usize = 100;

/// Keywords that open a section heading in most policy documents.
const SECTION_KEYWORDS: &[&str] = &[
    "section",
    "part",
    "chapter",
    "schedule",
    "annexure",
    "appendix",
    "table of",
    "definition",
    "definitions",
    "exclusion",
    "exclusions",
    "inclusion",
    "inclusions",
    "benefit",
    "benefits",
    "coverage",
    "general terms",
    "general conditions",
    "general provisions",
    "claim",
    "premium",
    "waiting period",
    "pre-existing",
    "preexisting",
    "renewal",
    "grievance",
    "portability",
    "free look",
    "cancellation",
];

/// Return true if `line` looks like a section heading.
pub fn is_heading(line: &str) -> bool {
    let stripped = line.trim();
    if stripped.len() < 4 || stripped.len() > MAX_HEADING_CHARS {
        return false;
    }

    is_numbered_heading(stripped) || is_all_caps_heading(stripped) || is_keyword_heading(stripped)
}

/// Normalize a detected heading into a section label.
pub fn clean_heading(raw: &str) -> String {
    let s = raw.trim();
    let mut label: String = s.chars().take(MAX_LABEL_CHARS).collect();
    while label.ends_with([' ', ':', '-']) {
        label.pop();
    }
    label
}

/// Numbered heading: "4.1 Exclusions", "IV. Benefits", "A. Scope".
fn is_numbered_heading(s: &str) -> bool {
    let (prefix, rest) = match s.split_once(char::is_whitespace) {
        Some(pair) => pair,
        None => return false,
    };
    if rest.trim().is_empty() {
        return false;
    }

    if is_decimal_numbering(prefix) {
        return true;
    }

    // "IV." or "A." style prefixes
    if let Some(body) = prefix.strip_suffix('.') {
        if !body.is_empty() && body.chars().all(|c| "IVXLC".contains(c)) {
            return true;
        }
        let mut chars = body.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_ascii_uppercase() {
                return true;
            }
        }
    }

    false
}

/// "1", "1.2", "1.2.3" with segments of 1-3 digits, up to four levels.
fn is_decimal_numbering(prefix: &str) -> bool {
    let trimmed = prefix.strip_suffix('.').unwrap_or(prefix);
    let segments: Vec<&str> = trimmed.split('.').collect();
    if segments.is_empty() || segments.len() > 4 {
        return false;
    }
    segments
        .iter()
        .all(|seg| !seg.is_empty() && seg.len() <= 3 && seg.chars().all(|c| c.is_ascii_digit()))
}

/// ALL-CAPS line with at least 4 alphabetic chars and only heading-safe
/// punctuation.
fn is_all_caps_heading(s: &str) -> bool {
    let alpha_count = s.chars().filter(|c| c.is_alphabetic()).count();
    if alpha_count < 4 {
        return false;
    }
    if !s.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
        return false;
    }

    s.chars().all(|c| {
        c.is_ascii_uppercase() || " -&/,():'\"".contains(c)
    })
}

/// Line opening with a known policy-section keyword.
fn is_keyword_heading(s: &str) -> bool {
    let lower = s.to_lowercase();
    SECTION_KEYWORDS.iter().any(|kw| {
        lower.starts_with(kw)
            && lower[kw.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric())
    })
}
