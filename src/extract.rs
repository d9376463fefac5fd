//! Heuristic parsing of unstructured model output into structured solution
//! fields. Pure and deterministic: no I/O, no transport concerns. The stages
//! differ only in the fallback values they supply, never in the grammar.

use once_cell::sync::Lazy;
use regex::Regex;

static FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:\w+)?\s*([\s\S]*?)```").unwrap());

static THOUGHTS_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Thoughts:|Key Insights:|Reasoning:|Approach:)([\s\S]*?)(?:Time complexity:|$)")
        .unwrap()
});

static BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:[-*•]|\d+\.)\s*(.*)").unwrap());

static TIME_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)time complexity:?").unwrap());

static SPACE_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)space complexity:?").unwrap());

// Span terminators must sit at a line start, so prose mentions like
// "...the overall time complexity" inside an explanation do not clip it.
static TIME_LABEL_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*time complexity:?").unwrap());

static SPACE_LABEL_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*space complexity:?").unwrap());

static O_NOTATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)O\([^)]+\)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexityKind {
    Time,
    Space,
}

/// Interior of the first triple-backtick fence, trimmed. `None` when the
/// response carries no fence; callers decide the stage-specific fallback
/// (full text for solve/refine, prior code for debug).
pub fn code_block(text: &str) -> Option<String> {
    FENCE
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
}

/// Remove markdown code fences the model may wrap strict-JSON output in.
pub fn strip_json_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Reasoning list from a labeled section ("Thoughts:", "Key Insights:",
/// "Reasoning:", "Approach:") running up to the "Time complexity:" marker.
/// Bullet and numbered items win; otherwise non-empty trimmed lines.
pub fn thoughts(text: &str) -> Option<Vec<String>> {
    let caps = THOUGHTS_SECTION.captures(text)?;
    let section = caps.get(1)?.as_str();

    let bullets: Vec<String> = BULLET
        .captures_iter(section)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if !bullets.is_empty() {
        return Some(bullets);
    }

    let lines: Vec<String> = section
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines)
    }
}

/// The raw text following a complexity label, up to the next line-initial
/// complexity label of either kind or end of text.
fn complexity_span(text: &str, kind: ComplexityKind) -> Option<String> {
    let label: &Regex = match kind {
        ComplexityKind::Time => &TIME_LABEL,
        ComplexityKind::Space => &SPACE_LABEL,
    };
    let m = label.find(text)?;
    let rest = &text[m.end()..];

    let end = [TIME_LABEL_LINE.find(rest), SPACE_LABEL_LINE.find(rest)]
        .into_iter()
        .flatten()
        .map(|m| m.start())
        .min()
        .unwrap_or(rest.len());

    let span = rest[..end].trim();
    if span.is_empty() {
        None
    } else {
        Some(span.to_string())
    }
}

/// Canonicalize a free-text complexity span into `"O(...) - explanation"`:
/// synthesize an `O(n)` prefix when no notation is present; when notation is
/// present but no explanatory separator (`-` or "because") follows, split the
/// notation out and re-join. Idempotent on already-normalized input.
pub fn normalize_complexity(raw: &str) -> String {
    let raw = raw.trim();
    match O_NOTATION.find(raw) {
        None => format!("O(n) - {}", raw),
        Some(m) => {
            if raw.contains('-') || raw.contains("because") {
                raw.to_string()
            } else {
                let notation = m.as_str().to_string();
                let rest = raw.replacen(notation.as_str(), "", 1);
                format!("{} - {}", notation, rest.trim())
            }
        }
    }
}

/// Re-balance bold markdown (`**`) in a complexity span: an odd marker count
/// gets one appended to close it; a leading marker keeps only the notation
/// segment bold and any later markers are stripped from the remainder; a
/// span that does not open with a marker loses its markers entirely.
pub fn repair_bold_markers(raw: &str) -> String {
    if !raw.contains("**") {
        return raw.to_string();
    }

    let mut span = raw.to_string();
    if span.matches("**").count() % 2 != 0 {
        span.push_str("**");
    }

    if span.starts_with("**") {
        if let Some(close) = span[2..].find("**").map(|i| i + 2) {
            let bold = &span[..close + 2];
            let remainder = span[close + 2..].replace("**", "");
            span = format!("{}{}", bold, remainder);
        }
    } else {
        span = span.replace("**", "");
    }

    span
}

/// One extracted complexity field, normalized. `None` when the label is
/// absent or its span is empty; callers substitute the stage fallback.
pub fn complexity(text: &str, kind: ComplexityKind) -> Option<String> {
    let span = complexity_span(text, kind)?;
    let span = match kind {
        ComplexityKind::Time => span,
        // Models tend to bold the notation; broken markers bleed into the UI.
        ComplexityKind::Space => repair_bold_markers(&span),
    };
    Some(normalize_complexity(&span))
}

/// Stage-specific complexity fallback values. The parsing grammar is shared;
/// only these differ between initial solve and debug/refine.
#[derive(Debug, Clone)]
pub struct ComplexityFallback {
    pub time: String,
    pub space: String,
}

impl ComplexityFallback {
    /// Generic linear-complexity prose used when an initial solve yields no
    /// parseable complexity section.
    pub fn generic() -> Self {
        Self {
            time: "O(n) - Linear time complexity because we only iterate through the array \
                   once. Each element is processed exactly one time, and the hashmap lookups \
                   are O(1) operations."
                .to_string(),
            space: "O(n) - Linear space complexity because we store elements in the hashmap. \
                    In the worst case, we might need to store all elements before finding the \
                    solution pair."
                .to_string(),
        }
    }
}

/// Both complexities, falling back per field.
pub fn complexities(text: &str, fallback: ComplexityFallback) -> (String, String) {
    let time = complexity(text, ComplexityKind::Time).unwrap_or(fallback.time);
    let space = complexity(text, ComplexityKind::Space).unwrap_or(fallback.space);
    (time, space)
}
