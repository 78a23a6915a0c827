//! Text cleanup passes and protected-term shielding.
//!
//! Protected terms are swapped for private-use placeholders before any
//! pass runs and restored verbatim afterwards, so no pass can touch them.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::TermSpan;

const SHIELD_OPEN: char = '\u{E000}';
const SHIELD_CLOSE: char = '\u{E001}';

static PATTERNS: OnceLock<CleanupPatterns> = OnceLock::new();

struct CleanupPatterns {
    noise: Vec<Regex>,
    special: Regex,
    dots: Regex,
    bangs: Regex,
    questions: Regex,
    horizontal_space: Regex,
    space_around_newline: Regex,
    paragraph_break: Regex,
    excess_breaks: Regex,
    placeholder: Regex,
}

impl CleanupPatterns {
    fn new() -> Self {
        let noise = [
            // URLs
            r"(?i)\b(?:https?://|www\.)[^\s\x{E000}]+",
            // E-mail addresses
            r"\b[\w.+-]+@\w+(?:\.\w+)+\b",
            // Phone and ID numbers
            r"\b\d{10,}\b",
            // Hashtags and mentions
            r"#\w+",
            r"@\w+",
            // Bracketed, tag and braced segments without protected terms
            r"\[[^\]\x{E000}]*\]",
            r"<[^>\x{E000}]*>",
            r"\{[^}\x{E000}]*\}",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("noise regex must compile"))
        .collect();

        Self {
            noise,
            special: Regex::new(r#"[^\w\s.,!?;:()\-'"\x{E000}\x{E001}]+"#)
                .expect("special character regex must compile"),
            dots: Regex::new(r"\.{3,}").expect("dots regex must compile"),
            bangs: Regex::new(r"!{2,}").expect("bang regex must compile"),
            questions: Regex::new(r"\?{2,}").expect("question regex must compile"),
            horizontal_space: Regex::new(r"[^\S\n]+").expect("space regex must compile"),
            space_around_newline: Regex::new(r" ?\n ?").expect("newline regex must compile"),
            paragraph_break: Regex::new(r"\n{2,}").expect("paragraph regex must compile"),
            excess_breaks: Regex::new(r"\n{3,}").expect("break regex must compile"),
            placeholder: Regex::new(r"\x{E000}(\d+)\x{E001}")
                .expect("placeholder regex must compile"),
        }
    }
}

fn patterns() -> &'static CleanupPatterns {
    PATTERNS.get_or_init(CleanupPatterns::new)
}

/// Text with protected terms replaced by placeholders
#[derive(Debug)]
pub(crate) struct Shielded {
    pub text: String,

    /// (configured term, verbatim occurrence) per placeholder index
    pub terms: Vec<(String, String)>,
}

/// Swap every protected-term occurrence for a placeholder.
///
/// `resolve` maps a lowercased match back to its configured term.
pub(crate) fn shield(
    text: &str,
    matcher: Option<&Regex>,
    resolve: impl Fn(&str) -> Option<String>,
) -> Shielded {
    let text: String = text
        .chars()
        .filter(|&c| c != SHIELD_OPEN && c != SHIELD_CLOSE)
        .collect();

    let Some(matcher) = matcher else {
        return Shielded {
            text,
            terms: Vec::new(),
        };
    };

    let mut terms = Vec::new();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for m in matcher.find_iter(&text) {
        let verbatim = m.as_str();
        let Some(term) = resolve(&verbatim.to_lowercase()) else {
            continue;
        };
        out.push_str(&text[last..m.start()]);
        out.push(SHIELD_OPEN);
        out.push_str(&terms.len().to_string());
        out.push(SHIELD_CLOSE);
        terms.push((term, verbatim.to_string()));
        last = m.end();
    }
    out.push_str(&text[last..]);

    Shielded { text: out, terms }
}

/// Put protected terms back and record their byte spans
pub(crate) fn restore(text: &str, terms: &[(String, String)]) -> (String, Vec<TermSpan>) {
    let mut out = String::with_capacity(text.len());
    let mut spans = Vec::new();
    let mut last = 0;

    for caps in patterns().placeholder.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let entry = caps
            .get(1)
            .and_then(|idx| idx.as_str().parse::<usize>().ok())
            .and_then(|idx| terms.get(idx));

        out.push_str(&text[last..whole.start()]);
        if let Some((term, verbatim)) = entry {
            let start = out.len();
            out.push_str(verbatim);
            spans.push(TermSpan {
                term: term.clone(),
                start,
                end: out.len(),
            });
        }
        last = whole.end();
    }
    out.push_str(&text[last..]);

    (out, spans)
}

fn replace_all(re: &Regex, text: &str, with: &str) -> String {
    re.replace_all(text, with).into_owned()
}

/// Drop URLs, addresses, long numbers, tags and bracketed asides
pub(crate) fn remove_noise(text: &str) -> String {
    patterns()
        .noise
        .iter()
        .fold(text.to_string(), |acc, re| replace_all(re, &acc, " "))
}

/// Fold typographic punctuation to its ASCII form
pub(crate) fn fold_typography(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => out.push('"'),
            '\u{2013}' | '\u{2014}' | '\u{2212}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{00A0}' | '\u{2009}' | '\u{202F}' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

/// Replace disallowed symbols and collapse repeated punctuation
pub(crate) fn clean_special_characters(text: &str) -> String {
    let p = patterns();
    let text = replace_all(&p.special, text, " ");
    let text = replace_all(&p.dots, &text, "...");
    let text = replace_all(&p.bangs, &text, "!");
    replace_all(&p.questions, &text, "?")
}

/// Collapse spaces and normalise line breaks.
///
/// Two or more newlines form a paragraph break. Single newlines become
/// spaces unless `preserve_formatting` is set.
pub(crate) fn normalize_whitespace(text: &str, preserve_formatting: bool) -> String {
    let p = patterns();
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = replace_all(&p.horizontal_space, &text, " ");
    let text = replace_all(&p.space_around_newline, &text, "\n");

    let text = if preserve_formatting {
        replace_all(&p.excess_breaks, &text, "\n\n")
    } else {
        p.paragraph_break
            .split(&text)
            .map(|para| para.replace('\n', " "))
            .map(|para| para.trim().to_string())
            .filter(|para| !para.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn karma_matcher() -> Regex {
        Regex::new(r"(?i)\b(?:karma|osho)\b").unwrap()
    }

    fn resolve(lower: &str) -> Option<String> {
        match lower {
            "karma" | "osho" => Some(lower.to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_shield_and_restore_verbatim() {
        let matcher = karma_matcher();
        let shielded = shield("OSHO said: Karma!!", Some(&matcher), resolve);
        assert_eq!(shielded.terms.len(), 2);
        assert!(!shielded.text.contains("OSHO"));

        let cleaned = clean_special_characters(&shielded.text);
        let (restored, spans) = restore(&cleaned, &shielded.terms);
        assert_eq!(restored, "OSHO said: Karma!");
        assert_eq!(&restored[spans[0].start..spans[0].end], "OSHO");
        assert_eq!(spans[1].term, "karma");
    }

    #[test]
    fn test_noise_removal() {
        let text = "Read https://example.com/x or mail me@site.org #calm @guru [ad] call 98765432101";
        let cleaned = normalize_whitespace(&remove_noise(text), false);
        assert_eq!(cleaned, "Read or mail call");
    }

    #[test]
    fn test_noise_keeps_shielded_terms() {
        let matcher = karma_matcher();
        let shielded = shield("Think [about karma] #karma", Some(&matcher), resolve);
        let cleaned = clean_special_characters(&remove_noise(&shielded.text));
        let (restored, _) = restore(&normalize_whitespace(&cleaned, false), &shielded.terms);
        assert_eq!(restored, "Think about karma karma");
    }

    #[test]
    fn test_special_characters() {
        assert_eq!(
            clean_special_characters("Wait.... really?? yes!!! ~*~"),
            "Wait... really? yes!  "
        );
    }

    #[test]
    fn test_typography_fold() {
        assert_eq!(
            fold_typography("Don\u{2019}t \u{201C}stop\u{201D} \u{2026}"),
            "Don't \"stop\" ..."
        );
    }

    #[test]
    fn test_whitespace_paragraphs() {
        let text = "Line one\nstill one\n\n\n\nSecond   para\r\n";
        assert_eq!(
            normalize_whitespace(text, false),
            "Line one still one\n\nSecond para"
        );
        assert_eq!(
            normalize_whitespace(text, true),
            "Line one\nstill one\n\nSecond para"
        );
    }
}
