//! Byte decoding and mojibake repair.

use super::NormalizeError;
use crate::domain::SourceEncoding;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Above this share of invalid bytes the input is not treated as UTF-8
const MAX_INVALID_RATIO: f64 = 0.1;

/// Above this share of control characters the input is rejected
const MAX_CONTROL_RATIO: f64 = 0.1;

/// Windows-1252 code points for bytes 0x80..=0x9F; None where undefined
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), None, Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None, Some('\u{017D}'), None,
    None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None, Some('\u{017E}'), Some('\u{0178}'),
];

/// Common UTF-8-read-as-1252 sequences and their repair
const MOJIBAKE_TABLE: &[(&str, &str)] = &[
    ("\u{E2}\u{20AC}\u{2122}", "'"),
    ("\u{E2}\u{20AC}\u{2DC}", "'"),
    ("\u{E2}\u{20AC}\u{153}", "\""),
    ("\u{E2}\u{20AC}\u{9D}", "\""),
    ("\u{E2}\u{20AC}\u{A6}", "..."),
    ("\u{E2}\u{20AC}\u{201D}", "-"),
    ("\u{E2}\u{20AC}\u{201C}", "-"),
    ("\u{C3}\u{A1}", "\u{E1}"),
    ("\u{C3}\u{A9}", "\u{E9}"),
    ("\u{C3}\u{AD}", "\u{ED}"),
    ("\u{C3}\u{B3}", "\u{F3}"),
    ("\u{C3}\u{BA}", "\u{FA}"),
    ("\u{C3}\u{B1}", "\u{F1}"),
    ("\u{C2}\u{A0}", " "),
];

#[derive(Debug)]
pub(crate) struct Decoded {
    pub text: String,
    pub encoding: SourceEncoding,
    pub replaced: usize,
}

/// Decode raw bytes: UTF-8, then lossy UTF-8, then Windows-1252.
pub(crate) fn decode(bytes: &[u8]) -> Result<Decoded, NormalizeError> {
    if let Some(offset) = bytes.iter().position(|&b| b == 0) {
        return Err(NormalizeError::Encoding {
            reason: format!("NUL byte at offset {}", offset),
        });
    }

    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let decoded = match std::str::from_utf8(bytes) {
        Ok(text) => Decoded {
            text: text.to_string(),
            encoding: SourceEncoding::Utf8,
            replaced: 0,
        },
        Err(_) => {
            let scan = scan_utf8(bytes);
            let ratio = scan.invalid_bytes as f64 / bytes.len().max(1) as f64;

            if scan.multibyte_chars > 0 && ratio <= MAX_INVALID_RATIO {
                Decoded {
                    text: String::from_utf8_lossy(bytes).into_owned(),
                    encoding: SourceEncoding::Utf8Lossy,
                    replaced: scan.invalid_sequences,
                }
            } else {
                decode_cp1252(bytes)
            }
        }
    };

    check_control_ratio(&decoded.text)?;
    Ok(decoded)
}

struct Utf8Scan {
    multibyte_chars: usize,
    invalid_sequences: usize,
    invalid_bytes: usize,
}

fn scan_utf8(mut bytes: &[u8]) -> Utf8Scan {
    let mut scan = Utf8Scan {
        multibyte_chars: 0,
        invalid_sequences: 0,
        invalid_bytes: 0,
    };

    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                scan.multibyte_chars += valid.chars().filter(|c| c.len_utf8() > 1).count();
                break;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                // valid_up_to guarantees this prefix is UTF-8
                if let Ok(valid) = std::str::from_utf8(valid) {
                    scan.multibyte_chars += valid.chars().filter(|c| c.len_utf8() > 1).count();
                }
                scan.invalid_sequences += 1;
                let skip = e.error_len().unwrap_or(rest.len());
                scan.invalid_bytes += skip;
                bytes = &rest[skip..];
            }
        }
    }

    scan
}

fn decode_cp1252(bytes: &[u8]) -> Decoded {
    let mut replaced = 0;
    let text = bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9F => CP1252_HIGH[(b - 0x80) as usize].unwrap_or_else(|| {
                replaced += 1;
                char::REPLACEMENT_CHARACTER
            }),
            _ => b as char,
        })
        .collect();

    Decoded {
        text,
        encoding: SourceEncoding::Windows1252,
        replaced,
    }
}

fn check_control_ratio(text: &str) -> Result<(), NormalizeError> {
    let total = text.chars().count();
    if total == 0 {
        return Ok(());
    }

    let control = text
        .chars()
        .filter(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
        .count();

    if control as f64 / total as f64 > MAX_CONTROL_RATIO {
        return Err(NormalizeError::Encoding {
            reason: format!("{} of {} characters are control characters", control, total),
        });
    }

    Ok(())
}

/// Byte a character had before being mis-decoded as Windows-1252
fn cp1252_byte(c: char) -> Option<u8> {
    let code = c as u32;
    match code {
        0x00..=0x7F | 0xA0..=0xFF => Some(code as u8),
        // Undefined 1252 positions pass through as C1 controls
        0x81 | 0x8D | 0x8F | 0x90 | 0x9D => Some(code as u8),
        _ => CP1252_HIGH
            .iter()
            .position(|&mapped| mapped == Some(c))
            .map(|i| 0x80 + i as u8),
    }
}

fn looks_like_mojibake(text: &str) -> bool {
    text.contains("\u{E2}\u{20AC}") || text.contains('\u{C3}') || text.contains("\u{C2}\u{A0}")
}

/// Repair UTF-8 text that was decoded as Windows-1252 somewhere upstream.
///
/// Returns None when nothing changed.
pub(crate) fn repair_mojibake(text: &str) -> Option<String> {
    if !looks_like_mojibake(text) {
        return None;
    }

    let round_trip = text
        .chars()
        .map(cp1252_byte)
        .collect::<Option<Vec<u8>>>()
        .and_then(|bytes| String::from_utf8(bytes).ok());

    if let Some(repaired) = round_trip {
        if repaired != text {
            return Some(repaired);
        }
    }

    let mut repaired = text.to_string();
    for (bad, good) in MOJIBAKE_TABLE {
        if repaired.contains(bad) {
            repaired = repaired.replace(bad, good);
        }
    }

    (repaired != text).then_some(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_utf8_and_bom() {
        let decoded = decode("\u{FEFF}Be still.".as_bytes()).unwrap();
        assert_eq!(decoded.text, "Be still.");
        assert_eq!(decoded.encoding, SourceEncoding::Utf8);
        assert_eq!(decoded.replaced, 0);
    }

    #[test]
    fn test_lossy_utf8_counts_replacements() {
        let mut bytes = "Café is a calm place to sit and breathe slowly".as_bytes().to_vec();
        bytes.push(0xFF);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.encoding, SourceEncoding::Utf8Lossy);
        assert_eq!(decoded.replaced, 1);
        assert!(decoded.text.ends_with('\u{FFFD}'));
    }

    #[test]
    fn test_windows_1252_fallback() {
        // "Don’t" in Windows-1252
        let decoded = decode(b"Don\x92t worry").unwrap();
        assert_eq!(decoded.encoding, SourceEncoding::Windows1252);
        assert_eq!(decoded.text, "Don\u{2019}t worry");

        let decoded = decode(b"bad \x81 byte").unwrap();
        assert_eq!(decoded.replaced, 1);
    }

    #[test]
    fn test_nul_and_control_rejected() {
        assert!(matches!(
            decode(b"abc\x00def"),
            Err(NormalizeError::Encoding { .. })
        ));
        assert!(matches!(
            decode(b"\x01\x02\x03\x04ab"),
            Err(NormalizeError::Encoding { .. })
        ));
    }

    #[test]
    fn test_mojibake_round_trip() {
        let broken = "Don\u{E2}\u{20AC}\u{2122}t give up, caf\u{C3}\u{A9} life";
        assert_eq!(
            repair_mojibake(broken).unwrap(),
            "Don\u{2019}t give up, caf\u{E9} life"
        );
    }

    #[test]
    fn test_mojibake_table_fallback() {
        // The trailing emoji has no 1252 byte, so the table is used
        let broken = "It\u{E2}\u{20AC}\u{2122}s fine \u{1F600}";
        assert_eq!(repair_mojibake(broken).unwrap(), "It's fine \u{1F600}");
    }

    #[test]
    fn test_clean_text_untouched() {
        assert!(repair_mojibake("Nothing to fix here").is_none());
        assert!(repair_mojibake("S\u{C3}O PAULO").is_none());
    }
}
