//! Text measurement, word wrapping and pagination for the built-in
//! Helvetica font.

/// Helvetica advance widths (1/1000 em) for ASCII 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

const DEFAULT_WIDTH: u16 = 556;

fn char_width(c: char) -> u16 {
    match c as u32 {
        code @ 32..=126 => HELVETICA_WIDTHS[(code - 32) as usize],
        _ => DEFAULT_WIDTH,
    }
}

/// Width of `text` in points at `font_size`.
pub fn text_width(text: &str, font_size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| char_width(c) as u32).sum();
    units as f32 * font_size / 1000.0
}

/// Baseline-to-baseline distance for a font size.
pub fn line_height(font_size: f32) -> f32 {
    (font_size * 1.2).round()
}

/// Encode text for a WinAnsiEncoding font. Unencodable characters become
/// `?`, tabs become spaces and other control characters are dropped.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        let byte = match c {
            '\t' => Some(b' '),
            c if c.is_control() => None,
            c if (c as u32) < 0x80 => Some(c as u8),
            c @ '\u{A0}'..='\u{FF}' => Some(c as u32 as u8),
            '€' => Some(0x80),
            '‚' => Some(0x82),
            'ƒ' => Some(0x83),
            '„' => Some(0x84),
            '…' => Some(0x85),
            '†' => Some(0x86),
            '‡' => Some(0x87),
            'ˆ' => Some(0x88),
            '‰' => Some(0x89),
            'Š' => Some(0x8A),
            '‹' => Some(0x8B),
            'Œ' => Some(0x8C),
            'Ž' => Some(0x8E),
            '\u{2018}' => Some(0x91),
            '\u{2019}' => Some(0x92),
            '\u{201C}' => Some(0x93),
            '\u{201D}' => Some(0x94),
            '•' => Some(0x95),
            '–' => Some(0x96),
            '—' => Some(0x97),
            '˜' => Some(0x98),
            '™' => Some(0x99),
            'š' => Some(0x9A),
            '›' => Some(0x9B),
            'œ' => Some(0x9C),
            'ž' => Some(0x9E),
            'Ÿ' => Some(0x9F),
            _ => Some(b'?'),
        };
        if let Some(b) = byte {
            out.push(b);
        }
    }
    out
}

/// Word-wrap `text` so that no line is wider than `max_width`.
///
/// Each source line is wrapped on its own, so explicit line breaks are kept
/// and blank lines come out as empty strings. A single word wider than the
/// limit is split at character boundaries.
pub fn wrap_text_to_lines(text: &str, font_size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for source in text.lines() {
        let mut line = String::new();
        let mut produced = false;
        for word in source.split_whitespace() {
            let tentative = if line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", line, word)
            };
            if text_width(&tentative, font_size) <= max_width {
                line = tentative;
                continue;
            }
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
                produced = true;
            }
            if text_width(word, font_size) <= max_width {
                line = word.to_string();
            } else {
                let mut pieces = break_word(word, font_size, max_width);
                line = pieces.pop().unwrap_or_default();
                produced |= !pieces.is_empty();
                lines.extend(pieces);
            }
        }
        if !line.is_empty() || !produced {
            lines.push(line);
        }
    }
    lines
}

fn break_word(word: &str, font_size: f32, max_width: f32) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for c in word.chars() {
        current.push(c);
        if current.chars().count() > 1 && text_width(&current, font_size) > max_width {
            current.pop();
            pieces.push(std::mem::take(&mut current));
            current.push(c);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// A page's worth of lines and the baseline of its first line.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPage {
    pub top: f32,
    pub lines: Vec<String>,
}

/// Split lines into pages. The first page starts at `first_top`, later
/// pages at `next_top`; a new page begins when the baseline has reached
/// `bottom`. Always returns at least one page.
pub fn paginate(
    lines: Vec<String>,
    first_top: f32,
    next_top: f32,
    bottom: f32,
    line_height: f32,
) -> Vec<TextPage> {
    let mut pages = Vec::new();
    let mut current = TextPage {
        top: first_top,
        lines: Vec::new(),
    };
    let mut y = first_top;
    for line in lines {
        if y <= bottom && !current.lines.is_empty() {
            pages.push(std::mem::replace(
                &mut current,
                TextPage {
                    top: next_top,
                    lines: Vec::new(),
                },
            ));
            y = next_top;
        }
        current.lines.push(line);
        y -= line_height;
    }
    pages.push(current);
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_width() {
        // "Hi" = H(722) + i(222) at 10pt
        assert!((text_width("Hi", 10.0) - 9.44).abs() < 1e-4);
        assert_eq!(text_width("", 12.0), 0.0);
    }

    #[test]
    fn test_line_height() {
        assert_eq!(line_height(12.0), 14.0);
        assert_eq!(line_height(10.0), 12.0);
    }

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("abc"), b"abc".to_vec());
        assert_eq!(encode_win_ansi("é€"), vec![0xE9, 0x80]);
        assert_eq!(encode_win_ansi("a\tb"), b"a b".to_vec());
        assert_eq!(encode_win_ansi("漢\u{7}"), b"?".to_vec());
    }

    #[test]
    fn test_wrap_short_text() {
        let lines = wrap_text_to_lines("hello world", 12.0, 500.0);
        assert_eq!(lines, vec!["hello world"]);
    }

    #[test]
    fn test_wrap_breaks_on_width() {
        let width = text_width("aaaa aaaa", 10.0);
        let lines = wrap_text_to_lines("aaaa aaaa aaaa", 10.0, width);
        assert_eq!(lines, vec!["aaaa aaaa", "aaaa"]);
    }

    #[test]
    fn test_wrap_keeps_blank_lines() {
        let lines = wrap_text_to_lines("one\n\ntwo", 12.0, 500.0);
        assert_eq!(lines, vec!["one", "", "two"]);
    }

    #[test]
    fn test_wrap_long_word() {
        let max = text_width("aaaa", 10.0);
        let lines = wrap_text_to_lines("aaaaaaaaaa", 10.0, max);
        assert_eq!(lines, vec!["aaaa", "aaaa", "aa"]);
    }

    #[test]
    fn test_paginate_single_page() {
        let lines: Vec<String> = (0..3).map(|i| i.to_string()).collect();
        let pages = paginate(lines, 800.0, 800.0, 24.0, 14.0);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].lines.len(), 3);
    }

    #[test]
    fn test_paginate_overflow() {
        // Baselines 100, 86, 72, 58, 44; a line is drawn while y > 30.
        let lines: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        let pages = paginate(lines, 100.0, 90.0, 30.0, 14.0);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].lines.len(), 5);
        assert_eq!(pages[1].top, 90.0);
        assert_eq!(pages[1].lines.len(), 5);
    }

    #[test]
    fn test_paginate_empty() {
        let pages = paginate(Vec::new(), 800.0, 800.0, 24.0, 14.0);
        assert_eq!(pages.len(), 1);
        assert!(pages[0].lines.is_empty());
    }
}
