//! Decoding of the CIF text escape conventions.
//!
//! CIF 1.1 writes Greek letters, accents, and a handful of symbols in plain
//! ASCII: `\a` is alpha, `\'e` is an acute e, `\\infty` is the infinity sign,
//! `+-` is the plus-minus sign. [`decode`] turns such text into Unicode.
//! Accents become combining marks placed after the character they modify.

/// Named escapes, matched after a double backslash.
const NAMED: &[(&str, char)] = &[
    (r"\\simeq", '\u{2245}'),
    (r"\\sim", '~'),
    (r"\\infty", '\u{221e}'),
    (r"\\times", '\u{d7}'),
    (r"\\square", '\u{b2}'),
    (r"\\neq", '\u{2260}'),
    (r"\\rangle", '\u{232a}'),
    (r"\\langle", '\u{2329}'),
    (r"\\rightarrow", '\u{2192}'),
    (r"\\leftarrow", '\u{2190}'),
];

/// The translation of a single-character escape `\c`.
fn translate(c: char) -> Option<char> {
    let t = match c {
        // Accents, as combining marks
        '\'' => '\u{301}',
        '`' => '\u{300}',
        '^' => '\u{302}',
        ',' => '\u{327}',
        '"' => '\u{308}',
        '~' => '\u{303}',
        ';' => '\u{328}',
        '>' => '\u{30b}',
        '=' => '\u{305}',
        '.' => '\u{307}',
        '<' => '\u{30c}',
        '(' => '\u{306}',
        '/' => '\u{337}',
        // Greek
        'a' => 'α',
        'b' => 'β',
        'c' => 'χ',
        'd' => 'δ',
        'e' => 'ε',
        'f' => 'φ',
        'g' => 'γ',
        'h' => 'η',
        'i' => 'ι',
        'k' => 'κ',
        'l' => 'λ',
        'm' => 'μ',
        'n' => 'ν',
        'o' => 'ο',
        'p' => 'π',
        'q' => 'θ',
        'r' => 'ρ',
        's' => 'σ',
        't' => 'τ',
        'u' => 'υ',
        'w' => 'ω',
        'x' => 'ξ',
        'y' => 'ψ',
        'z' => 'ζ',
        'A' => 'Α',
        'B' => 'Β',
        'C' => 'Χ',
        'D' => 'Δ',
        'E' => 'Ε',
        'F' => 'Φ',
        'G' => 'Γ',
        'H' => 'Η',
        'I' => 'Ι',
        'K' => 'Κ',
        'L' => 'Λ',
        'M' => 'Μ',
        'N' => 'Ν',
        'O' => 'Ο',
        'P' => 'Π',
        'Q' => 'Θ',
        'R' => 'Ρ',
        'S' => 'Σ',
        'T' => 'Τ',
        'U' => 'Υ',
        'W' => 'Ω',
        'X' => 'Ξ',
        'Y' => 'Ψ',
        'Z' => 'Ζ',
        _ => return None,
    };
    Some(t)
}

fn is_combining(c: char) -> bool {
    ('\u{300}'..='\u{36f}').contains(&c)
}

fn is_sign(c: char) -> bool {
    c == '+' || c == '-'
}

/// Decoded text plus the combining marks waiting for their base character.
#[derive(Default)]
struct Output {
    text: String,
    hold: String,
}

impl Output {
    /// Emit a base character followed by any held marks.
    fn base(&mut self, c: char) {
        self.text.push(c);
        self.text.push_str(&self.hold);
        self.hold.clear();
    }

    fn finish(mut self) -> String {
        if !self.hold.is_empty() {
            self.text.push(' ');
            self.text.push_str(&self.hold);
        }
        self.text
    }
}

/// Decode CIF escapes in `text`.
///
/// Unknown escapes and a trailing backslash are kept as written.
pub fn decode(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Output::default();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let Some(&next) = chars.get(i + 1).filter(|_| c == '\\') else {
            out.base(c);
            i += 1;
            continue;
        };
        let third = chars.get(i + 2).copied();
        i += match next {
            '\\' => named(&chars[i..], &mut out),
            '%' => match third {
                Some(a @ ('a' | 'A')) => {
                    out.hold.push('\u{30a}');
                    out.base(a);
                    3
                }
                _ => {
                    out.base('\u{b0}');
                    2
                }
            },
            '?' => match third {
                Some('i') => {
                    out.base('\u{131}');
                    3
                }
                Some('I') => {
                    out.base('I');
                    3
                }
                _ => {
                    out.base('?');
                    2
                }
            },
            '&' => match third {
                Some('s') => {
                    out.base('\u{df}');
                    3
                }
                Some('S') => {
                    out.hold.push('S');
                    out.base('S');
                    3
                }
                _ => {
                    out.base('&');
                    2
                }
            },
            other => {
                match translate(other) {
                    Some(mark) if is_combining(mark) => out.hold.push(mark),
                    Some(t) => out.base(t),
                    None => {
                        out.base('\\');
                        out.base(other);
                    }
                }
                2
            }
        };
    }

    ligatures(&out.finish())
}

/// Handle a `\\name` escape at the start of `chars`; returns the number of
/// characters consumed.
fn named(chars: &[char], out: &mut Output) -> usize {
    let run: String = chars
        .iter()
        .take_while(|c| !matches!(c, ' ' | '\t' | '\r' | '\n' | '\u{c}'))
        .collect();
    let found = NAMED
        .iter()
        .filter(|(key, _)| run.starts_with(key))
        .max_by_key(|(key, _)| key.len());
    match found {
        Some((key, c)) => {
            out.base(*c);
            key.chars().count()
        }
        None => {
            out.base('\\');
            2
        }
    }
}

/// Replace `--`, `+-` and `-+` by their typographic forms where they are
/// not part of a longer run of signs.
fn ligatures(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let ligature = match (chars[i], chars.get(i + 1)) {
            ('-', Some('-')) => Some('\u{2014}'),
            ('+', Some('-')) => Some('\u{b1}'),
            ('-', Some('+')) => Some('\u{2213}'),
            _ => None,
        };
        let isolated = i.checked_sub(1).map_or(true, |p| !is_sign(chars[p]))
            && chars.get(i + 2).map_or(true, |&c| !is_sign(c));
        match ligature {
            Some(l) if isolated => {
                out.push(l);
                i += 2;
            }
            _ => {
                out.push(chars[i]);
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greek() {
        assert_eq!(decode(r"\m"), "μ");
        assert_eq!(decode(r"\a\b\g"), "αβγ");
        assert_eq!(decode(r"\W = 2\p"), "Ω = 2π");
        assert_eq!(decode(r"\x\X"), "ξΞ");
    }

    #[test]
    fn test_unknown_escapes_are_literal() {
        assert_eq!(decode(r"\j"), r"\j");
        assert_eq!(decode(r"\V"), r"\V");
        assert_eq!(decode(r"\1"), r"\1");
        assert_eq!(decode(r"a\"), r"a\");
        assert_eq!(decode("\\\u{e9}"), "\\\u{e9}");
    }

    #[test]
    fn test_combining_marks_follow_base() {
        assert_eq!(decode(r"\'e"), "e\u{301}");
        assert_eq!(decode(r#"\"o"#), "o\u{308}");
        assert_eq!(decode(r"\'\a"), "α\u{301}");
        assert_eq!(decode(r"\'\=\%a"), "a\u{301}\u{305}\u{30a}");
        assert_eq!(decode(r"\'\\sim"), "~\u{301}");
    }

    #[test]
    fn test_trailing_marks_follow_space() {
        assert_eq!(decode(r"\'"), " \u{301}");
        assert_eq!(decode(r"x\~"), "x \u{303}");
    }

    #[test]
    fn test_special_cases() {
        let cases = [
            (r"\%", "\u{b0}"),
            (r"\%a", "a\u{30a}"),
            (r"\%A", "A\u{30a}"),
            (r"\%b", "\u{b0}b"),
            (r"\?", "?"),
            (r"\?i", "\u{131}"),
            (r"\?I", "I"),
            (r"\?a", "?a"),
            (r"\&", "&"),
            (r"\&s", "\u{df}"),
            (r"\&S", "SS"),
            (r"\'\&S", "S\u{301}S"),
            (r"\&q", "&q"),
        ];
        for (input, expected) in cases {
            assert_eq!(decode(input), expected, "{:?}", input);
        }
    }

    #[test]
    fn test_named_escapes() {
        assert_eq!(decode(r"\\sim"), "~");
        assert_eq!(decode(r"\\simeq"), "\u{2245}");
        assert_eq!(decode(r"a \\times b"), "a \u{d7} b");
        assert_eq!(decode(r"\\rightarrow"), "\u{2192}");
        assert_eq!(decode(r"\\infty."), "\u{221e}.");
        assert_eq!(decode(r"\\"), r"\");
        assert_eq!(decode(r"\\foo"), r"\foo");
    }

    #[test]
    fn test_dash_ligatures() {
        let cases = [
            ("--", "\u{2014}"),
            ("+-", "\u{b1}"),
            ("-+", "\u{2213}"),
            ("---", "---"),
            ("--+", "--+"),
            ("-+-", "-+-"),
            ("+--", "+--"),
            ("-++", "-++"),
            ("+-+", "+-+"),
            ("++-", "++-"),
            ("foo-- +-bar", "foo\u{2014} \u{b1}bar"),
            ("1.5+-0.2", "1.5\u{b1}0.2"),
        ];
        for (input, expected) in cases {
            assert_eq!(decode(input), expected, "{:?}", input);
        }
    }

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(decode("Where's the beef?"), "Where's the beef?");
        assert_eq!(decode(""), "");
    }
}
