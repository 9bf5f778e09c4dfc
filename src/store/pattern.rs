//! Redis-compatible glob patterns
//!
//! Supported syntax, matching Redis `SCAN MATCH` / `KEYS`:
//! - `*` any run of characters (including none)
//! - `?` exactly one character
//! - `[abc]`, `[a-z]`, `[^abc]` character classes
//! - `\x` the literal character `x`
//!
//! An unterminated class runs to the end of the pattern, as in Redis.

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClassItem {
    Char(char),
    Range(char, char),
}

impl ClassItem {
    fn contains(&self, c: char) -> bool {
        match *self {
            ClassItem::Char(item) => item == c,
            ClassItem::Range(start, end) => start <= c && c <= end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    Any,
    Star,
    Class { negated: bool, items: Vec<ClassItem> },
}

impl Token {
    fn matches_char(&self, c: char) -> bool {
        match self {
            Token::Literal(literal) => *literal == c,
            Token::Any => true,
            Token::Star => false,
            Token::Class { negated, items } => items.iter().any(|item| item.contains(c)) != *negated,
        }
    }
}

/// A compiled glob pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    tokens: Vec<Token>,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Self {
        let chars: Vec<char> = pattern.chars().collect();
        let mut tokens = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '*' => {
                    if tokens.last() != Some(&Token::Star) {
                        tokens.push(Token::Star);
                    }
                    i += 1;
                }
                '?' => {
                    tokens.push(Token::Any);
                    i += 1;
                }
                '\\' if i + 1 < chars.len() => {
                    tokens.push(Token::Literal(chars[i + 1]));
                    i += 2;
                }
                '[' => {
                    let (token, next) = Self::parse_class(&chars, i + 1);
                    tokens.push(token);
                    i = next;
                }
                c => {
                    tokens.push(Token::Literal(c));
                    i += 1;
                }
            }
        }

        Self { tokens }
    }

    fn parse_class(chars: &[char], mut i: usize) -> (Token, usize) {
        let mut negated = false;
        let mut items = Vec::new();

        if chars.get(i) == Some(&'^') {
            negated = true;
            i += 1;
        }

        while i < chars.len() {
            match chars[i] {
                ']' => {
                    i += 1;
                    break;
                }
                '\\' if i + 1 < chars.len() => {
                    items.push(ClassItem::Char(chars[i + 1]));
                    i += 2;
                }
                start if i + 2 < chars.len() && chars[i + 1] == '-' => {
                    let end = chars[i + 2];
                    let (low, high) = if start <= end { (start, end) } else { (end, start) };
                    items.push(ClassItem::Range(low, high));
                    i += 3;
                }
                c => {
                    items.push(ClassItem::Char(c));
                    i += 1;
                }
            }
        }

        (Token::Class { negated, items }, i)
    }

    /// Whether `text` matches the whole pattern
    pub fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();
        let mut p = 0;
        let mut t = 0;
        // Position of the last `*` and the text index it currently absorbs up to
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            match self.tokens.get(p) {
                Some(Token::Star) => {
                    backtrack = Some((p, t));
                    p += 1;
                    continue;
                }
                Some(token) if token.matches_char(text[t]) => {
                    p += 1;
                    t += 1;
                    continue;
                }
                _ => {}
            }

            match backtrack {
                Some((star, absorbed)) => {
                    p = star + 1;
                    t = absorbed + 1;
                    backtrack = Some((star, absorbed + 1));
                }
                None => return false,
            }
        }

        self.tokens[p..].iter().all(|token| *token == Token::Star)
    }
}

/// Match `text` against a glob pattern
pub fn glob_match(pattern: &str, text: &str) -> bool {
    GlobPattern::new(pattern).matches(text)
}

/// Escape glob metacharacters so `text` matches only itself
pub fn escape_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
