//! Entry name matching: exact paths, directory-anchored suffixes and `*`/`?` globs
//!
//! Glob patterns are only ever compared with the *base file name* of an entry,
//! so `*.db` matches `data/app.db` but a pattern like `data/*.db` never matches
//! anything through the glob rule (it still matches exactly `data/*.db` or a path
//! ending in `/data/*.db`).

/// Returns true if `entry_path` matches `pattern`.
///
/// - `entry_path == pattern`, or `entry_path` ends with `/` + `pattern`
/// - otherwise, if the pattern contains `*` or `?`, the glob is matched against
///   the base file name of `entry_path`, anchored at both ends
///
/// ```
/// use s_unzip::pattern::matches;
///
/// assert!(matches("data/app.db", "*.db"));
/// assert!(matches("contents/app.db", "app.db"));
/// assert!(matches("file1.txt", "file?.txt"));
/// assert!(!matches("file12.txt", "file?.txt"));
/// ```
pub fn matches(entry_path: &str, pattern: &str) -> bool {
    Pattern::new(pattern).matches(entry_path)
}

/// Returns true if the pattern uses any wildcard
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// The part of `entry_path` after the last `/`, or the whole path when that is empty
pub fn base_name(entry_path: &str) -> &str {
    match entry_path.rsplit_once('/') {
        Some((_, name)) if !name.is_empty() => name,
        _ => entry_path,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyOne,
    AnyRun,
}

/// A pattern compiled once and tested against many entry paths
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    glob: Option<Vec<Token>>,
}

impl Pattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        let source = pattern.into();
        let glob = is_glob(&source).then(|| compile(&source));
        Self { source, glob }
    }

    /// The pattern text as given by the caller
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_glob(&self) -> bool {
        self.glob.is_some()
    }

    pub fn matches(&self, entry_path: &str) -> bool {
        if self.matches_exact(entry_path) {
            return true;
        }

        match &self.glob {
            Some(tokens) => glob_match(tokens, base_name(entry_path)),
            None => false,
        }
    }

    fn matches_exact(&self, entry_path: &str) -> bool {
        let pattern = self.source.as_str();
        if entry_path == pattern {
            return true;
        }
        entry_path
            .strip_suffix(pattern)
            .is_some_and(|prefix| prefix.ends_with('/'))
    }
}

impl From<&str> for Pattern {
    fn from(pattern: &str) -> Self {
        Pattern::new(pattern)
    }
}

impl From<String> for Pattern {
    fn from(pattern: String) -> Self {
        Pattern::new(pattern)
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Several patterns, matched as "any of"
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Pattern>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, entry_path: &str) -> bool {
        self.first_match(entry_path).is_some()
    }

    /// The first pattern (in the order given) that matches `entry_path`
    pub fn first_match(&self, entry_path: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.matches(entry_path))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }
}

fn compile(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(pattern.len());
    for c in pattern.chars() {
        let token = match c {
            '*' => Token::AnyRun,
            '?' => Token::AnyOne,
            other => Token::Literal(other),
        };
        // consecutive stars are one star
        if token == Token::AnyRun && tokens.last() == Some(&Token::AnyRun) {
            continue;
        }
        tokens.push(token);
    }
    tokens
}

/// Anchored glob match with single-star backtracking
///
/// Only the most recent `*` needs to be revisited on a mismatch, which keeps
/// the match linear in practice and free of recursion.
fn glob_match(tokens: &[Token], text: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let (mut t, mut s) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while s < text.len() {
        match tokens.get(t) {
            Some(Token::AnyRun) => {
                star = Some((t, s));
                t += 1;
            }
            Some(Token::AnyOne) => {
                t += 1;
                s += 1;
            }
            Some(Token::Literal(c)) if *c == text[s] => {
                t += 1;
                s += 1;
            }
            _ => match star {
                Some((star_t, star_s)) => {
                    t = star_t + 1;
                    s = star_s + 1;
                    star = Some((star_t, star_s + 1));
                }
                None => return false,
            },
        }
    }

    tokens[t..].iter().all(|token| *token == Token::AnyRun)
}
