//! Diagnostic rendering.
//!
//! Turns stage errors into the user-facing shape: a coloured header with the
//! file position, the offending source line with a caret underline, the
//! message, and optional "did you mean" / hint lines. Colour is ANSI SGR via
//! `colored`; callers disable it globally when stderr is not a terminal.

use colored::Colorize;
use std::fmt::Write as _;

/// Severity of a diagnostic. The rendered shape is identical across levels;
/// only the lead word and colour change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
    Hint,
}

impl Level {
    fn word(self) -> &'static str {
        match self {
            Level::Error => "Error",
            Level::Warning => "Warning",
            Level::Hint => "Hint",
        }
    }

    fn paint(self, text: &str) -> colored::ColoredString {
        match self {
            Level::Error => text.red(),
            Level::Warning => text.yellow(),
            Level::Hint => text.green(),
        }
    }
}

/// One renderable diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: Level,
    pub filename: Option<String>,
    pub line: u32,
    pub column: u32,
    /// Width of the caret underline, in characters (minimum 1).
    pub length: usize,
    pub message: String,
    pub suggestion: Option<String>,
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, line: u32, column: u32) -> Self {
        let message = message.into();
        let hint = helpful_hint(&message).map(str::to_string);
        Diagnostic {
            level: Level::Error,
            filename: None,
            line,
            column,
            length: 1,
            message,
            suggestion: None,
            hint,
        }
    }

    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length.max(1);
        self
    }

    pub fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }

    /// Render the diagnostic, pulling the context line out of `source` when
    /// the position is known.
    pub fn render(&self, source: Option<&str>) -> String {
        let mut out = String::new();

        let location = format!(
            "{}:{}:{}",
            self.filename.as_deref().unwrap_or("<input>"),
            self.line,
            self.column
        );
        let _ = writeln!(
            out,
            "{} at {}",
            self.level.paint(self.level.word()),
            location.bold()
        );

        if let Some(context) = source.and_then(|s| source_line(s, self.line)) {
            let _ = writeln!(out, "{}{}", format!("  {:4} | ", self.line).cyan(), context);
            let mut underline = String::new();
            underline.push('^');
            for _ in 1..self.length {
                underline.push('~');
            }
            let _ = writeln!(
                out,
                "{}{}{}",
                "       | ".cyan(),
                " ".repeat(self.column.saturating_sub(1) as usize),
                underline.red()
            );
        }

        let _ = writeln!(out, "{}", self.level.paint(&self.message));

        if let Some(suggestion) = &self.suggestion {
            let _ = writeln!(
                out,
                "\n{}{}{}",
                "Did you mean ".cyan(),
                format!("'{}'", suggestion).green(),
                "?".cyan()
            );
        }

        if let Some(hint) = &self.hint {
            let _ = writeln!(out, "\n{} {}", "Hint:".yellow(), hint);
        }

        out
    }
}

/// Extract a 1-based line from the source text.
fn source_line(source: &str, line: u32) -> Option<&str> {
    if line == 0 {
        return None;
    }
    source
        .lines()
        .nth(line as usize - 1)
        .map(|l| l.trim_end_matches('\r'))
}

/// Canned hints for common error families, keyed on message substrings.
pub fn helpful_hint(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    if lower.contains("undefined variable") {
        Some("Make sure the variable is declared before use with 'let'")
    } else if lower.contains("undefined function") {
        Some("Check if the function is defined or imported")
    } else if lower.contains("type mismatch") {
        Some("Ensure the types match or add explicit type conversion")
    } else if lower.contains("null") {
        Some("Use null safety operator '?' or check for null before accessing")
    } else if lower.contains("syntax") {
        Some("Check for missing semicolons, brackets, or parentheses")
    } else if lower.contains("already defined") {
        Some("Variable names must be unique within the same scope")
    } else {
        None
    }
}

/// Case-insensitive Levenshtein distance.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().flat_map(|c| c.to_lowercase()).collect();
    let b: Vec<char> = b.chars().flat_map(|c| c.to_lowercase()).collect();

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Closest candidate within edit distance 3, if any.
pub fn suggest_similar_name<'a>(
    target: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    let mut best: Option<(usize, &str)> = None;
    for candidate in candidates {
        let distance = levenshtein_distance(target, candidate);
        if distance <= 3 && best.is_none_or(|(d, _)| distance < d) {
            best = Some((distance, candidate));
        }
    }
    best.map(|(_, name)| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(text: &str) -> String {
        // Strip ANSI escapes so assertions survive colour settings.
        let mut out = String::new();
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            if c == '\u{1b}' {
                for d in chars.by_ref() {
                    if d == 'm' {
                        break;
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", "abd"), 1);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_levenshtein_is_case_insensitive() {
        assert_eq!(levenshtein_distance("Count", "count"), 0);
    }

    #[test]
    fn test_suggestion_threshold() {
        let candidates = ["count", "total", "name"];
        assert_eq!(
            suggest_similar_name("countr", candidates),
            Some("count".to_string())
        );
        assert_eq!(suggest_similar_name("zzzzzzzz", candidates), None);
    }

    #[test]
    fn test_suggestion_picks_closest() {
        let candidates = ["value", "values"];
        assert_eq!(
            suggest_similar_name("value", candidates),
            Some("value".to_string())
        );
    }

    #[test]
    fn test_hint_table() {
        assert!(helpful_hint("Undefined variable 'x'").unwrap().contains("let"));
        assert!(helpful_hint("Variable 'x' may be null").unwrap().contains("'?'"));
        assert!(
            helpful_hint("Variable 'x' already defined")
                .unwrap()
                .contains("unique")
        );
        assert_eq!(helpful_hint("Division by zero"), None);
    }

    #[test]
    fn test_render_shape() {
        colored::control::set_override(false);
        let diagnostic = Diagnostic::error("Undefined variable 'countr'", 2, 1)
            .with_filename("demo.riau")
            .with_length(6)
            .with_suggestion(Some("count".to_string()));
        let rendered = plain(&diagnostic.render(Some("let count = 1\ncountr + 1")));

        assert!(rendered.starts_with("Error at demo.riau:2:1"));
        assert!(rendered.contains("     2 | countr + 1"));
        assert!(rendered.contains("       | ^~~~~~"));
        assert!(rendered.contains("Undefined variable 'countr'"));
        assert!(rendered.contains("Did you mean 'count'?"));
        assert!(rendered.contains("Hint: Make sure the variable is declared"));
    }

    #[test]
    fn test_render_without_source_context() {
        colored::control::set_override(false);
        let diagnostic = Diagnostic::error("Division by zero", 3, 1);
        let rendered = plain(&diagnostic.render(None));
        assert!(rendered.starts_with("Error at <input>:3:1"));
        assert!(!rendered.contains('|'));
    }

    #[test]
    fn test_caret_alignment() {
        colored::control::set_override(false);
        let diagnostic = Diagnostic::error("Expected variable name", 1, 5).with_length(1);
        let rendered = plain(&diagnostic.render(Some("let = 5")));
        let caret_line = rendered
            .lines()
            .find(|l| l.contains('^'))
            .expect("caret line");
        // Gutter is 9 characters; the caret sits at column 5 after it.
        assert_eq!(caret_line.find('^'), Some(9 + 4));
    }
}
