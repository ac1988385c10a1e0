//! Snippet-and-caret rendering for structured errors.
//!
//! Every diagnostic is three lines — `ErrorName at line L`, the full
//! source line, and a tilde rule with a caret at the reported column —
//! followed by the headline message and, when available, a suggestion.

use crate::token::Span;

/// A renderable diagnostic: heading name, anchor span, headline
/// message, optional trailing suggestion line.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub name: &'static str,
    pub span: Span,
    pub message: String,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn new(name: &'static str, span: Span, message: String) -> Self {
        Self {
            name,
            span,
            message,
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }
}

/// Formats the diagnostic against the source text it points into.
pub fn render(source: &str, diagnostic: &Diagnostic) -> String {
    let line_number = diagnostic.span.line.max(1);
    let line_text = source.lines().nth(line_number - 1).unwrap_or("");
    let caret_line = caret_line(line_text, diagnostic.span.column);

    let mut rendered = format!(
        "{} at line {}\n{}\n{}\n{}",
        diagnostic.name, line_number, line_text, caret_line, diagnostic.message
    );
    if let Some(suggestion) = &diagnostic.suggestion {
        rendered.push('\n');
        rendered.push_str(suggestion);
    }
    rendered
}

fn caret_line(line_text: &str, column: usize) -> String {
    let width = line_text.chars().count().max(column);
    let caret_at = column.max(1) - 1;
    (0..width)
        .map(|i| if i == caret_at { '^' } else { '~' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_three_line_snippet_with_caret() {
        let source = "x = 3\ny = x % 'a'\n";
        let span = Span::new(12, 13, 2, 7);
        let diagnostic = Diagnostic::new(
            "UnsupportedOperandTypeError",
            span,
            "unsupported operand type(s) for %: 'int' and 'str'".to_string(),
        );
        let rendered = render(source, &diagnostic);
        assert_eq!(
            rendered,
            "UnsupportedOperandTypeError at line 2\n\
             y = x % 'a'\n\
             ~~~~~~^~~~~\n\
             unsupported operand type(s) for %: 'int' and 'str'"
        );
    }

    #[test]
    fn appends_suggestion_line_when_present() {
        let source = "print(contuer)\n";
        let span = Span::new(6, 13, 1, 7);
        let diagnostic = Diagnostic::new(
            "NameNotFoundError",
            span,
            "name 'contuer' is not defined".to_string(),
        )
        .with_suggestion(Some("Perhaps you meant to type 'counter'?".to_string()));
        let rendered = render(source, &diagnostic);
        assert!(rendered.ends_with("Perhaps you meant to type 'counter'?"));
        assert_eq!(rendered.lines().count(), 5);
    }

    #[test]
    fn caret_survives_columns_past_the_line_end() {
        let diagnostic = Diagnostic::new("TokenizerError", Span::new(3, 3, 1, 10), "x".to_string());
        let rendered = render("ab\n", &diagnostic);
        let caret = rendered.lines().nth(2).expect("caret line");
        assert_eq!(caret.chars().count(), 10);
        assert!(caret.ends_with('^'));
    }
}
