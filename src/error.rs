// Toy Error Handling Module
// Error kinds, source spans, formatted reports and stack traces

use colored::*;
use std::fmt::{self, Write as _};

/// Represents a position in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::new(1, 1, 0)
    }
}

/// Represents a span in the source code (start to end position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn from_positions(
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> Self {
        Span::new(
            Position::new(start_line, start_col, 0),
            Position::new(end_line, end_col, 0),
        )
    }

    /// Zero-width span at one point
    pub fn single(line: usize, column: usize, offset: usize) -> Self {
        let at = Position::new(line, column, offset);
        Span::new(at, at)
    }

    /// Span covering both `self` and `other`
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }
}

/// Kinds of errors raised by the toolchain and the VM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SyntaxError,
    TypeError,
    CastError,
    UndefinedVariable,
    DuplicateBinding,
    InvalidCall,
    StackProtocolViolation,
    RuntimeError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::CastError => "CastError",
            ErrorKind::UndefinedVariable => "UndefinedVariable",
            ErrorKind::DuplicateBinding => "DuplicateBinding",
            ErrorKind::InvalidCall => "InvalidCall",
            ErrorKind::StackProtocolViolation => "StackProtocolViolation",
            ErrorKind::RuntimeError => "RuntimeError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stack frame for error traces
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub function_name: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl StackFrame {
    pub fn new(
        function_name: impl Into<String>,
        file: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  at {} ({}:{}:{})",
            self.function_name, self.file, self.line, self.column
        )
    }
}

/// Main error type for Toy
#[derive(Debug, Clone)]
pub struct ToyError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
    pub file: String,
    pub help: Option<String>,
    pub stack_trace: Vec<StackFrame>,
    located: bool,
    source_lines: Vec<String>,
}

impl ToyError {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        span: Span,
        file: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            file: file.into(),
            help: None,
            stack_trace: Vec::new(),
            located: true,
            source_lines: Vec::new(),
        }
    }

    /// An error raised below the executor, before an instruction span is known.
    /// The executor attaches the location with [`ToyError::locate`].
    pub fn unlocated(kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut error = Self::new(kind, message, Span::default(), "");
        error.located = false;
        error
    }

    pub fn is_located(&self) -> bool {
        self.located
    }

    pub fn locate(mut self, span: Span, file: impl Into<String>) -> Self {
        self.span = span;
        self.file = file.into();
        self.located = true;
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source_lines = source.lines().map(String::from).collect();
        self
    }

    pub fn with_stack_trace(mut self, trace: Vec<StackFrame>) -> Self {
        self.stack_trace = trace;
        self
    }

    /// Full report: headline, source excerpt, help and stack trace
    pub fn format(&self) -> String {
        let mut out = String::new();
        let at = self.span.start;
        let _ = writeln!(
            out,
            "{}: {} at {}:{}:{}",
            self.kind.as_str().red().bold(),
            self.message.white().bold(),
            self.file,
            at.line,
            at.column
        );
        self.write_excerpt(&mut out);
        if let Some(help) = &self.help {
            let _ = writeln!(out, "\n      {}: {}", "Help".cyan().bold(), help);
        }
        if !self.stack_trace.is_empty() {
            let _ = writeln!(out, "\n{}:", "Stack trace".yellow().bold());
            for frame in &self.stack_trace {
                let _ = writeln!(out, "{}", frame);
            }
        }
        out
    }

    /// The failing line between its neighbours, underlined
    fn write_excerpt(&self, out: &mut String) {
        let line = self.span.start.line;
        if self.source_lines.is_empty() || line == 0 || line > self.source_lines.len() {
            return;
        }
        out.push('\n');
        let first = line.saturating_sub(1).max(1);
        let last = (line + 1).min(self.source_lines.len());
        for number in first..=last {
            let gutter = format!("{:>4} |", number);
            let text = &self.source_lines[number - 1];
            if number != line {
                let _ = writeln!(out, "{} {}", gutter.dimmed(), text);
                continue;
            }
            let _ = writeln!(out, "{} {}", gutter.red(), text);
            let _ = writeln!(
                out,
                "{}{}",
                " ".repeat(6 + self.span.start.column),
                "^".repeat(self.underline_width()).red().bold()
            );
        }
    }

    fn underline_width(&self) -> usize {
        let Span { start, end } = self.span;
        if end.line == start.line && end.column > start.column {
            end.column - start.column
        } else {
            1
        }
    }
}

impl fmt::Display for ToyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl std::error::Error for ToyError {}

/// Result type for Toy operations
pub type ToyResult<T> = Result<T, ToyError>;

// Convenience constructors for common errors
impl ToyError {
    pub fn syntax_error(message: impl Into<String>, span: Span, file: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, message, span, file)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::unlocated(ErrorKind::TypeError, message)
    }

    pub fn cast_error(expected: &str, found: &str) -> Self {
        Self::unlocated(
            ErrorKind::CastError,
            format!("Expected {}, found {}", expected, found),
        )
    }

    pub fn undefined(name: &str) -> Self {
        Self::unlocated(
            ErrorKind::UndefinedVariable,
            format!("Undefined variable '{}'", name),
        )
    }

    pub fn duplicate(name: &str) -> Self {
        Self::unlocated(
            ErrorKind::DuplicateBinding,
            format!("'{}' is already defined in this scope", name),
        )
    }

    pub fn invalid_call(message: impl Into<String>) -> Self {
        Self::unlocated(ErrorKind::InvalidCall, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::unlocated(ErrorKind::StackProtocolViolation, message)
    }

    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::unlocated(ErrorKind::RuntimeError, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlocated_then_located() {
        let err = ToyError::type_error("Cannot add 'Number' and 'String'");
        assert!(!err.is_located());
        let err = err.locate(Span::single(3, 5, 20), "main.toy");
        assert!(err.is_located());
        assert_eq!(err.span.start.line, 3);
        assert_eq!(err.file, "main.toy");
    }

    #[test]
    fn test_format_contains_excerpt_and_help() {
        colored::control::set_override(false);
        let err = ToyError::syntax_error("Expected ';'", Span::single(2, 7, 0), "demo.toy")
            .with_source("var a = 1;\nvar b = 2\nprint(b);")
            .with_help("Terminate statements with ';'");
        let text = err.format();
        assert!(text.starts_with("SyntaxError: Expected ';' at demo.toy:2:7"));
        assert!(text.contains("   2 | var b = 2"));
        assert!(text.contains("Help: Terminate statements with ';'"));
    }

    #[test]
    fn test_stack_frame_display() {
        let frame = StackFrame::new("fib", "fib.toy", 4, 12);
        assert_eq!(frame.to_string(), "  at fib (fib.toy:4:12)");
    }
}
