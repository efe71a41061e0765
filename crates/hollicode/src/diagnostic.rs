//! Renderable warnings for non-fatal conditions.
//!
//! The loader and interpreter keep scripts running through recoverable
//! problems (an unrecognized opcode, an unknown bytecode version, a pop
//! from an empty stack) and report them as [`Diagnostic`]s instead of
//! errors. Rendering is Rust-compiler-style: the message, the offending
//! bytecode line with an underline, and any notes.

use std::fmt;

/// A single bytecode line attached to a diagnostic.
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// 1-based line number in the bytecode source.
    pub number: usize,
    /// The raw line text.
    pub text: String,
    /// Optional byte range within the line to underline. When absent the
    /// whole line is underlined.
    pub span: Option<(usize, usize)>,
}

/// A non-fatal warning raised while loading or executing bytecode.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// The warning message (e.g. "unrecognized opcode `FROB`").
    pub message: String,
    /// The bytecode line that triggered the warning, if there is one.
    /// Runtime warnings (such as popping an empty stack) carry none.
    pub line: Option<SourceLine>,
    /// Additional notes (e.g. "the line was skipped").
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            notes: Vec::new(),
        }
    }

    /// Attach the offending bytecode line.
    pub fn with_line(mut self, number: usize, text: impl Into<String>) -> Self {
        self.line = Some(SourceLine {
            number,
            text: text.into(),
            span: None,
        });
        self
    }

    /// Underline only `start..end` (byte offsets) of the attached line.
    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        if let Some(line) = &mut self.line {
            line.span = Some((start, end));
        }
        self
    }

    /// Add a note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "warning: {}", self.message)?;

        if let Some(line) = &self.line {
            let width = line.number.to_string().len();
            let (start, end) = line.span.unwrap_or((0, line.text.len()));

            writeln!(f, "{:width$} |", "", width = width)?;
            writeln!(f, "{} | {}", line.number, line.text)?;
            write!(f, "{:width$} | ", "", width = width)?;
            write!(f, "{:start$}", "")?;
            for _ in 0..(end - start).max(1) {
                write!(f, "^")?;
            }
            writeln!(f)?;
            writeln!(f, "{:width$} |", "", width = width)?;
        }

        for note in &self.notes {
            writeln!(f, "  = note: {}", note)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_diagnostic() {
        let diag = Diagnostic::new("popped an empty operand stack");
        let output = diag.to_string();
        assert!(output.contains("warning: popped an empty operand stack"));
        assert!(!output.contains("|"));
    }

    #[test]
    fn test_diagnostic_with_line() {
        let diag = Diagnostic::new("unrecognized opcode `FROB`")
            .with_line(7, "FROB 12")
            .with_span(0, 4)
            .with_note("the line was skipped");

        let output = diag.to_string();
        assert!(output.contains("warning: unrecognized opcode `FROB`"));
        assert!(output.contains("7 | FROB 12"));
        assert!(output.contains("^^^^"));
        assert!(output.contains("= note: the line was skipped"));
    }

    #[test]
    fn test_whole_line_underlined_without_span() {
        let diag = Diagnostic::new("bad line").with_line(2, "???");
        assert!(diag.to_string().contains("^^^"));
    }
}
