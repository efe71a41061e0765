//! Bytecode loaders for the text and structured formats.
//!
//! Both formats share the header schema `{ "bytecodeVersion": "..." }`.
//! The text format (`.hlct`) is line-oriented: the header line followed by
//! one `OPCODE` or `OPCODE ARG` per line. The structured format (`.hlcj`)
//! is a JSON tree whose `instructions` array mixes bare opcode strings and
//! `[opcode, operand]` pairs, with operands already typed.
//!
//! Loading is tolerant where the compiler may be newer than the
//! interpreter: unrecognized opcodes and unknown bytecode versions are
//! warnings, and the offending line is skipped. Malformed input (an
//! unreadable header, a missing instructions array, an operand that cannot
//! be parsed for its opcode) is fatal.

use std::path::Path;
use std::str::FromStr;

use serde_json::Value as Json;

use crate::bytecode::{BinOp, COMPATIBLE_VERSIONS, Header, Op, Program};
use crate::diagnostic::Diagnostic;
use crate::error::{Error, Result};

/// The two bytecode encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Line-oriented text bytecode (`.hlct`).
    Text,
    /// JSON-tree bytecode (`.hlcj`).
    Structured,
}

impl Format {
    /// Infer the format from a file extension: `.hlcj` is structured,
    /// anything else is text.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some("hlcj") => Format::Structured,
            _ => Format::Text,
        }
    }
}

/// Translates bytecode source into a [`Program`], collecting warnings.
///
/// The loader is a one-shot translator: feed it a source, take the program
/// and any [`Diagnostic`]s it raised. [`Interpreter`](crate::Interpreter)
/// wraps this behind its `load_*` methods and adopts the warnings.
#[derive(Default)]
pub struct Loader {
    /// When set, the text loader consumes the header line without parsing
    /// or validating it.
    pub ignore_text_header: bool,
    warnings: Vec<Diagnostic>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load bytecode in the given format.
    pub fn load(&mut self, source: &str, format: Format) -> Result<Program> {
        match format {
            Format::Text => self.load_text(source),
            Format::Structured => self.load_structured(source),
        }
    }

    /// Warnings raised so far.
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// Drain the collected warnings.
    pub fn take_warnings(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.warnings)
    }

    fn warn(&mut self, diagnostic: Diagnostic) {
        log::warn!("{}", diagnostic);
        self.warnings.push(diagnostic);
    }

    // -----------------------------------------------------------------------
    // Text format
    // -----------------------------------------------------------------------

    /// Load line-oriented text bytecode.
    pub fn load_text(&mut self, source: &str) -> Result<Program> {
        let mut lines = source.lines().enumerate();

        let header = match lines.next() {
            Some(_) if self.ignore_text_header => Header::default(),
            Some((_, line)) => self.parse_header(line)?,
            None if self.ignore_text_header => Header::default(),
            None => return Err(Error::MissingHeader),
        };

        let mut instructions = Vec::new();
        for (index, line) in lines {
            if line.is_empty() {
                continue;
            }
            // enumerate() is 0-based over the whole file, header included
            if let Some(op) = self.parse_line(index + 1, line)? {
                instructions.push(op);
            }
        }

        Ok(Program {
            header,
            instructions,
        })
    }

    /// Parse the header line, which uses the structured-format syntax.
    fn parse_header(&mut self, line: &str) -> Result<Header> {
        let json: Json = serde_json::from_str(line).map_err(|_| Error::MissingHeader)?;
        let version = json
            .get("bytecodeVersion")
            .and_then(Json::as_str)
            .ok_or(Error::MissingHeader)?;
        let header = Header {
            bytecode_version: version.to_string(),
        };
        self.check_version(&header);
        Ok(header)
    }

    fn check_version(&mut self, header: &Header) {
        if !COMPATIBLE_VERSIONS.contains(&header.bytecode_version.as_str()) {
            self.warn(
                Diagnostic::new(format!(
                    "unknown bytecode version `{}`",
                    header.bytecode_version
                ))
                .with_note(format!("compatible versions: {}", COMPATIBLE_VERSIONS.join(", ")))
                .with_note("loading anyway"),
            );
        }
    }

    /// Parse one instruction line. Returns `None` for skipped lines.
    fn parse_line(&mut self, number: usize, line: &str) -> Result<Option<Op>> {
        let (mnemonic, raw_operand) = match line.split_once(' ') {
            Some((mnemonic, rest)) => (mnemonic, Some(rest)),
            None => (line, None),
        };

        if mnemonic.is_empty() || !mnemonic.bytes().all(|b| b.is_ascii_alphabetic()) {
            self.warn(
                Diagnostic::new("line does not look like an instruction")
                    .with_line(number, line)
                    .with_note("the line was skipped"),
            );
            return Ok(None);
        }

        let operand = raw_operand.map(process_escapes);

        let op = match mnemonic {
            "RET" => Op::Return,
            "POP" => Op::Pop,
            "NIL" => Op::PushNil,
            "LOOK" => Op::Lookup,
            "NOT" => Op::Not,
            "NEG" => Op::Negate,
            "ECHO" => Op::Echo,
            "WAIT" => Op::Wait,
            "STR" => Op::PushString(require(mnemonic, operand, number)?),
            "NUM" => Op::PushNumber(parse_operand::<f64>(mnemonic, operand, number)?),
            "BOOL" => {
                let arg = require(mnemonic, operand, number)?;
                match arg.as_str() {
                    "true" => Op::PushBool(true),
                    "false" => Op::PushBool(false),
                    _ => {
                        return Err(Error::InvalidOperand {
                            opcode: mnemonic.to_string(),
                            operand: arg,
                            line: number,
                        });
                    }
                }
            }
            "JMP" => Op::Jump(parse_operand::<i64>(mnemonic, operand, number)?),
            "FJMP" => Op::JumpIfFalse(parse_operand::<i64>(mnemonic, operand, number)?),
            "TJMP" => Op::TracedJump(parse_operand::<i64>(mnemonic, operand, number)?),
            "CALL" => Op::Call(parse_operand::<usize>(mnemonic, operand, number)?),
            "OPT" => Op::Option(parse_operand::<usize>(mnemonic, operand, number)?),
            "GETV" => Op::GetVariable(require(mnemonic, operand, number)?),
            "BOP" => {
                let arg = require(mnemonic, operand, number)?;
                match BinOp::from_symbol(&arg) {
                    Some(op) => Op::BinaryOp(op),
                    None => {
                        return Err(Error::InvalidOperand {
                            opcode: mnemonic.to_string(),
                            operand: arg,
                            line: number,
                        });
                    }
                }
            }
            _ => {
                self.warn(
                    Diagnostic::new(format!("unrecognized opcode `{}`", mnemonic))
                        .with_line(number, line)
                        .with_span(0, mnemonic.len())
                        .with_note("the line was skipped"),
                );
                return Ok(None);
            }
        };

        Ok(Some(op))
    }

    // -----------------------------------------------------------------------
    // Structured format
    // -----------------------------------------------------------------------

    /// Load structured (JSON) bytecode.
    pub fn load_structured(&mut self, source: &str) -> Result<Program> {
        let root: Json = serde_json::from_str(source)?;

        let version = root
            .get("header")
            .and_then(|h| h.get("bytecodeVersion"))
            .and_then(Json::as_str)
            .ok_or(Error::MissingHeader)?;
        let header = Header {
            bytecode_version: version.to_string(),
        };
        self.check_version(&header);

        let elements = root
            .get("instructions")
            .and_then(Json::as_array)
            .ok_or(Error::MissingInstructions)?;

        let mut instructions = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            if let Some(op) = self.decode_element(index + 1, element)? {
                instructions.push(op);
            }
        }

        Ok(Program {
            header,
            instructions,
        })
    }

    /// Decode one element of the `instructions` array. Operands arrive
    /// already typed; they are stored verbatim.
    fn decode_element(&mut self, index: usize, element: &Json) -> Result<Option<Op>> {
        let (mnemonic, operand) = match element {
            Json::String(s) => (s.as_str(), None),
            Json::Array(pair) => match pair.first().and_then(Json::as_str) {
                Some(mnemonic) => (mnemonic, pair.get(1)),
                None => return Err(Error::MalformedElement { index }),
            },
            _ => return Err(Error::MalformedElement { index }),
        };

        let op = match mnemonic {
            "RET" => Op::Return,
            "POP" => Op::Pop,
            "NIL" => Op::PushNil,
            "LOOK" => Op::Lookup,
            "NOT" => Op::Not,
            "NEG" => Op::Negate,
            "ECHO" => Op::Echo,
            "WAIT" => Op::Wait,
            "STR" => Op::PushString(json_str(mnemonic, operand, index)?),
            "NUM" => Op::PushNumber(json_f64(mnemonic, operand, index)?),
            "BOOL" => Op::PushBool(json_bool(mnemonic, operand, index)?),
            "JMP" => Op::Jump(json_i64(mnemonic, operand, index)?),
            "FJMP" => Op::JumpIfFalse(json_i64(mnemonic, operand, index)?),
            "TJMP" => Op::TracedJump(json_i64(mnemonic, operand, index)?),
            "CALL" => Op::Call(json_usize(mnemonic, operand, index)?),
            "OPT" => Op::Option(json_usize(mnemonic, operand, index)?),
            "GETV" => Op::GetVariable(json_str(mnemonic, operand, index)?),
            "BOP" => {
                let symbol = json_str(mnemonic, operand, index)?;
                match BinOp::from_symbol(&symbol) {
                    Some(op) => Op::BinaryOp(op),
                    None => {
                        return Err(Error::InvalidOperand {
                            opcode: mnemonic.to_string(),
                            operand: symbol,
                            line: index,
                        });
                    }
                }
            }
            _ => {
                self.warn(
                    Diagnostic::new(format!("unrecognized opcode `{}`", mnemonic))
                        .with_note(format!("instruction {} was skipped", index)),
                );
                return Ok(None);
            }
        };

        Ok(Some(op))
    }
}

// ---------------------------------------------------------------------------
// Text operand helpers
// ---------------------------------------------------------------------------

/// Process the text format's escape sequences: `\n` becomes a newline,
/// `\t` a tab, any other `\x` becomes `x`, and a lone trailing `\` stays a
/// backslash. Unicode escapes are deliberately not decoded; non-ASCII
/// content belongs in the structured format.
fn process_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn require(mnemonic: &str, operand: Option<String>, line: usize) -> Result<String> {
    operand.ok_or_else(|| Error::MissingOperand {
        opcode: mnemonic.to_string(),
        line,
    })
}

fn parse_operand<T: FromStr>(mnemonic: &str, operand: Option<String>, line: usize) -> Result<T> {
    let arg = require(mnemonic, operand, line)?;
    arg.parse().map_err(|_| Error::InvalidOperand {
        opcode: mnemonic.to_string(),
        operand: arg,
        line,
    })
}

// ---------------------------------------------------------------------------
// Structured operand helpers
// ---------------------------------------------------------------------------

fn json_operand<'a>(mnemonic: &str, operand: Option<&'a Json>, index: usize) -> Result<&'a Json> {
    operand.ok_or_else(|| Error::MissingOperand {
        opcode: mnemonic.to_string(),
        line: index,
    })
}

fn invalid_json(mnemonic: &str, operand: &Json, index: usize) -> Error {
    Error::InvalidOperand {
        opcode: mnemonic.to_string(),
        operand: operand.to_string(),
        line: index,
    }
}

fn json_str(mnemonic: &str, operand: Option<&Json>, index: usize) -> Result<String> {
    let value = json_operand(mnemonic, operand, index)?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid_json(mnemonic, value, index))
}

fn json_f64(mnemonic: &str, operand: Option<&Json>, index: usize) -> Result<f64> {
    let value = json_operand(mnemonic, operand, index)?;
    value
        .as_f64()
        .ok_or_else(|| invalid_json(mnemonic, value, index))
}

fn json_i64(mnemonic: &str, operand: Option<&Json>, index: usize) -> Result<i64> {
    let value = json_operand(mnemonic, operand, index)?;
    value
        .as_i64()
        .ok_or_else(|| invalid_json(mnemonic, value, index))
}

fn json_usize(mnemonic: &str, operand: Option<&Json>, index: usize) -> Result<usize> {
    let value = json_operand(mnemonic, operand, index)?;
    value
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| invalid_json(mnemonic, value, index))
}

fn json_bool(mnemonic: &str, operand: Option<&Json>, index: usize) -> Result<bool> {
    let value = json_operand(mnemonic, operand, index)?;
    value
        .as_bool()
        .ok_or_else(|| invalid_json(mnemonic, value, index))
}
