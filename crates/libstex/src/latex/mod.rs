//! LaTeX environment tree for the semantic analyzer.
//!
//! The analyzer does not understand full LaTeX. It only needs the *shape* of
//! a document: which environments and argument-taking control sequences occur
//! where, with which required `{...}` and optional `[...]` arguments. This
//! module provides that shape as a tree of [`Environment`] nodes together
//! with the offset-to-position bookkeeping needed to report locations.
//!
//! Both `\begin{env}...\end{env}` blocks and inline control sequences such as
//! `\trefi[target]{token}` are represented uniformly: an [`Environment`] has
//! a name, required arguments, optional arguments and children. Children are
//! environments nested in the body *and* environments nested inside argument
//! groups, so `\module[id=u]{\importmodule[load=m]{m}}` yields a `module`
//! node with an `importmodule` child.
//!
//! Syntax errors (unterminated environments, stray `\end`) never abort the
//! parse; they are recorded with their location and the parse continues, so
//! that a half-written document still produces a usable tree.

mod parser;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::location::{Location, Position, Range};

/// A piece of source text with the range it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub range: Range,
}

impl Token {
    pub fn new(text: impl Into<String>, range: Range) -> Self {
        Self { text: text.into(), range }
    }

    /// Splits a single-line token at byte `index`, skipping `offset` bytes
    /// between the two halves. Used to take `module?symbol` annotations
    /// apart while keeping both halves addressable.
    pub fn split(&self, index: usize, offset: usize) -> (Token, Token) {
        let left_text = &self.text[..index];
        let right_text = &self.text[index + offset..];
        let line = self.range.start.line;
        let base = self.range.start.character;
        let left = Token::new(
            left_text,
            Range::new(
                Position::new(line, base),
                Position::new(line, base + index as u32),
            ),
        );
        let right = Token::new(
            right_text,
            Range::new(
                Position::new(line, base + (index + offset) as u32),
                self.range.end,
            ),
        );
        (left, right)
    }
}

/// An optional `[...]` argument entry, either bare (`[noverb]`) or keyed
/// (`[id=value]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OArgument {
    pub name: Option<Token>,
    pub value: Token,
}

/// A single environment or control sequence occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// Environment name without the leading backslash
    pub name: Token,
    /// Location spanning the whole construct
    pub location: Location,
    /// Required `{...}` arguments in source order
    pub rargs: Vec<Token>,
    /// Optional `[...]` argument entries in source order
    pub oargs: Vec<OArgument>,
    /// Nested environments from the body and from argument groups
    pub children: Vec<Environment>,
}

impl Environment {
    /// Unnamed optional arguments in source order.
    pub fn unnamed_args(&self) -> Vec<&Token> {
        self.oargs.iter().filter(|o| o.name.is_none()).map(|o| &o.value).collect()
    }

    /// Named `key=value` optional arguments keyed by name.
    pub fn named_args(&self) -> IndexMap<&str, &Token> {
        self.oargs
            .iter()
            .filter_map(|o| o.name.as_ref().map(|n| (n.text.as_str(), &o.value)))
            .collect()
    }

    /// Depth-first traversal with enter and exit callbacks.
    pub fn walk<'a>(
        &'a self,
        enter: &mut impl FnMut(&'a Environment),
        exit: &mut impl FnMut(&'a Environment),
    ) {
        enter(self);
        for child in &self.children {
            child.walk(enter, exit);
        }
        exit(self);
    }
}

/// Source text with a precomputed line index for offset/position conversion.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub path: PathBuf,
    pub text: String,
    line_starts: Vec<usize>,
}

impl SourceText {
    pub fn new(path: impl Into<PathBuf>, text: String) -> Self {
        let mut line_starts = vec![0];
        for (index, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(index + 1);
            }
        }
        Self { path: path.into(), text, line_starts }
    }

    /// Converts a byte offset into a line/column position.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line = self.line_starts.partition_point(|start| *start <= offset) - 1;
        Position::new(line as u32, (offset - self.line_starts[line]) as u32)
    }

    /// Converts a byte offset span into a position range.
    pub fn range(&self, span: std::ops::Range<usize>) -> Range {
        Range::new(self.position(span.start), self.position(span.end))
    }

    /// Converts a byte offset span into a location in this file.
    pub fn location(&self, span: std::ops::Range<usize>) -> Location {
        Location::new(self.path.clone(), self.range(span))
    }

    /// A range covering the whole file.
    pub fn full_range(&self) -> Range {
        self.range(0..self.text.len())
    }
}

/// Parse result for one file: the environment roots plus recorded syntax
/// errors. This is the collaborator interface the intermediate builder and
/// the compiler consume.
#[derive(Debug)]
pub struct LatexParser {
    pub path: PathBuf,
    pub roots: Vec<Environment>,
    pub syntax_errors: Vec<(Location, String)>,
    pub source: SourceText,
}

impl LatexParser {
    /// Parses `path`, reading it from disk unless `content` is supplied.
    pub fn parse(path: &Path, content: Option<&str>) -> io::Result<LatexParser> {
        let text = match content {
            Some(text) => text.to_string(),
            None => fs::read_to_string(path)?,
        };
        let source = SourceText::new(path, text);
        let (roots, syntax_errors) = parser::parse_document(&source);
        Ok(LatexParser {
            path: path.to_path_buf(),
            roots,
            syntax_errors,
            source,
        })
    }

    /// Depth-first traversal over every root.
    pub fn walk<'a>(
        &'a self,
        enter: &mut impl FnMut(&'a Environment),
        exit: &mut impl FnMut(&'a Environment),
    ) {
        for root in &self.roots {
            root.walk(enter, exit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_text_positions() {
        let source = SourceText::new("/tmp/a.tex", "ab\ncd\n".to_string());
        assert_eq!(source.position(0), Position::new(0, 0));
        assert_eq!(source.position(2), Position::new(0, 2));
        assert_eq!(source.position(3), Position::new(1, 0));
        assert_eq!(source.position(5), Position::new(1, 2));
    }

    #[test]
    fn token_split() {
        let token = Token::new(
            "module?symbol",
            Range::new(Position::new(1, 5), Position::new(1, 18)),
        );
        let (left, right) = token.split(6, 1);
        assert_eq!(left.text, "module");
        assert_eq!(left.range.end, Position::new(1, 11));
        assert_eq!(right.text, "symbol");
        assert_eq!(right.range.start, Position::new(1, 12));
    }
}
