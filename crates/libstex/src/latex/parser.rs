//! Nom-based parser producing the LaTeX environment tree.
//!
//! The grammar recognised here is deliberately small: comments, groups,
//! `\begin`/`\end` environments, control sequences with trailing `[...]` and
//! `{...}` argument groups, and plain text. Anything the grammar does not
//! understand is consumed as text so that parsing always terminates with a
//! tree; structural problems are recorded as syntax errors at their offset
//! and the walk continues.

use nom::bytes::complete::{is_not, tag, take_till1, take_while1};
use nom::character::complete::{char, multispace0};
use nom::combinator::{opt, recognize};
use nom::sequence::{delimited, pair, preceded};
use nom::{IResult, Input, Parser};
use nom_locate::LocatedSpan;

use crate::latex::{Environment, OArgument, SourceText, Token};
use crate::location::Location;

type Span<'a> = LocatedSpan<&'a str>;
type PError<'a> = nom_language::error::VerboseError<Span<'a>>;

/// What a recursive [`parse_nodes`] call is expected to stop at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator<'a> {
    /// End of input
    Eof,
    /// A closing `}` belonging to the enclosing group
    Brace,
    /// The matching `\end{name}` of the enclosing environment
    End(&'a str),
}

struct ParseContext<'s> {
    source: &'s SourceText,
    errors: Vec<(std::ops::Range<usize>, String)>,
}

impl ParseContext<'_> {
    fn error(&mut self, span: std::ops::Range<usize>, message: impl Into<String>) {
        self.errors.push((span, message.into()));
    }

    fn token(&self, span: Span<'_>) -> Token {
        let start = span.location_offset();
        let text = *span.fragment();
        Token::new(text, self.source.range(start..start + text.len()))
    }
}

/// Parses a whole document into root environments plus recorded errors.
pub(super) fn parse_document(source: &SourceText) -> (Vec<Environment>, Vec<(Location, String)>) {
    let mut ctx = ParseContext { source, errors: Vec::new() };
    let input = Span::new(source.text.as_str());
    let (_, roots) = parse_nodes(input, Terminator::Eof, &mut ctx);
    let errors = ctx
        .errors
        .into_iter()
        .map(|(span, message)| (source.location(span), message))
        .collect();
    (roots, errors)
}

fn offset(input: Span<'_>) -> usize {
    input.location_offset()
}

fn advance(input: Span<'_>, count: usize) -> Span<'_> {
    input.take_from(count.min(input.fragment().len()))
}

/// An environment name: ASCII letters with an optional trailing `*`.
fn env_name<'a>(input: Span<'a>) -> IResult<Span<'a>, Span<'a>, PError<'a>> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic()),
        opt(char('*')),
    ))
    .parse(input)
}

fn begin_tag<'a>(input: Span<'a>) -> IResult<Span<'a>, Span<'a>, PError<'a>> {
    preceded(tag("\\begin"), delimited(char('{'), env_name, char('}'))).parse(input)
}

fn end_tag<'a>(input: Span<'a>) -> IResult<Span<'a>, Span<'a>, PError<'a>> {
    preceded(tag("\\end"), delimited(char('{'), env_name, char('}'))).parse(input)
}

fn command_name<'a>(input: Span<'a>) -> IResult<Span<'a>, Span<'a>, PError<'a>> {
    preceded(char('\\'), env_name).parse(input)
}

/// A `%` comment running to the end of the line.
fn comment<'a>(input: Span<'a>) -> IResult<Span<'a>, Span<'a>, PError<'a>> {
    recognize(pair(char('%'), opt(is_not("\n")))).parse(input)
}

/// A chunk of plain text up to the next structurally interesting character.
fn text_chunk<'a>(input: Span<'a>) -> IResult<Span<'a>, Span<'a>, PError<'a>> {
    take_till1(|c: char| matches!(c, '\\' | '%' | '{' | '}')).parse(input)
}

/// Parses nodes until the terminator is reached. The terminator token itself
/// is not consumed; the caller is responsible for it.
fn parse_nodes<'a>(
    mut input: Span<'a>,
    terminator: Terminator<'a>,
    ctx: &mut ParseContext<'_>,
) -> (Span<'a>, Vec<Environment>) {
    let mut nodes = Vec::new();
    loop {
        if input.fragment().is_empty() {
            let at = offset(input);
            match terminator {
                Terminator::Eof => {}
                Terminator::Brace => ctx.error(at..at, "unterminated group"),
                Terminator::End(name) => ctx.error(at..at, format!("missing \\end{{{name}}}")),
            }
            return (input, nodes);
        }
        let rest = *input.fragment();

        if rest.starts_with('%') {
            if let Ok((next, _)) = comment(input) {
                input = next;
                continue;
            }
        }

        if rest.starts_with('}') {
            if terminator == Terminator::Brace {
                return (input, nodes);
            }
            ctx.error(offset(input)..offset(input) + 1, "unexpected '}'");
            input = advance(input, 1);
            continue;
        }

        if rest.starts_with('{') {
            // Transparent group: children are lifted into the current level.
            let (after_content, mut children) = parse_nodes(advance(input, 1), Terminator::Brace, ctx);
            nodes.append(&mut children);
            input = if after_content.fragment().starts_with('}') {
                advance(after_content, 1)
            } else {
                after_content
            };
            continue;
        }

        if rest.starts_with("\\end") {
            if let Ok((next, name)) = end_tag(input) {
                if let Terminator::End(expected) = terminator {
                    if *name.fragment() == expected {
                        return (input, nodes);
                    }
                }
                ctx.error(
                    offset(input)..offset(next),
                    format!("unexpected \\end{{{}}}", name.fragment()),
                );
                input = next;
                continue;
            }
        }

        if rest.starts_with("\\begin") {
            if let Ok((after_name, name)) = begin_tag(input) {
                let start = offset(input);
                let (after_args, rargs, oargs, mut children) = parse_args(after_name, ctx);
                let (after_body, mut body) =
                    parse_nodes(after_args, Terminator::End(*name.fragment()), ctx);
                children.append(&mut body);
                let next = match end_tag(after_body) {
                    Ok((next, _)) => next,
                    Err(_) => after_body,
                };
                nodes.push(Environment {
                    name: ctx.token(name),
                    location: ctx.source.location(start..offset(next)),
                    rargs,
                    oargs,
                    children,
                });
                input = next;
                continue;
            }
        }

        if rest.starts_with('\\') {
            if let Ok((after_name, name)) = command_name(input) {
                let start = offset(input);
                let (after_args, rargs, oargs, children) = parse_args(after_name, ctx);
                nodes.push(Environment {
                    name: ctx.token(name),
                    location: ctx.source.location(start..offset(after_args)),
                    rargs,
                    oargs,
                    children,
                });
                input = after_args;
                continue;
            }
            // Escaped character such as \% or \\
            let skip = 1 + rest[1..].chars().next().map_or(0, char::len_utf8);
            input = advance(input, skip);
            continue;
        }

        match text_chunk(input) {
            Ok((next, _)) => input = next,
            Err(_) => input = advance(input, 1),
        }
    }
}

/// Parses the `[...]` and `{...}` argument groups trailing an environment or
/// control sequence name. Environments found inside required arguments are
/// returned as children of the construct that owns the argument.
fn parse_args<'a>(
    mut input: Span<'a>,
    ctx: &mut ParseContext<'_>,
) -> (Span<'a>, Vec<Token>, Vec<OArgument>, Vec<Environment>) {
    let mut rargs = Vec::new();
    let mut oargs = Vec::new();
    let mut children = Vec::new();
    loop {
        let after_ws = match multispace0::<Span<'a>, PError<'a>>(input) {
            Ok((rest, _)) => rest,
            Err(_) => input,
        };
        match after_ws.fragment().chars().next() {
            Some('{') => {
                let inner_start = offset(after_ws) + 1;
                let (after_content, mut nested) =
                    parse_nodes(advance(after_ws, 1), Terminator::Brace, ctx);
                let inner_end = offset(after_content);
                let text = &ctx.source.text[inner_start..inner_end];
                rargs.push(Token::new(text, ctx.source.range(inner_start..inner_end)));
                children.append(&mut nested);
                input = if after_content.fragment().starts_with('}') {
                    advance(after_content, 1)
                } else {
                    after_content
                };
            }
            Some('[') => match parse_oarg_group(after_ws, ctx) {
                Some((next, mut entries)) => {
                    oargs.append(&mut entries);
                    input = next;
                }
                None => return (input, rargs, oargs, children),
            },
            _ => return (input, rargs, oargs, children),
        }
    }
}

/// Parses one `[...]` group into its comma-separated entries. Braces nest, so
/// `noverb={en,de}` stays a single entry. Returns `None` when the group never
/// closes; the error is recorded and the caller stops collecting arguments.
fn parse_oarg_group<'a>(
    input: Span<'a>,
    ctx: &mut ParseContext<'_>,
) -> Option<(Span<'a>, Vec<OArgument>)> {
    let fragment = *input.fragment();
    let base = offset(input);
    let mut depth = 0usize;
    let mut entry_start = 1usize;
    let mut spans = Vec::new();
    let mut close = None;
    for (index, c) in fragment.char_indices().skip(1) {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                spans.push(entry_start..index);
                entry_start = index + 1;
            }
            ']' if depth == 0 => {
                spans.push(entry_start..index);
                close = Some(index);
                break;
            }
            _ => {}
        }
    }
    let close = match close {
        Some(close) => close,
        None => {
            ctx.error(base..base + 1, "unterminated optional argument");
            return None;
        }
    };
    let mut entries = Vec::new();
    for span in spans {
        if let Some(entry) = parse_oarg_entry(fragment, base, span, ctx) {
            entries.push(entry);
        }
    }
    Some((advance(input, close + 1), entries))
}

fn parse_oarg_entry(
    fragment: &str,
    base: usize,
    span: std::ops::Range<usize>,
    ctx: &ParseContext<'_>,
) -> Option<OArgument> {
    let raw = &fragment[span.clone()];
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let start = span.start + (raw.len() - raw.trim_start().len());
    let end = start + trimmed.len();
    // `key=value` entries become named arguments when the key is a plain word
    if let Some(eq) = trimmed.find('=') {
        let key = &trimmed[..eq];
        if !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric()) {
            let value = &trimmed[eq + 1..];
            return Some(OArgument {
                name: Some(Token::new(key, ctx.source.range(base + start..base + start + eq))),
                value: Token::new(
                    value,
                    ctx.source.range(base + start + eq + 1..base + end),
                ),
            });
        }
    }
    Some(OArgument {
        name: None,
        value: Token::new(trimmed, ctx.source.range(base + start..base + end)),
    })
}

#[cfg(test)]
mod tests {
    use crate::latex::LatexParser;
    use std::path::Path;

    fn parse(content: &str) -> LatexParser {
        LatexParser::parse(Path::new("/tmp/test.tex"), Some(content)).unwrap()
    }

    #[test]
    fn parses_simple_environment() {
        let parser = parse("\\begin{modsig}{m}\\end{modsig}");
        assert_eq!(parser.roots.len(), 1);
        let env = &parser.roots[0];
        assert_eq!(env.name.text, "modsig");
        assert_eq!(env.rargs.len(), 1);
        assert_eq!(env.rargs[0].text, "m");
        assert!(parser.syntax_errors.is_empty());
    }

    #[test]
    fn parses_command_with_oargs() {
        let parser = parse("\\trefi[m?alpha]{alpha}");
        let env = &parser.roots[0];
        assert_eq!(env.name.text, "trefi");
        assert_eq!(env.rargs[0].text, "alpha");
        assert_eq!(env.unnamed_args().len(), 1);
        assert_eq!(env.unnamed_args()[0].text, "m?alpha");
    }

    #[test]
    fn parses_named_oargs() {
        let parser = parse("\\symdef[name=plus,noverb={en,de}]{pl}");
        let env = &parser.roots[0];
        let named = env.named_args();
        assert_eq!(named.get("name").map(|t| t.text.as_str()), Some("plus"));
        assert_eq!(named.get("noverb").map(|t| t.text.as_str()), Some("{en,de}"));
    }

    #[test]
    fn nested_commands_become_children() {
        let parser = parse("\\module[id=u]{\\importmodule[load=m]{m} \\trefi{beta}}");
        let module = &parser.roots[0];
        assert_eq!(module.name.text, "module");
        let names: Vec<_> = module.children.iter().map(|c| c.name.text.as_str()).collect();
        assert_eq!(names, vec!["importmodule", "trefi"]);
    }

    #[test]
    fn environment_body_children() {
        let parser = parse("\\begin{module}[id=m]\n\\symi{x}\n\\end{module}\n");
        let module = &parser.roots[0];
        assert_eq!(module.children.len(), 1);
        assert_eq!(module.children[0].name.text, "symi");
        assert_eq!(module.named_args().get("id").map(|t| t.text.as_str()), Some("m"));
    }

    #[test]
    fn comments_are_skipped() {
        let parser = parse("% \\symi{ignored}\n\\symi{kept}\n");
        assert_eq!(parser.roots.len(), 1);
        assert_eq!(parser.roots[0].rargs[0].text, "kept");
    }

    #[test]
    fn unterminated_environment_records_error() {
        let parser = parse("\\begin{module}[id=m]\n\\symi{x}\n");
        assert_eq!(parser.roots.len(), 1);
        assert!(parser
            .syntax_errors
            .iter()
            .any(|(_, message)| message.contains("missing \\end{module}")));
    }

    #[test]
    fn mismatched_end_records_error() {
        let parser = parse("\\begin{module}\\end{modsig}\\end{module}");
        assert!(parser
            .syntax_errors
            .iter()
            .any(|(_, message)| message.contains("unexpected \\end{modsig}")));
    }
}
