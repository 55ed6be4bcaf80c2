//! sTeX analyzer command line driver.
//!
//! Compiles and links the given files against a workspace root and reports
//! every diagnostic with source context:
//!
//! ```text
//! stexc <workspace root> file1.tex file2.tex ...
//! ```
//!
//! Objectfiles are cached below `<root>/.stex/objects` so repeated runs only
//! recompile what changed. The process exits with status 1 when any
//! error-severity diagnostic was produced.

use std::path::{Path, PathBuf};
use std::process::exit;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::{self, termcolor::{ColorChoice, StandardStream}};
use libstex::compiler::{Compiler, Object};
use libstex::diagnostics::Severity;
use libstex::linker::Linker;
use libstex::location::Position;
use libstex::workspace::Workspace;
use log::LevelFilter;
use simplelog::{
    ColorChoice as LogColorChoice, CombinedLogger, ConfigBuilder, LevelPadding, TermLogger,
    TerminalMode, ThreadLogMode,
};

/// Byte offset of a position inside `content`.
fn offset_of(content: &str, position: Position) -> usize {
    let mut line_starts = vec![0usize];
    for (index, byte) in content.bytes().enumerate() {
        if byte == b'\n' {
            line_starts.push(index + 1);
        }
    }
    let line_start = line_starts
        .get(position.line as usize)
        .copied()
        .unwrap_or(content.len());
    (line_start + position.character as usize).min(content.len())
}

/// Renders every diagnostic of a linked object against its source text.
fn report(object: &Object) -> bool {
    let content = std::fs::read_to_string(&object.file).unwrap_or_default();
    let mut files = SimpleFiles::new();
    let file_id = files.add(object.file.display().to_string(), content.clone());

    let writer = StandardStream::stderr(ColorChoice::Auto);
    let config = term::Config::default();
    let mut has_errors = false;

    for (range, diagnostics) in &object.errors {
        let start = offset_of(&content, range.start);
        let end = offset_of(&content, range.end).max(start);
        for entry in diagnostics {
            let diagnostic = match entry.severity() {
                Severity::Error => {
                    has_errors = true;
                    Diagnostic::error()
                }
                Severity::Warning => Diagnostic::warning(),
                Severity::Info => Diagnostic::note(),
            };
            let diagnostic = diagnostic
                .with_message(entry.to_string())
                .with_labels(vec![Label::primary(file_id, start..end)]);
            let _ = term::emit(&mut writer.lock(), &config, &files, &diagnostic);
        }
    }
    has_errors
}

fn main() {
    let config = ConfigBuilder::new()
        .set_location_level(LevelFilter::Error)
        .set_thread_mode(ThreadLogMode::Both)
        .set_level_padding(LevelPadding::Off)
        .set_thread_level(LevelFilter::Off)
        .build();
    let _ = CombinedLogger::init(vec![TermLogger::new(
        LevelFilter::Warn,
        config,
        TerminalMode::Mixed,
        LogColorChoice::Auto,
    )]);

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <workspace root> file1.tex file2.tex ...", args[0]);
        exit(1);
    }

    let root = PathBuf::from(&args[1]);
    if !root.is_dir() {
        eprintln!("workspace root is not a directory: {}", root.display());
        exit(1);
    }

    let compiler = Compiler::new(&root, &root.join(".stex/objects"));
    let mut linker = Linker::new(compiler, Workspace::new(&root));

    let mut failed = false;
    for file in &args[2..] {
        match linker.compile_and_link(Path::new(file), None) {
            Ok(linked) => {
                if report(&linked) {
                    failed = true;
                }
            }
            Err(error) => {
                eprintln!("{file}: {error}");
                failed = true;
            }
        }
    }

    if failed {
        exit(1);
    }
    println!("ok");
}
