//! Editor-facing queries on linked objects: definitions, references and
//! per-file diagnostics.

use super::{linker_for, write_file};
use crate::diagnostics::DiagnosticKind;
use crate::symbols::{SymbolIndex, SymbolKind};

#[test]
fn definitions_at_module_reference() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let module = write_file(
        root,
        "repo/source/m/m.tex",
        "\\begin{modsig}{m}\\symi{alpha}\\end{modsig}",
    );
    let binding = write_file(root, "repo/source/m/m.en.tex", "\\begin{modnl}{m}{en}\\end{modnl}");

    let mut linker = linker_for(root);
    linker.compile_and_link(&binding, None).unwrap();

    // cursor on the `m` of `\begin{modnl}{m}{en}`
    let definitions = linker.definitions(&binding, 0, 14);
    assert!(!definitions.is_empty());
    assert!(definitions
        .iter()
        .any(|(_, symbol)| symbol.location.path == module && matches!(symbol.kind, SymbolKind::Module { .. })));
}

#[test]
fn definitions_prefers_smallest_range() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let binding = write_file(root, "repo/source/m/m.en.tex", "\\begin{modnl}{m}{en}\\end{modnl}");
    write_file(root, "repo/source/m/m.tex", "\\begin{modsig}{m}\\end{modsig}");

    let mut linker = linker_for(root);
    linker.compile_and_link(&binding, None).unwrap();

    let definitions = linker.definitions(&binding, 0, 14);
    // the name reference is narrower than the binding environment itself
    for (range, _) in &definitions {
        assert_eq!(range.start.line, 0);
        assert!(range.end.line == 0);
    }
}

#[test]
fn definitions_outside_any_range_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let binding = write_file(root, "repo/source/m/m.en.tex", "\\begin{modnl}{m}{en}\\end{modnl}");
    write_file(root, "repo/source/m/m.tex", "\\begin{modsig}{m}\\end{modsig}");

    let mut linker = linker_for(root);
    linker.compile_and_link(&binding, None).unwrap();
    assert!(linker.definitions(&binding, 5, 0).is_empty());
}

#[test]
fn references_finds_use_sites_across_links() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let module = write_file(
        root,
        "repo/source/m/m.tex",
        "\\begin{modsig}{m}\\symi{alpha}\\end{modsig}",
    );
    let binding = write_file(root, "repo/source/m/m.en.tex", "\\begin{modnl}{m}{en}\\end{modnl}");

    let mut linker = linker_for(root);
    linker.compile_and_link(&binding, None).unwrap();

    let object = linker.object(&module).unwrap();
    let symbol = object.symbol_table.find(SymbolIndex::ROOT, &["m".to_string()])[0];
    let location = object.symbol_table.get(symbol).location.clone();

    let references = linker.references(&location);
    assert!(!references.is_empty());
    assert!(references.iter().all(|reference| reference.path == binding));
}

#[test]
fn diagnostics_surface_link_errors_per_file() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "m/m.tex", "\\module[id=m]{\\symi{alpha}}");
    let user = write_file(
        root,
        "repo/source/use.tex",
        "\\module[id=u]{\\importmodule[load=m]{m} \\trefi[m]{beta}}",
    );

    let mut linker = linker_for(root);
    linker.compile_and_link(&user, None).unwrap();

    let diagnostics = linker.diagnostics(&user);
    let kinds: Vec<DiagnosticKind> = diagnostics.values().flatten().map(|d| d.kind()).collect();
    assert_eq!(kinds, vec![DiagnosticKind::UndefinedSymbol]);
    assert!(linker.diagnostics(&root.join("m/m.tex")).is_empty());
}

#[test]
fn unreferenced_symbols_are_reported_as_info() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let module = write_file(
        root,
        "repo/source/m/m.tex",
        "\\begin{modsig}{m}\\symi{alpha}\\symi*[noverb]{silent}\\end{modsig}",
    );
    let binding = write_file(root, "repo/source/m/m.en.tex", "\\begin{modnl}{m}{en}\\end{modnl}");

    let mut linker = linker_for(root);
    linker.compile_and_link(&binding, None).unwrap();
    linker.compile_and_link(&module, None).unwrap();
    linker.report_unreferenced();

    let diagnostics = linker.diagnostics(&module);
    let messages: Vec<String> = diagnostics.values().flatten().map(|d| d.to_string()).collect();
    // `alpha` is never referenced; the noverb symbol is exempt
    assert!(messages.iter().any(|m| m.contains("m?alpha")), "got: {messages:?}");
    assert!(!messages.iter().any(|m| m.contains("silent")));
}
