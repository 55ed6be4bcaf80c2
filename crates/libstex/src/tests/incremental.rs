//! Incrementality: objectfile reuse, linked-cache invalidation and bulk
//! compilation of changed files.

use std::time::{Duration, SystemTime};

use super::{linker_for, write_file};

#[test]
fn live_edit_invalidates_only_the_edited_entry() {
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

    // linking filled the cache entry for the signature the binding imports
    assert!(!linker.relink_required(&module, "m", false));

    // a live edit of the binding alone leaves the signature's entry valid
    let later = SystemTime::now() + Duration::from_secs(30);
    linker.workspace.report_live_edit(&binding, later);
    assert!(!linker.relink_required(&module, "m", false));

    // a live edit of the signature invalidates it
    linker.workspace.report_live_edit(&module, later);
    assert!(linker.relink_required(&module, "m", false));
}

#[test]
fn relink_required_for_uncached_entries() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let module = write_file(root, "repo/source/m.tex", "\\begin{modsig}{m}\\end{modsig}");
    let linker = linker_for(root);
    assert!(linker.relink_required(&module, "m", false));
    assert!(linker.relink_required(&module, "m", true));
}

#[test]
fn live_edit_forces_recompilation_of_the_object() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let module = write_file(root, "repo/source/m.tex", "\\begin{modsig}{m}\\end{modsig}");

    let mut linker = linker_for(root);
    linker.compile_and_link(&module, None).unwrap();
    assert!(!linker
        .compiler
        .recompilation_required(&module, linker.workspace.get_time_live_modified(&module)));

    let later = SystemTime::now() + Duration::from_secs(30);
    linker.workspace.report_live_edit(&module, later);
    assert!(linker
        .compiler
        .recompilation_required(&module, linker.workspace.get_time_live_modified(&module)));
}

#[test]
fn usemodule_entries_are_cached_separately() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "lib/m.tex", "\\module[id=m]{\\symi{alpha}}");
    let user = write_file(root, "x/u.tex", "\\module[id=u]{\\usemodule[load=lib]{m}}");

    let mut linker = linker_for(root);
    linker.compile_and_link(&user, None).unwrap();

    let m = root.join("lib/m.tex");
    // linking `u` recursed with usemodule-on-stack set, so only that flavour
    // of the entry is cached
    assert!(!linker.relink_required(&m, "m", true));
    assert!(linker.relink_required(&m, "m", false));
}

#[test]
fn fresh_objectfile_is_reused_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let module = write_file(root, "repo/source/m.tex", "\\begin{modsig}{m}\\symi{alpha}\\end{modsig}");

    linker_for(root).compile_and_link(&module, None).unwrap();

    // a second session starts with an empty in-memory map but a fresh
    // objectfile on disk
    let mut second = linker_for(root);
    assert!(!second.compiler.recompilation_required(&module, None));
    let linked = second.compile_and_link(&module, None).unwrap();
    assert!(linked.errors.is_empty());
}

#[test]
fn corrupt_objectfile_triggers_recompilation() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let module = write_file(root, "repo/source/m.tex", "\\begin{modsig}{m}\\symi{alpha}\\end{modsig}");

    linker_for(root).compile_and_link(&module, None).unwrap();
    let mut second = linker_for(root);
    let objectfile = second.compiler.objectfile_path(&module);
    std::fs::write(&objectfile, b"garbage").unwrap();

    let linked = second.compile_and_link(&module, None).unwrap();
    assert!(linked.errors.is_empty());
    assert_eq!(linked.dependencies.len(), 0);
}

#[test]
fn compile_changed_fans_out_and_merges() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let a = write_file(root, "repo/source/a.tex", "\\begin{modsig}{a}\\symi{x}\\end{modsig}");
    let b = write_file(root, "repo/source/b.tex", "\\begin{modsig}{b}\\symi{y}\\end{modsig}");
    let missing = root.join("repo/source/missing.tex");

    let mut linker = linker_for(root);
    let results = linker.compile_changed(&[a.clone(), b.clone(), missing]);
    assert_eq!(results.len(), 3);
    let failures = results.iter().filter(|(_, result)| result.is_err()).count();
    assert_eq!(failures, 1);
    assert!(linker.object(&a).is_some());
    assert!(linker.object(&b).is_some());
}

#[test]
fn workspace_changes_drive_recompilation() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let a = write_file(root, "repo/source/a.tex", "\\begin{modsig}{a}\\end{modsig}");

    let mut linker = linker_for(root);
    let changes = linker.workspace.changes();
    assert!(changes.created.contains(&a));

    let created: Vec<_> = changes.created.into_iter().collect();
    let results = linker.compile_changed(&created);
    assert!(results.iter().all(|(_, result)| result.is_ok()));
}
