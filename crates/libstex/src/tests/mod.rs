//! End-to-end tests over real workspaces in temporary directories.
//!
//! Each test builds a minimal workspace on disk, runs the compiler and the
//! linker against it and checks the produced objects, caches and queries.

use std::fs;
use std::path::{Path, PathBuf};

use crate::compiler::Compiler;
use crate::linker::Linker;
use crate::workspace::Workspace;

mod incremental;
mod queries;

/// Writes `content` to `<root>/<relative>`, creating parent directories.
pub(crate) fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

/// A linker with the objectfile cache below `<root>/.stex/objects`.
pub(crate) fn linker_for(root: &Path) -> Linker {
    let compiler = Compiler::new(root, &root.join(".stex/objects"));
    Linker::new(compiler, Workspace::new(root))
}
