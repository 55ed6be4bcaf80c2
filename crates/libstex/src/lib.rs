//! Incremental semantic analyzer for sTeX-flavoured LaTeX workspaces.
//!
//! sTeX embeds modules, symbol declarations, references and cross-module
//! imports in a LaTeX surface syntax. This library compiles each source file
//! into an [`Object`](compiler::Object) — a local symbol table, the ordered
//! dependencies its imports declare, the references it makes and the
//! diagnostics found on the way — and then *links* objects transitively so
//! that every reference either resolves to a definition or carries a
//! diagnostic.
//!
//! # Architecture
//!
//! The pipeline runs leaves-first:
//!
//! 1. [`latex`]: parse a file into a raw environment tree
//! 2. [`intermediate`]: classify environments into typed nodes
//! 3. [`compiler`]: walk the typed tree into a per-file [`Object`](compiler::Object)
//! 4. [`linker`]: resolve dependencies transitively, with cycle detection
//!    and an incremental cache, then validate every reference
//!
//! Supporting modules: [`location`] (positions and ranges), [`symbols`]
//! (the hierarchical symbol table), [`diagnostics`] (the fault taxonomy)
//! and [`workspace`] (file set and live-edit timestamps).
//!
//! # Usage
//!
//! ```ignore
//! use libstex::{compiler::Compiler, linker::Linker, workspace::Workspace};
//!
//! let compiler = Compiler::new(&root, &root.join(".stex/objects"));
//! let mut linker = Linker::new(compiler, Workspace::new(&root));
//! let linked = linker.compile_and_link(&file, None)?;
//! for (range, diagnostics) in &linked.errors {
//!     // render with the file content
//! }
//! ```
//!
//! # Error handling
//!
//! Faults are attached to objects as [`diagnostics::Diagnostic`] values at
//! the range they occurred; only a missing source file and I/O failures
//! propagate as [`compiler::CompileError`].

pub mod compiler;
pub mod diagnostics;
pub mod intermediate;
pub mod latex;
pub mod linker;
pub mod location;
pub mod symbols;
pub mod workspace;

#[cfg(test)]
mod tests;

use std::path::Path;

use compiler::{CompileError, Compiler, Object};
use linker::Linker;
use workspace::Workspace;

/// Compiles a single file into its object without linking.
///
/// Convenience wrapper for one-shot use; long-running sessions should keep
/// a [`Compiler`] around to reuse the objectfile cache settings.
pub fn compile_file(root: &Path, outdir: &Path, file: &Path) -> Result<Object, CompileError> {
    Compiler::new(root, outdir).compile(file, None, false)
}

/// Compiles `file` and links its transitive dependencies.
///
/// Convenience wrapper constructing a fresh [`Linker`]; the returned object
/// carries the merged symbol table and all diagnostics.
pub fn compile_and_link_file(root: &Path, outdir: &Path, file: &Path) -> Result<Object, CompileError> {
    let compiler = Compiler::new(root, outdir);
    let workspace = Workspace::new(root);
    let mut linker = Linker::new(compiler, workspace);
    linker.compile_and_link(file, None)
}
