//! The linker: transitive dependency resolution over compiled objects.
//!
//! `compile_and_link` turns a per-file [`Object`] into a *linked* object by
//! walking its dependencies in declared order, recursively linking each
//! target file restricted to the required module, and merging the imported
//! symbol tables into the dependency's scope. The recursion carries its
//! state explicitly: a stack keyed by `(file, module)` for cycle detection
//! and the two flags the import semantics need (the top-level module of the
//! traversal and whether a `usemodule`-style private import is anywhere on
//! the stack). No global state is involved.
//!
//! Linked results are held in an in-memory cache keyed by
//! `(usemodule-on-stack, file, module)`; [`Linker::relink_required`] decides
//! staleness from file modification times, live-edit timestamps and every
//! file that contributed symbols or dependency targets to the cached entry.
//!
//! After all dependencies are merged, every reference of the object is
//! validated against the now-complete symbol table.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use indexmap::IndexMap;
use rayon::prelude::*;

use crate::compiler::{normalize_path, CompileError, Compiler, Dependency, Object};
use crate::diagnostics::Diagnostic;
use crate::location::{Location, Position, Range};
use crate::symbols::{AccessModifier, DefType, SymbolData, SymbolIndex, SymbolKind};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy)]
struct StackEntry {
    /// Frame that owns the dependency which pushed this entry
    owner: usize,
    /// Range of that dependency in its owner's file
    range: Range,
}

#[derive(Debug)]
struct CycleReport {
    owner: usize,
    range: Range,
    diagnostic: Diagnostic,
}

/// Explicit recursion state of one `compile_and_link` run.
#[derive(Debug, Default)]
struct LinkContext {
    stack: IndexMap<(PathBuf, String), StackEntry>,
    cycles: Vec<CycleReport>,
    next_frame: usize,
}

pub struct Linker {
    pub compiler: Compiler,
    pub workspace: Workspace,
    /// Unlinked objects by source file
    objects: HashMap<PathBuf, Object>,
    /// Fully linked objects by the root file they were requested for
    links: HashMap<PathBuf, Object>,
    /// Linked imports keyed by (usemodule-on-stack, file, module)
    cache: HashMap<(bool, PathBuf, String), (SystemTime, Object)>,
}

impl Linker {
    pub fn new(compiler: Compiler, workspace: Workspace) -> Self {
        Self {
            compiler,
            workspace,
            objects: HashMap::new(),
            links: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    /// The unlinked object of `file`, if it was compiled in this session.
    pub fn object(&self, file: &Path) -> Option<&Object> {
        self.objects.get(&normalize_path(file))
    }

    /// The linked object rooted at `file`, if it was linked in this session.
    pub fn linked(&self, file: &Path) -> Option<&Object> {
        self.links.get(&normalize_path(file))
    }

    /// Compiles `file` and transitively links its dependencies, restricted
    /// to `required_modules` when given. The linked object is recorded for
    /// the editor queries and also returned.
    pub fn compile_and_link(
        &mut self,
        file: &Path,
        required_modules: Option<&[String]>,
    ) -> Result<Object, CompileError> {
        let file = normalize_path(file);
        let mut context = LinkContext::default();
        let object = self.link_inner(&file, required_modules, &mut context, None, false)?;
        self.links.insert(file, object.clone());
        Ok(object)
    }

    /// Compiles a set of independent files in parallel. Workers share
    /// nothing; finished objects are merged into the session sequentially.
    pub fn compile_changed(&mut self, files: &[PathBuf]) -> Vec<(PathBuf, Result<Object, CompileError>)> {
        let compiler = &self.compiler;
        let results: Vec<(PathBuf, Result<Object, CompileError>)> = files
            .par_iter()
            .map(|file| (normalize_path(file), compiler.compile(file, None, false)))
            .collect();
        for (file, result) in &results {
            if let Ok(object) = result {
                self.objects.insert(file.clone(), object.clone());
            }
        }
        results
    }

    fn link_inner(
        &mut self,
        file: &Path,
        required_modules: Option<&[String]>,
        context: &mut LinkContext,
        toplevel_module: Option<&str>,
        use_on_stack: bool,
    ) -> Result<Object, CompileError> {
        let file = normalize_path(file);
        let recompile = self
            .compiler
            .recompilation_required(&file, self.workspace.get_time_live_modified(&file));
        let mut object = if recompile {
            let fresh = self.compiler.compile(&file, None, false)?;
            self.objects.insert(file.clone(), fresh.clone());
            fresh
        } else if let Some(cached) = self.objects.get(&file) {
            cached.clone()
        } else {
            // Fresh objectfile from an earlier session; a missing or corrupt
            // one is recovered by recompiling.
            match self.compiler.load_from_objectfile(&file) {
                Ok(loaded) => {
                    self.objects.insert(file.clone(), loaded.clone());
                    loaded
                }
                Err(error) => {
                    log::warn!("unusable objectfile for \"{}\": {error}", file.display());
                    let fresh = self.compiler.compile(&file, None, false)?;
                    self.objects.insert(file.clone(), fresh.clone());
                    fresh
                }
            }
        };

        let frame = context.next_frame;
        context.next_frame += 1;

        for dependency in object.dependencies.clone() {
            if let Some(required) = required_modules {
                let scope_module = object.symbol_table.current_module_name(dependency.scope);
                match scope_module {
                    Some(name) if required.iter().any(|required| *required == name) => {}
                    _ => continue,
                }
            }
            if !dependency.export && !context.stack.is_empty() {
                // private imports are not re-exported to importers
                continue;
            }
            if use_on_stack && toplevel_module == Some(dependency.module_name.as_str()) {
                // suppress re-entry into the traversal's top-level module
                continue;
            }
            let key = (dependency.file_hint.clone(), dependency.module_name.clone());
            if let Some(entry) = context.stack.get(&key) {
                // The diagnostic belongs to the object that owns the import
                // already on the stack; it is attached when that frame
                // unwinds.
                context.cycles.push(CycleReport {
                    owner: entry.owner,
                    range: entry.range,
                    diagnostic: Diagnostic::cyclic_dependency(
                        &dependency.module_name,
                        Location::new(file.clone(), dependency.range),
                    ),
                });
                continue;
            }
            let next_use_on_stack = use_on_stack || !dependency.export;
            let imported = if self.relink_required(
                &dependency.file_hint,
                &dependency.module_name,
                next_use_on_stack,
            ) {
                context.stack.insert(key.clone(), StackEntry { owner: frame, range: dependency.range });
                let toplevel = toplevel_module
                    .map(str::to_string)
                    .or_else(|| object.symbol_table.current_module_name(dependency.scope));
                let result = self.link_inner(
                    &dependency.file_hint,
                    Some(std::slice::from_ref(&dependency.module_name)),
                    context,
                    toplevel.as_deref(),
                    next_use_on_stack,
                );
                context.stack.shift_remove(&key);
                match result {
                    Ok(imported) => {
                        self.cache.insert(
                            (next_use_on_stack, dependency.file_hint.clone(), dependency.module_name.clone()),
                            (SystemTime::now(), imported.clone()),
                        );
                        imported
                    }
                    Err(error) => {
                        object.add_error(dependency.range, Diagnostic::link_failure(error.to_string()));
                        continue;
                    }
                }
            } else {
                let key = (next_use_on_stack, dependency.file_hint.clone(), dependency.module_name.clone());
                match self.cache.get(&key) {
                    Some((_, cached)) => cached.clone(),
                    None => continue,
                }
            };
            self.link_dependency(&mut object, &dependency, &imported);
        }

        let mut index = 0;
        while index < context.cycles.len() {
            if context.cycles[index].owner == frame {
                let report = context.cycles.remove(index);
                object.add_error(report.range, report.diagnostic);
            } else {
                index += 1;
            }
        }

        self.validate_references(&mut object);
        Ok(object)
    }

    /// Merges `imported` into `object` at the scope the dependency names.
    pub fn link_dependency(&self, object: &mut Object, dependency: &Dependency, imported: &Object) {
        let path = vec![dependency.module_name.clone()];
        let alternatives = imported.symbol_table.lookup(SymbolIndex::ROOT, &path, None);
        if alternatives.len() > 1 {
            object.add_error(
                dependency.range,
                Diagnostic::module_not_unique(&dependency.module_name, imported.file.clone()),
            );
            return;
        }
        let module = match alternatives.first() {
            Some(module) => *module,
            None => {
                object.add_error(
                    dependency.range,
                    Diagnostic::module_not_defined(&dependency.module_name, imported.file.clone()),
                );
                return;
            }
        };
        if imported.symbol_table.get(module).access_modifier != AccessModifier::Public {
            object.add_error(
                dependency.range,
                Diagnostic::private_module_import(&dependency.module_name),
            );
            return;
        }
        let mut collisions = Vec::new();
        object
            .symbol_table
            .import_from(dependency.scope, &imported.symbol_table, module, &mut collisions);
        for collision in collisions {
            object.add_error(dependency.range, collision.into());
        }
    }

    /// True when no fresh linked copy of `(file, module)` exists for the
    /// given usemodule flag: not cached, source newer than the cache entry,
    /// live-edited since, or any contributing file newer than the entry.
    pub fn relink_required(&self, file: &Path, module_name: &str, use_on_stack: bool) -> bool {
        let file = normalize_path(file);
        let key = (use_on_stack, file.clone(), module_name.to_string());
        let (stored_at, cached) = match self.cache.get(&key) {
            Some(entry) => entry,
            None => return true,
        };
        let file_mtime = match fs::metadata(&file).and_then(|meta| meta.modified()) {
            Ok(mtime) => mtime,
            Err(_) => return true,
        };
        if *stored_at < file_mtime {
            return true;
        }
        if self
            .workspace
            .get_time_live_modified(&file)
            .is_some_and(|live| *stored_at < live)
        {
            return true;
        }
        let mut contributing: HashSet<PathBuf> = HashSet::new();
        for (_, data) in cached.symbol_table.iter() {
            if data.parent.is_some() {
                contributing.insert(data.location.path.clone());
            }
        }
        for dependency in &cached.dependencies {
            contributing.insert(dependency.file_hint.clone());
        }
        for path in contributing {
            if let Ok(mtime) = fs::metadata(&path).and_then(|meta| meta.modified()) {
                if *stored_at < mtime {
                    return true;
                }
            }
            if self
                .workspace
                .get_time_live_modified(&path)
                .is_some_and(|live| *stored_at < live)
            {
                return true;
            }
        }
        false
    }

    /// Validates every reference of `object` against its (linked) symbol
    /// table, per the rules of the reference kinds and noverb annotations.
    fn validate_references(&self, object: &mut Object) {
        let mut found: Vec<(Range, Diagnostic)> = Vec::new();
        for reference in &object.references {
            let refname = reference.name.join("?");
            let resolved = object.symbol_table.lookup(reference.scope, &reference.name, None);
            if resolved.is_empty() {
                let suggestions = object.find_similar_symbols(&reference.name, reference.kind);
                found.push((
                    reference.range,
                    Diagnostic::undefined_symbol(&refname, reference.kind, suggestions),
                ));
                continue;
            }
            // Alternatives of one definition share their qualified name;
            // several distinct qualified names make the reference ambiguous.
            let qualified: HashSet<Vec<String>> = resolved
                .iter()
                .map(|symbol| object.symbol_table.qualified(*symbol))
                .collect();
            if qualified.len() > 1 {
                found.push((reference.range, Diagnostic::non_unique_symbol(&refname)));
                continue;
            }
            for symbol in resolved {
                let data = object.symbol_table.get(symbol);
                let kind = data.reference_kind();
                if !reference.kind.intersects(kind) {
                    found.push((
                        reference.range,
                        Diagnostic::wrong_reference_kind(&refname, reference.kind, kind),
                    ));
                    continue;
                }
                if let SymbolKind::Def { noverb, noverbs, .. } = &data.kind {
                    if *noverb {
                        found.push((reference.range, Diagnostic::noverb_reference(&refname)));
                    }
                    if !noverbs.is_empty() {
                        if let Some(binding) = object.symbol_table.get_current_binding(reference.scope) {
                            if let SymbolKind::Binding { lang } = &object.symbol_table.get(binding).kind {
                                if noverbs.contains(lang) {
                                    found.push((
                                        reference.range,
                                        Diagnostic::noverb_language_reference(&refname, lang),
                                    ));
                                }
                            }
                        }
                    }
                }
            }
        }
        for (range, diagnostic) in found {
            object.add_error(range, diagnostic);
        }
    }

    /// Info diagnostics for symbols no linked object ever references.
    /// `defi` definitions are their own reference and `noverb` symbols are
    /// expected to stay unreferenced, so both are exempt.
    pub fn report_unreferenced(&mut self) {
        let mut referenced: HashSet<Location> = HashSet::new();
        for link in self.links.values() {
            for reference in &link.references {
                for symbol in link.symbol_table.lookup(reference.scope, &reference.name, None) {
                    referenced.insert(link.symbol_table.get(symbol).location.clone());
                }
            }
        }
        let mut additions: Vec<(PathBuf, Range, Diagnostic)> = Vec::new();
        for (file, origin) in &self.objects {
            if !self.links.contains_key(file) {
                continue;
            }
            for (index, data) in origin.symbol_table.iter() {
                if data.parent.is_none() {
                    continue;
                }
                if let SymbolKind::Def { def_type, noverb, .. } = &data.kind {
                    if *def_type == DefType::Def || *noverb {
                        continue;
                    }
                    if referenced.contains(&data.location) {
                        continue;
                    }
                    let name = origin.symbol_table.qualified(index).join("?");
                    additions.push((file.clone(), data.location.range, Diagnostic::never_referenced(name)));
                }
            }
        }
        for (file, range, diagnostic) in additions {
            if let Some(link) = self.links.get_mut(&file) {
                link.add_error(range, diagnostic);
            }
        }
    }

    /// Definitions under the cursor: symbols whose location contains the
    /// position plus targets of references containing it, restricted to the
    /// smallest covering range.
    pub fn definitions(&self, file: &Path, line: u32, character: u32) -> Vec<(Range, SymbolData)> {
        let file = normalize_path(file);
        let position = Position::new(line, character);
        let link = match self.links.get(&file) {
            Some(link) => link,
            None => return Vec::new(),
        };
        let mut by_length: BTreeMap<(u32, u32), Vec<(Range, SymbolData)>> = BTreeMap::new();
        for (_, data) in link.symbol_table.iter() {
            if data.parent.is_none() {
                continue;
            }
            if data.location.contains(&file, position) {
                by_length
                    .entry(data.location.range.length())
                    .or_default()
                    .push((data.location.range, data.clone()));
            }
        }
        for reference in &link.references {
            if reference.range.contains(position) {
                for symbol in link.symbol_table.lookup(reference.scope, &reference.name, None) {
                    let data = link.symbol_table.get(symbol).clone();
                    by_length.entry(reference.range.length()).or_default().push((reference.range, data));
                }
            }
        }
        by_length.into_iter().next().map(|(_, definitions)| definitions).unwrap_or_default()
    }

    /// Every reference location across linked objects that resolves to the
    /// symbol defined at `symbol_location`. Only links that import the
    /// symbol's file are considered.
    pub fn references(&self, symbol_location: &Location) -> Vec<Location> {
        let mut out = Vec::new();
        for (file, link) in &self.links {
            let imports_symbol_file = link.file == symbol_location.path
                || link
                    .symbol_table
                    .iter()
                    .any(|(_, data)| data.location.path == symbol_location.path)
                || link
                    .dependencies
                    .iter()
                    .any(|dependency| dependency.file_hint == symbol_location.path);
            if !imports_symbol_file {
                continue;
            }
            for reference in &link.references {
                let resolved = link.symbol_table.lookup(reference.scope, &reference.name, None);
                if resolved
                    .iter()
                    .any(|symbol| link.symbol_table.get(*symbol).location == *symbol_location)
                {
                    out.push(Location::new(file.clone(), reference.range));
                }
            }
        }
        out
    }

    /// All diagnostics of the linked object rooted at `file`.
    pub fn diagnostics(&self, file: &Path) -> IndexMap<Range, Vec<Diagnostic>> {
        self.links
            .get(&normalize_path(file))
            .map(|link| link.errors.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;
    use crate::location::{Position, Range};
    use crate::symbols::{DefType, ModuleType, Symbol};
    use std::collections::BTreeSet;

    fn location(file: &str, line: u32) -> Location {
        Location::new(file, Range::new(Position::new(line, 0), Position::new(line, 8)))
    }

    fn linker(dir: &Path) -> Linker {
        let compiler = Compiler::new(dir, &dir.join(".stex/objects"));
        let workspace = Workspace::new(dir);
        Linker::new(compiler, workspace)
    }

    /// Builds an object whose root holds one module with one `sym`.
    fn module_object(file: &str, module: &str, access: AccessModifier) -> Object {
        let mut object = Object::new(PathBuf::from(file));
        let index = object
            .symbol_table
            .add_module(SymbolIndex::ROOT, ModuleType::Modsig, location(file, 0), Some(module.into()))
            .unwrap();
        object.symbol_table.get_mut(index).access_modifier = access;
        object
            .symbol_table
            .add_child(
                index,
                Symbol {
                    name: "alpha".into(),
                    location: location(file, 1),
                    kind: SymbolKind::Def {
                        def_type: DefType::Sym,
                        noverb: false,
                        noverbs: BTreeSet::new(),
                    },
                    access_modifier: AccessModifier::Public,
                },
                false,
            )
            .unwrap();
        object
    }

    fn dependency(scope: SymbolIndex, module: &str, file: &str) -> Dependency {
        Dependency {
            range: Range::new(Position::new(3, 0), Position::new(3, 10)),
            scope,
            module_name: module.into(),
            module_type_hint: ModuleType::Modsig,
            file_hint: PathBuf::from(file),
            export: true,
        }
    }

    #[test]
    fn link_dependency_merges_public_module() {
        let dir = tempfile::tempdir().unwrap();
        let linker = linker(dir.path());
        let imported = module_object("/ws/m.tex", "m", AccessModifier::Public);
        let mut object = Object::new(PathBuf::from("/ws/use.tex"));
        let dep = dependency(SymbolIndex::ROOT, "m", "/ws/m.tex");
        linker.link_dependency(&mut object, &dep, &imported);
        assert!(object.errors.is_empty());
        let path = vec!["m".to_string(), "alpha".to_string()];
        assert_eq!(object.symbol_table.find(SymbolIndex::ROOT, &path).len(), 1);
    }

    #[test]
    fn link_dependency_rejects_private_module() {
        let dir = tempfile::tempdir().unwrap();
        let linker = linker(dir.path());
        let imported = module_object("/ws/m.tex", "m", AccessModifier::Private);
        let mut object = Object::new(PathBuf::from("/ws/use.tex"));
        let dep = dependency(SymbolIndex::ROOT, "m", "/ws/m.tex");
        linker.link_dependency(&mut object, &dep, &imported);
        let kinds: Vec<DiagnosticKind> = object.errors.values().flatten().map(|d| d.kind()).collect();
        assert_eq!(kinds, vec![DiagnosticKind::PrivateModuleImport]);
    }

    #[test]
    fn link_dependency_reports_missing_module() {
        let dir = tempfile::tempdir().unwrap();
        let linker = linker(dir.path());
        let imported = Object::new(PathBuf::from("/ws/m.tex"));
        let mut object = Object::new(PathBuf::from("/ws/use.tex"));
        let dep = dependency(SymbolIndex::ROOT, "m", "/ws/m.tex");
        linker.link_dependency(&mut object, &dep, &imported);
        let kinds: Vec<DiagnosticKind> = object.errors.values().flatten().map(|d| d.kind()).collect();
        assert_eq!(kinds, vec![DiagnosticKind::ModuleNotDefined]);
    }
}
