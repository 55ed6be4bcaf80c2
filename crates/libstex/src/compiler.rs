//! The per-file compiler.
//!
//! A compiler behaves like `cc -c`: it takes one source file and produces one
//! [`Object`] holding everything that can be known about the file in
//! isolation: its symbol table, the dependencies its imports declare, the
//! references it makes and the diagnostics collected on the way. Objects are
//! optionally persisted to `<outdir>/<sha1(parent dir)>/<name>.stexobj` so a
//! later session can skip recompilation; resolving dependencies across files
//! is the linker's job.
//!
//! Faults never abort compilation. Apart from a missing source file, every
//! problem ends up in `Object.errors` at the range it was found.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::diagnostics::Diagnostic;
use crate::intermediate::{
    DefiTree, GImportTree, ImportModuleTree, IntermediateKind, IntermediateTree, ModNlTree,
    ModSigTree, ModuleTree, NodeIndex, ScopeTree, SymdefTree, SymiTree, TassignTree, TrefiTree,
    ViewEnv, ViewSigTree, ViewTree,
};
use crate::latex::{LatexParser, Token};
use crate::location::{Location, Range};
use crate::symbols::{
    reference_kind_serde, AccessModifier, DefType, ModuleType, ReferenceKind, Symbol, SymbolIndex,
    SymbolKind, SymbolTable,
};

/// Magic prefix and format version of persisted objectfiles. Readers reject
/// anything else as corrupt, which triggers recompilation.
const OBJECTFILE_MAGIC: &[u8; 8] = b"STEXOBJ\0";
const OBJECTFILE_VERSION: u32 = 1;

/// Errors that escape [`Compiler::compile`]. Everything else is recorded as
/// a diagnostic inside the produced object.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Faults of the on-disk object cache.
#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("objectfile not found for \"{}\"", .0.display())]
    NotFound(PathBuf),

    #[error("objectfile for \"{}\" is corrupted", .0.display())]
    Corrupt(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// An unresolved import: which module is needed, where the import was
/// written, which file probably provides it and whether the import is
/// re-exported to importers of this file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub range: Range,
    /// Symbol the imported module's table gets merged under
    pub scope: SymbolIndex,
    pub module_name: String,
    pub module_type_hint: ModuleType,
    pub file_hint: PathBuf,
    /// `false` for `usemodule`-style private imports
    pub export: bool,
}

/// A use-site of a symbol, validated after linking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub range: Range,
    /// Symbol under which the reference is lexically positioned
    pub scope: SymbolIndex,
    pub name: Vec<String>,
    #[serde(with = "reference_kind_serde")]
    pub kind: ReferenceKind,
}

/// Everything the compiler knows about one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Object {
    pub file: PathBuf,
    pub symbol_table: SymbolTable,
    pub dependencies: Vec<Dependency>,
    pub references: Vec<Reference>,
    pub errors: IndexMap<Range, Vec<Diagnostic>>,
    pub creation_time: SystemTime,
}

impl Object {
    pub fn new(file: PathBuf) -> Self {
        let root_location = Location::new(file.clone(), Range::default());
        Self {
            file,
            symbol_table: SymbolTable::new(root_location),
            dependencies: Vec::new(),
            references: Vec::new(),
            errors: IndexMap::new(),
            creation_time: SystemTime::now(),
        }
    }

    pub fn add_error(&mut self, range: Range, diagnostic: Diagnostic) {
        self.errors.entry(range).or_default().push(diagnostic);
    }

    /// Registers a dependency. Importing the same module again into the same
    /// scope (or a scope below the first import) is redundant; the duplicate
    /// is dropped with a warning.
    pub fn add_dependency(&mut self, dependency: Dependency) {
        for existing in &self.dependencies {
            if existing.module_name == dependency.module_name
                && (existing.scope == dependency.scope
                    || self.symbol_table.is_parent_of(existing.scope, dependency.scope))
            {
                let previous = Location::new(self.file.clone(), existing.range);
                self.add_error(
                    dependency.range,
                    Diagnostic::redundant_import(&dependency.module_name, previous),
                );
                return;
            }
        }
        self.dependencies.push(dependency);
    }

    pub fn add_reference(&mut self, reference: Reference) {
        self.references.push(reference);
    }

    /// True if any recorded diagnostic has error severity.
    pub fn has_errors(&self) -> bool {
        self.errors
            .values()
            .flatten()
            .any(|diagnostic| diagnostic.severity() == crate::diagnostics::Severity::Error)
    }

    /// Qualified names similar to `name` among symbols addressable as
    /// `kind`, best match first, at most three.
    pub fn find_similar_symbols(&self, name: &[String], kind: ReferenceKind) -> Vec<String> {
        let wanted = name.join("?");
        let mut scored: Vec<(f64, String)> = Vec::new();
        self.symbol_table.traverse(SymbolIndex::ROOT, &mut |index, data| {
            if !kind.intersects(data.reference_kind()) {
                return;
            }
            let candidate = self.symbol_table.qualified(index).join("?");
            let score = strsim::jaro_winkler(&wanted, &candidate);
            if score > 0.6 {
                scored.push((score, candidate));
            }
        });
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.dedup_by(|a, b| a.1 == b.1);
        scored.into_iter().take(3).map(|(_, name)| name).collect()
    }
}

/// Lexically normalises a path: absolutisation against the working
/// directory plus `.`/`..` folding. Deliberately not `fs::canonicalize`,
/// because import targets may not exist yet.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map(|cwd| cwd.join(path)).unwrap_or_else(|_| path.to_path_buf())
    };
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            component => normalized.push(component.as_os_str()),
        }
    }
    normalized
}

/// The nearest ancestor directory of `file` named `source`.
pub fn find_source_dir(file: &Path) -> Option<PathBuf> {
    file.ancestors()
        .skip(1)
        .find(|dir| dir.file_name().and_then(|name| name.to_str()) == Some("source"))
        .map(Path::to_path_buf)
}

/// The repository a file belongs to: the first two path components below the
/// workspace root, e.g. `smglom/arithmetics`.
pub fn repository_name(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .take(2)
        .collect();
    if parts.len() == 2 {
        Some(parts.join("/"))
    } else {
        None
    }
}

fn posix(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// The `path=` key that would point an import at `file`: its path below the
/// enclosing `source` directory, without the `.tex` extension.
fn current_path_key(file: &Path) -> Option<String> {
    let source = find_source_dir(file)?;
    let relative = file.strip_prefix(&source).ok()?.with_extension("");
    Some(posix(&relative))
}

/// The `dir=` key that would point an import at the directory of `file`.
fn current_dir_key(file: &Path) -> Option<String> {
    let source = find_source_dir(file)?;
    let relative = file.parent()?.strip_prefix(&source).ok()?;
    Some(posix(relative))
}

/// Resolves the file an `importmodule`-style import points at.
///
/// With `load`, the target is `<root>/<load>/<module>.tex`. Without any
/// location key the current file itself is the hint. Otherwise the `source`
/// directory is determined (from `mhrepo` or by walking up from the current
/// file) and `dir`/`path` select the file below it. Pure in its inputs.
#[allow(clippy::too_many_arguments)]
pub fn resolve_import_hint(
    root: &Path,
    current_file: &Path,
    mhrepo: Option<&str>,
    path: Option<&str>,
    dir: Option<&str>,
    load: Option<&str>,
    module: &str,
) -> Result<PathBuf, String> {
    if let Some(load) = load {
        return Ok(normalize_path(&root.join(load).join(format!("{module}.tex"))));
    }
    if mhrepo.is_none() && path.is_none() && dir.is_none() {
        return Ok(normalize_path(current_file));
    }
    let source = match mhrepo {
        Some(mhrepo) => root.join(mhrepo).join("source"),
        None => find_source_dir(current_file).ok_or_else(|| {
            format!("no \"source\" directory above \"{}\"", current_file.display())
        })?,
    };
    if let Some(dir) = dir {
        Ok(normalize_path(&source.join(dir).join(format!("{module}.tex"))))
    } else if let Some(path) = path {
        Ok(normalize_path(&source.join(format!("{path}.tex"))))
    } else {
        Err("\"path\" or \"dir\" must be specified if \"mhrepo\" is".into())
    }
}

/// Resolves the file a `gimport` points at: `<repo>/source/<module>.tex`,
/// with the repository defaulting to the one the current file lives in.
pub fn resolve_gimport_hint(
    root: &Path,
    current_file: &Path,
    repository: Option<&str>,
    module: &str,
) -> Result<PathBuf, String> {
    let source = match repository {
        Some(repository) => root.join(repository).join("source"),
        None => find_source_dir(current_file).ok_or_else(|| {
            format!("no \"source\" directory above \"{}\"", current_file.display())
        })?,
    };
    Ok(normalize_path(&source.join(format!("{module}.tex"))))
}

/// Compiles single files into [`Object`]s and manages the objectfile cache.
pub struct Compiler {
    root_dir: PathBuf,
    outdir: PathBuf,
}

impl Compiler {
    pub fn new(root_dir: &Path, outdir: &Path) -> Self {
        Self {
            root_dir: normalize_path(root_dir),
            outdir: normalize_path(outdir),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Where the objectfile for `file` lives:
    /// `<outdir>/<sha1-hex(parent dir)>/<file name>.stexobj`.
    pub fn objectfile_path(&self, file: &Path) -> PathBuf {
        let file = normalize_path(file);
        let parent = file.parent().map(posix).unwrap_or_default();
        let mut hasher = Sha1::new();
        hasher.update(format!("/{parent}").as_bytes());
        let digest = hasher.finalize();
        let mut sha = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(sha, "{byte:02x}");
        }
        let name = file
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unnamed");
        self.outdir.join(sha).join(format!("{name}.stexobj"))
    }

    /// Loads the cached objectfile for `file`, rejecting unknown formats.
    pub fn load_from_objectfile(&self, file: &Path) -> Result<Object, ObjectError> {
        let objectfile = self.objectfile_path(file);
        let bytes = match fs::read(&objectfile) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(ObjectError::NotFound(file.to_path_buf()))
            }
            Err(error) => return Err(ObjectError::Io(error)),
        };
        let header_len = OBJECTFILE_MAGIC.len() + 4;
        if bytes.len() < header_len || &bytes[..OBJECTFILE_MAGIC.len()] != OBJECTFILE_MAGIC {
            return Err(ObjectError::Corrupt(file.to_path_buf()));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[OBJECTFILE_MAGIC.len()..header_len]);
        if u32::from_le_bytes(version) != OBJECTFILE_VERSION {
            return Err(ObjectError::Corrupt(file.to_path_buf()));
        }
        bincode::deserialize(&bytes[header_len..])
            .map_err(|_| ObjectError::Corrupt(file.to_path_buf()))
    }

    /// Writes the objectfile atomically: serialise to a sibling temp file,
    /// then rename over the target so readers never observe a torn write.
    fn store_objectfile(&self, object: &Object) -> Result<(), ObjectError> {
        let objectfile = self.objectfile_path(&object.file);
        if let Some(parent) = objectfile.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = bincode::serialize(object).map_err(io::Error::other)?;
        let mut bytes = Vec::with_capacity(OBJECTFILE_MAGIC.len() + 4 + payload.len());
        bytes.extend_from_slice(OBJECTFILE_MAGIC);
        bytes.extend_from_slice(&OBJECTFILE_VERSION.to_le_bytes());
        bytes.extend_from_slice(&payload);
        let temp = objectfile.with_extension("stexobj.tmp");
        fs::write(&temp, &bytes)?;
        fs::rename(&temp, &objectfile)?;
        Ok(())
    }

    /// True when the objectfile is missing or older than the source file,
    /// or older than an externally reported modification time.
    pub fn recompilation_required(&self, file: &Path, time_modified: Option<SystemTime>) -> bool {
        let objectfile = self.objectfile_path(file);
        let object_mtime = match fs::metadata(&objectfile).and_then(|meta| meta.modified()) {
            Ok(mtime) => mtime,
            Err(_) => return true,
        };
        if let Some(time_modified) = time_modified {
            if object_mtime < time_modified {
                return true;
            }
        }
        match fs::metadata(file).and_then(|meta| meta.modified()) {
            Ok(file_mtime) => object_mtime < file_mtime,
            Err(_) => true,
        }
    }

    /// Compiles one file. `content` overrides the on-disk text (live editor
    /// buffers); `dryrun` skips objectfile persistence. Persistence faults
    /// are logged and otherwise ignored.
    pub fn compile(&self, file: &Path, content: Option<&str>, dryrun: bool) -> Result<Object, CompileError> {
        let file = normalize_path(file);
        if content.is_none() && !file.is_file() {
            return Err(CompileError::FileNotFound(file));
        }
        let parser = LatexParser::parse(&file, content)?;
        let mut object = Object::new(file.clone());
        for (location, message) in &parser.syntax_errors {
            object.add_error(location.range, Diagnostic::syntax_error(message));
        }
        let tree = IntermediateTree::build(&parser);
        for (location, diagnostic) in &tree.errors {
            object.add_error(location.range, diagnostic.clone());
        }
        let mut stack: Vec<(NodeIndex, SymbolIndex)> = Vec::new();
        for root in tree.roots.clone() {
            self.visit(&mut object, &tree, root, &mut stack);
        }
        if !dryrun {
            if let Err(error) = self.store_objectfile(&object) {
                log::error!(
                    "failed to write objectfile for \"{}\": {error}",
                    object.file.display()
                );
            }
        }
        Ok(object)
    }

    fn visit(
        &self,
        object: &mut Object,
        tree: &IntermediateTree,
        node: NodeIndex,
        stack: &mut Vec<(NodeIndex, SymbolIndex)>,
    ) {
        let context = stack.last().map(|(_, context)| *context).unwrap_or(SymbolIndex::ROOT);
        if let Some(new_context) = self.compile_node(object, tree, node, context) {
            stack.push((node, new_context));
        }
        for child in tree.get(node).children.clone() {
            self.visit(object, tree, child, stack);
        }
        if stack.last().map(|(opening, _)| *opening) == Some(node) {
            stack.pop();
        }
    }

    /// Applies the per-node compile rule. A returned symbol becomes the
    /// context for the node's children.
    fn compile_node(
        &self,
        object: &mut Object,
        tree: &IntermediateTree,
        node: NodeIndex,
        context: SymbolIndex,
    ) -> Option<SymbolIndex> {
        let location = tree.get(node).location.clone();
        match &tree.get(node).kind {
            IntermediateKind::Scope(scope) => self.compile_scope(object, context, &location, scope),
            IntermediateKind::ModSig(modsig) => self.compile_modsig(object, context, &location, modsig),
            IntermediateKind::ModNl(modnl) => self.compile_modnl(object, context, &location, modnl),
            IntermediateKind::Module(module) => self.compile_module(object, context, &location, module),
            IntermediateKind::Trefi(trefi) => {
                self.compile_trefi(object, context, tree, node, &location, trefi);
                None
            }
            IntermediateKind::Defi(defi) => {
                self.compile_defi(object, context, tree, node, &location, defi);
                None
            }
            IntermediateKind::Symi(symi) => {
                self.compile_symi(object, context, &location, symi);
                None
            }
            IntermediateKind::Symdef(symdef) => {
                self.compile_symdef(object, context, &location, symdef);
                None
            }
            IntermediateKind::ImportModule(import) => {
                self.compile_importmodule(object, context, tree, node, &location, import);
                None
            }
            IntermediateKind::GImport(gimport) => {
                self.compile_gimport(object, context, tree, node, &location, gimport);
                None
            }
            IntermediateKind::GStructure(_) => None,
            IntermediateKind::View(view) => {
                self.compile_view(object, context, &location, view);
                None
            }
            IntermediateKind::ViewSig(viewsig) => {
                self.compile_viewsig(object, context, &location, viewsig);
                None
            }
            IntermediateKind::Tassign(tassign) => {
                self.compile_tassign(object, context, tree, node, &location, tassign);
                None
            }
        }
    }

    fn require_root(&self, object: &mut Object, context: SymbolIndex, location: &Location, env: &str) {
        if !matches!(object.symbol_table.get(context).kind, SymbolKind::Root) {
            object.add_error(
                location.range,
                Diagnostic::misplaced_environment(env, "parent is not the file root"),
            );
        }
    }

    fn compile_scope(
        &self,
        object: &mut Object,
        context: SymbolIndex,
        location: &Location,
        scope: &ScopeTree,
    ) -> Option<SymbolIndex> {
        let name = object.symbol_table.fresh_scope_name(scope.scope_name.text.trim());
        match object.symbol_table.add_child(
            context,
            Symbol {
                name,
                location: location.clone(),
                kind: SymbolKind::Scope,
                access_modifier: AccessModifier::Public,
            },
            false,
        ) {
            Ok(symbol) => Some(symbol),
            Err(error) => {
                object.add_error(location.range, error.into());
                None
            }
        }
    }

    fn compile_modsig(
        &self,
        object: &mut Object,
        context: SymbolIndex,
        location: &Location,
        modsig: &ModSigTree,
    ) -> Option<SymbolIndex> {
        self.require_root(object, context, location, "modsig");
        let name = modsig.name.text.trim().to_string();
        let expected = format!("{name}.tex");
        if object.file.file_name().and_then(|n| n.to_str()) != Some(expected.as_str()) {
            object.add_error(modsig.name.range, Diagnostic::filename_mismatch(&expected));
        }
        let name_location = location.with_range(modsig.name.range);
        match object
            .symbol_table
            .add_module(context, ModuleType::Modsig, name_location, Some(name.clone()))
        {
            Ok(module) => Some(module),
            Err(error) => {
                log::error!("{location}: failed to compile modsig {name}: {error}");
                None
            }
        }
    }

    fn compile_modnl(
        &self,
        object: &mut Object,
        context: SymbolIndex,
        location: &Location,
        modnl: &ModNlTree,
    ) -> Option<SymbolIndex> {
        self.require_root(object, context, location, "modnl");
        let name = modnl.name.text.trim().to_string();
        let expected = format!("{name}.{}.tex", modnl.lang.text.trim());
        if object.file.file_name().and_then(|n| n.to_str()) != Some(expected.as_str()) {
            object.add_error(location.range, Diagnostic::filename_mismatch(&expected));
        }
        let binding = match object.symbol_table.add_child(
            context,
            Symbol {
                name: name.clone(),
                location: location.clone(),
                kind: SymbolKind::Binding { lang: modnl.lang.text.trim().to_string() },
                access_modifier: AccessModifier::Public,
            },
            false,
        ) {
            Ok(binding) => binding,
            Err(error) => {
                log::error!("{location}: failed to compile language binding of {name}: {error}");
                return None;
            }
        };
        // The context must become the binding here, otherwise the dependency
        // and the reference below would resolve against the file root.
        object.add_dependency(Dependency {
            range: modnl.name.range,
            scope: binding,
            module_name: name.clone(),
            module_type_hint: ModuleType::Modsig,
            file_hint: normalize_path(&modnl.module_path),
            export: true,
        });
        object.add_reference(Reference {
            range: modnl.name.range,
            scope: binding,
            name: vec![name],
            kind: ReferenceKind::MODSIG,
        });
        Some(binding)
    }

    fn compile_module(
        &self,
        object: &mut Object,
        context: SymbolIndex,
        location: &Location,
        module: &ModuleTree,
    ) -> Option<SymbolIndex> {
        self.require_root(object, context, location, "module");
        let (name, name_location) = match &module.id {
            Some(id) => (Some(id.text.trim().to_string()), location.with_range(id.range)),
            None => (None, location.clone()),
        };
        match object
            .symbol_table
            .add_module(context, ModuleType::Module, name_location, name.clone())
        {
            Ok(symbol) => Some(symbol),
            Err(error) => {
                log::error!(
                    "{location}: failed to compile module {}: {error}",
                    name.unwrap_or_default()
                );
                None
            }
        }
    }

    fn compile_trefi(
        &self,
        object: &mut Object,
        context: SymbolIndex,
        tree: &IntermediateTree,
        node: NodeIndex,
        location: &Location,
        trefi: &TrefiTree,
    ) {
        let name = trefi.name();
        if trefi.drefi {
            match object.symbol_table.get_current_module(context) {
                None => object.add_error(
                    location.range,
                    Diagnostic::misplaced_environment("drefi", "parent module symbol not found"),
                ),
                Some(module) => {
                    let access_modifier = object.symbol_table.get_visible_access_modifier(context);
                    let symbol = Symbol {
                        name: name.clone(),
                        location: location.clone(),
                        kind: SymbolKind::Def {
                            def_type: DefType::Dref,
                            noverb: false,
                            noverbs: Default::default(),
                        },
                        access_modifier,
                    };
                    if let Err(error) = object.symbol_table.add_child(module, symbol, true) {
                        object.add_error(location.range, error.into());
                    }
                }
            }
        }
        match trefi.module() {
            Some(module) => {
                object.add_reference(Reference {
                    range: module.range,
                    scope: context,
                    name: vec![module.text.trim().to_string()],
                    kind: ReferenceKind::MODSIG | ReferenceKind::MODULE,
                });
                object.add_reference(Reference {
                    range: location.range,
                    scope: context,
                    name: vec![module.text.trim().to_string(), name.clone()],
                    kind: ReferenceKind::ANY_DEFINITION,
                });
            }
            None => match tree.find_parent_module_name(node) {
                Some(module_name) => object.add_reference(Reference {
                    range: location.range,
                    scope: context,
                    name: vec![module_name, name.clone()],
                    kind: ReferenceKind::ANY_DEFINITION,
                }),
                None => object.add_error(
                    location.range,
                    Diagnostic::missing_parent_module("trefi", &name),
                ),
            },
        }
        if trefi.m {
            object.add_error(location.range, Diagnostic::deprecated("mtref environments are deprecated"));
            let has_target = trefi
                .target_annotation
                .as_ref()
                .is_some_and(|annotation| annotation.text.contains('?'));
            if !has_target {
                object.add_error(
                    location.range,
                    Diagnostic::invalid_environment(
                        "invalid \"mtref\" environment: target symbol must be clarified by using \"?<symbol>\" syntax",
                    ),
                );
            }
        }
    }

    fn compile_defi(
        &self,
        object: &mut Object,
        context: SymbolIndex,
        tree: &IntermediateTree,
        node: NodeIndex,
        location: &Location,
        defi: &DefiTree,
    ) {
        let name = defi.name();
        if let Some(module) = object.symbol_table.get_current_module(context) {
            let access_modifier = object.symbol_table.get_visible_access_modifier(context);
            let symbol = Symbol {
                name,
                location: location.clone(),
                kind: SymbolKind::Def {
                    def_type: DefType::Def,
                    noverb: false,
                    noverbs: Default::default(),
                },
                access_modifier,
            };
            if let Err(error) = object.symbol_table.add_child(module, symbol, false) {
                object.add_error(location.range, error.into());
            }
            return;
        }
        match tree.find_parent_module_name(node) {
            None => object.add_error(
                location.range,
                Diagnostic::missing_parent_module("defi", &name),
            ),
            Some(module_name) => object.add_reference(Reference {
                range: location.range,
                scope: context,
                name: vec![module_name, name],
                kind: ReferenceKind::ANY_DEFINITION,
            }),
        }
    }

    fn compile_symi(
        &self,
        object: &mut Object,
        context: SymbolIndex,
        location: &Location,
        symi: &SymiTree,
    ) {
        let name = symi.name();
        let module = match object.symbol_table.get_current_module(context) {
            Some(module) => module,
            None => {
                object.add_error(
                    location.range,
                    Diagnostic::missing_parent_module("symi", &name),
                );
                return;
            }
        };
        let access_modifier = object.symbol_table.get_visible_access_modifier(context);
        let symbol = Symbol {
            name,
            location: location.clone(),
            kind: SymbolKind::Def {
                def_type: DefType::Sym,
                noverb: symi.noverb.all,
                noverbs: symi.noverb.langs.clone(),
            },
            access_modifier,
        };
        if let Err(error) = object.symbol_table.add_child(module, symbol, false) {
            object.add_error(location.range, error.into());
        }
    }

    fn compile_symdef(
        &self,
        object: &mut Object,
        context: SymbolIndex,
        location: &Location,
        symdef: &SymdefTree,
    ) {
        let name = symdef.name.text.trim().to_string();
        let module = match object.symbol_table.get_current_module(context) {
            Some(module) => module,
            None => {
                object.add_error(
                    location.range,
                    Diagnostic::missing_parent_module("symdef", &name),
                );
                return;
            }
        };
        let access_modifier = object.symbol_table.get_visible_access_modifier(context);
        let symbol = Symbol {
            name,
            location: location.clone(),
            kind: SymbolKind::Def {
                def_type: DefType::Symdef,
                noverb: symdef.noverb.all,
                noverbs: symdef.noverb.langs.clone(),
            },
            access_modifier,
        };
        if let Err(error) = object.symbol_table.add_child(module, symbol, true) {
            object.add_error(location.range, error.into());
        }
    }

    fn compile_importmodule(
        &self,
        object: &mut Object,
        context: SymbolIndex,
        tree: &IntermediateTree,
        node: NodeIndex,
        location: &Location,
        import: &ImportModuleTree,
    ) {
        if !matches!(tree.find_parent_module_node(node), Some(IntermediateKind::Module(_))) {
            object.add_error(
                location.range,
                Diagnostic::misplaced_environment("importmodule", "module environment not found"),
            );
        }
        let module_name = import.module.text.trim().to_string();
        let file_hint = match resolve_import_hint(
            &self.root_dir,
            &object.file,
            import.mhrepos.as_ref().map(|t| t.text.trim()),
            import.path.as_ref().map(|t| t.text.trim()),
            import.dir.as_ref().map(|t| t.text.trim()),
            import.load.as_ref().map(|t| t.text.trim()),
            &module_name,
        ) {
            Ok(file_hint) => file_hint,
            Err(message) => {
                object.add_error(location.range, Diagnostic::invalid_environment(message));
                return;
            }
        };
        object.add_dependency(Dependency {
            range: location.range,
            scope: context,
            module_name: module_name.clone(),
            module_type_hint: ModuleType::Module,
            file_hint,
            export: import.export,
        });
        object.add_reference(Reference {
            range: location.range,
            scope: context,
            name: vec![module_name],
            kind: ReferenceKind::MODULE,
        });
        if let Some(repos) = &import.repos {
            object.add_error(
                repos.range,
                Diagnostic::deprecated("argument \"repos\" is deprecated and should be replaced with \"mhrepos\""),
            );
        }
        if let Some(mhrepos) = &import.mhrepos {
            if Some(mhrepos.text.trim()) == repository_name(&self.root_dir, &object.file).as_deref() {
                object.add_error(
                    mhrepos.range,
                    Diagnostic::redundant_import_key("mhrepos", mhrepos.text.trim()),
                );
            }
        }
        if let Some(path) = &import.path {
            if Some(path.text.trim()) == current_path_key(&object.file).as_deref() {
                object.add_error(path.range, Diagnostic::redundant_import_key("path", path.text.trim()));
            }
        }
        if let Some(dir) = &import.dir {
            if Some(dir.text.trim()) == current_dir_key(&object.file).as_deref() {
                object.add_error(location.range, Diagnostic::redundant_import_key("dir", dir.text.trim()));
            }
        }
    }

    fn compile_gimport(
        &self,
        object: &mut Object,
        context: SymbolIndex,
        tree: &IntermediateTree,
        node: NodeIndex,
        location: &Location,
        gimport: &GImportTree,
    ) {
        if !matches!(
            tree.find_parent_module_node(node),
            Some(IntermediateKind::Module(_) | IntermediateKind::ModSig(_))
        ) {
            object.add_error(
                location.range,
                Diagnostic::misplaced_environment("gimport", "module or modsig environment not found"),
            );
        }
        let module_name = gimport.module.text.trim().to_string();
        let file_hint = match resolve_gimport_hint(
            &self.root_dir,
            &object.file,
            gimport.repository.as_ref().map(|t| t.text.trim()),
            &module_name,
        ) {
            Ok(file_hint) => file_hint,
            Err(message) => {
                object.add_error(location.range, Diagnostic::invalid_environment(message));
                return;
            }
        };
        object.add_dependency(Dependency {
            range: location.range,
            scope: context,
            module_name: module_name.clone(),
            module_type_hint: ModuleType::Modsig,
            file_hint,
            export: true,
        });
        object.add_reference(Reference {
            range: location.range,
            scope: context,
            name: vec![module_name],
            kind: ReferenceKind::MODSIG,
        });
        if let Some(repository) = &gimport.repository {
            if Some(repository.text.trim()) == repository_name(&self.root_dir, &object.file).as_deref() {
                object.add_error(
                    repository.range,
                    Diagnostic::redundant_import_key("repository", repository.text.trim()),
                );
            }
        }
    }

    fn compile_view(
        &self,
        object: &mut Object,
        context: SymbolIndex,
        location: &Location,
        view: &ViewTree,
    ) {
        self.require_root(object, context, location, "view");
        if view.env == ViewEnv::Gviewnl {
            if let Some(lang) = &view.lang {
                let expected = format!("{}.{}", view.module.text.trim(), lang.text.trim());
                if object.file.file_stem().and_then(|stem| stem.to_str()) != Some(expected.as_str()) {
                    object.add_error(
                        view.module.range,
                        Diagnostic::filename_mismatch(format!("{expected}.tex")),
                    );
                }
            }
        }
        let sides: [(Option<&Token>, Option<&Token>, Option<&Token>); 2] = [
            (view.source_module(), view.fromrepos.as_ref(), view.frompath.as_ref()),
            (view.target_module(), view.torepos.as_ref(), view.topath.as_ref()),
        ];
        for (module, repository, path) in sides {
            let module = match module {
                Some(module) => module,
                None => continue,
            };
            let module_name = module.text.trim().to_string();
            let resolved = match view.env {
                ViewEnv::Gviewnl => resolve_gimport_hint(
                    &self.root_dir,
                    &object.file,
                    repository.map(|t| t.text.trim()),
                    &module_name,
                ),
                ViewEnv::Mhview => resolve_import_hint(
                    &self.root_dir,
                    &object.file,
                    repository.map(|t| t.text.trim()),
                    path.map(|t| t.text.trim()),
                    None,
                    None,
                    &module_name,
                ),
            };
            let file_hint = match resolved {
                Ok(file_hint) => file_hint,
                Err(message) => {
                    object.add_error(module.range, Diagnostic::invalid_environment(message));
                    continue;
                }
            };
            object.add_dependency(Dependency {
                range: module.range,
                scope: context,
                module_name: module_name.clone(),
                module_type_hint: ModuleType::Modsig,
                file_hint,
                export: true,
            });
            object.add_reference(Reference {
                range: module.range,
                scope: context,
                name: vec![module_name],
                kind: ReferenceKind::MODSIG | ReferenceKind::MODULE,
            });
        }
    }

    fn compile_viewsig(
        &self,
        object: &mut Object,
        context: SymbolIndex,
        location: &Location,
        viewsig: &ViewSigTree,
    ) {
        self.require_root(object, context, location, "viewsig");
        let expected = viewsig.module_name.text.trim();
        if object.file.file_stem().and_then(|stem| stem.to_str()) != Some(expected) {
            object.add_error(
                viewsig.module_name.range,
                Diagnostic::filename_mismatch(format!("{expected}.tex")),
            );
        }
        let sides: [(Option<&Token>, Option<&Token>); 2] = [
            (viewsig.source_module(), viewsig.fromrepos.as_ref()),
            (viewsig.target_module(), viewsig.torepos.as_ref()),
        ];
        for (module, repository) in sides {
            let module = match module {
                Some(module) => module,
                None => continue,
            };
            let module_name = module.text.trim().to_string();
            let file_hint = match resolve_gimport_hint(
                &self.root_dir,
                &object.file,
                repository.map(|t| t.text.trim()),
                &module_name,
            ) {
                Ok(file_hint) => file_hint,
                Err(message) => {
                    object.add_error(module.range, Diagnostic::invalid_environment(message));
                    continue;
                }
            };
            object.add_dependency(Dependency {
                range: module.range,
                scope: context,
                module_name: module_name.clone(),
                module_type_hint: ModuleType::Modsig,
                file_hint,
                export: true,
            });
            object.add_reference(Reference {
                range: module.range,
                scope: context,
                name: vec![module_name],
                kind: ReferenceKind::MODSIG | ReferenceKind::MODULE,
            });
        }
    }

    fn compile_tassign(
        &self,
        object: &mut Object,
        context: SymbolIndex,
        tree: &IntermediateTree,
        node: NodeIndex,
        location: &Location,
        tassign: &TassignTree,
    ) {
        let parent = tree.get(node).parent.map(|parent| &tree.get(parent).kind);
        let viewsig = match parent {
            Some(IntermediateKind::ViewSig(viewsig)) => viewsig,
            _ => {
                object.add_error(
                    location.range,
                    Diagnostic::misplaced_environment("tassign", "only allowed inside a gviewsig"),
                );
                return;
            }
        };
        if let Some(source_module) = viewsig.source_module() {
            object.add_reference(Reference {
                range: tassign.source_symbol.range,
                scope: context,
                name: vec![
                    source_module.text.trim().to_string(),
                    tassign.source_symbol.text.trim().to_string(),
                ],
                kind: ReferenceKind::DEF,
            });
        }
        if tassign.value_assignment {
            if let Some(target_module) = viewsig.target_module() {
                object.add_reference(Reference {
                    range: tassign.target_term.range,
                    scope: context,
                    name: vec![
                        target_module.text.trim().to_string(),
                        tassign.target_term.text.trim().to_string(),
                    ],
                    kind: ReferenceKind::DEF,
                });
            }
        }
    }
}
