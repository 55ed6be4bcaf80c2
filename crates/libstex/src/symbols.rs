//! Hierarchical symbol tables for compiled files.
//!
//! Every compiled file owns one [`SymbolTable`]: an arena of symbols indexed
//! by [`SymbolIndex`], rooted at a synthetic [`SymbolKind::Root`] node.
//! Symbols point upward through a parent index and downward through an
//! ordered name-keyed multimap, so the same name can legitimately hold
//! several *alternative* definitions (repeated `symdef`s with agreeing
//! signatures) while plain duplicates are rejected.
//!
//! Two search operations are deliberately kept apart:
//!
//! - [`SymbolTable::find`] only descends into children;
//! - [`SymbolTable::lookup`] first resolves among the children, then climbs
//!   towards the root. Module and binding symbols terminate the climb so
//!   that a module can never accidentally address a sibling through its
//!   enclosing scope, with a final self-name fallback that lets a module
//!   reference its own symbols by qualified name.
//!
//! Linking copies symbols between tables with [`SymbolTable::import_from`],
//! which honours access modifiers and swallows collisions into a list the
//! caller turns into diagnostics.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::location::Location;

bitflags::bitflags! {
    /// The kinds of symbol a reference is allowed to resolve to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ReferenceKind: u8 {
        const MODSIG = 1;
        const MODULE = 1 << 1;
        const DEF = 1 << 2;
        const DREF = 1 << 3;
        const SYM = 1 << 4;
        const SYMDEF = 1 << 5;
        const BINDING = 1 << 6;
        const ANY_DEFINITION = Self::DEF.bits() | Self::DREF.bits() | Self::SYM.bits() | Self::SYMDEF.bits();
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == ReferenceKind::ANY_DEFINITION {
            return f.write_str("definition");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(&name.to_lowercase())?;
            first = false;
        }
        if first {
            f.write_str("undefined")?;
        }
        Ok(())
    }
}

/// Serialises [`ReferenceKind`] as its raw bits inside objectfiles.
pub mod reference_kind_serde {
    use super::ReferenceKind;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(kind: &ReferenceKind, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(kind.bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ReferenceKind, D::Error> {
        Ok(ReferenceKind::from_bits_truncate(u8::deserialize(deserializer)?))
    }
}

/// Which environment flavour declared a module symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum ModuleType {
    /// `modsig`: language-independent signature
    Modsig,
    /// `module`: self-contained module body
    Module,
}

/// Which environment flavour declared a definition symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum DefType {
    Def,
    Dref,
    Sym,
    Symdef,
}

/// Visibility lattice. `Private` is the strongest and blocks visibility from
/// outside no matter where it occurs on the ancestor chain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessModifier {
    #[default]
    Public,
    Protected,
    Private,
}

/// The payload stored for every symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SymbolKind {
    /// Synthetic table root, one per file
    Root,
    Module {
        module_type: ModuleType,
    },
    /// Language binding of a module signature
    Binding {
        lang: String,
    },
    Def {
        def_type: DefType,
        /// Symbol should never be referenced in running text
        noverb: bool,
        /// Languages the symbol must not be referenced from
        noverbs: BTreeSet<String>,
    },
    /// Lexical grouping such as `omtext` or `frame`
    Scope,
}

impl SymbolKind {
    /// The reference kind that may address a symbol of this kind.
    pub fn reference_kind(&self) -> ReferenceKind {
        match self {
            SymbolKind::Root | SymbolKind::Scope => ReferenceKind::empty(),
            SymbolKind::Module { module_type: ModuleType::Modsig } => ReferenceKind::MODSIG,
            SymbolKind::Module { module_type: ModuleType::Module } => ReferenceKind::MODULE,
            SymbolKind::Binding { .. } => ReferenceKind::BINDING,
            SymbolKind::Def { def_type: DefType::Def, .. } => ReferenceKind::DEF,
            SymbolKind::Def { def_type: DefType::Dref, .. } => ReferenceKind::DREF,
            SymbolKind::Def { def_type: DefType::Sym, .. } => ReferenceKind::SYM,
            SymbolKind::Def { def_type: DefType::Symdef, .. } => ReferenceKind::SYMDEF,
        }
    }
}

/// Insertion payload for [`SymbolTable::add_child`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub location: Location,
    pub kind: SymbolKind,
    pub access_modifier: AccessModifier,
}

/// A symbol stored in the arena, with its tree links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolData {
    pub name: String,
    pub location: Location,
    pub kind: SymbolKind,
    pub access_modifier: AccessModifier,
    pub parent: Option<SymbolIndex>,
    children: IndexMap<String, Vec<SymbolIndex>>,
}

impl SymbolData {
    pub fn reference_kind(&self) -> ReferenceKind {
        self.kind.reference_kind()
    }

    /// Detaches the payload for insertion into another table.
    pub fn to_symbol(&self) -> Symbol {
        Symbol {
            name: self.name.clone(),
            location: self.location.clone(),
            kind: self.kind.clone(),
            access_modifier: self.access_modifier,
        }
    }

    pub fn children(&self) -> &IndexMap<String, Vec<SymbolIndex>> {
        &self.children
    }
}

/// Stable index of a symbol inside its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolIndex(pub usize);

impl SymbolIndex {
    /// The synthetic root is always the first arena entry.
    pub const ROOT: SymbolIndex = SymbolIndex(0);
}

/// Raised by [`SymbolTable::add_child`] when the table invariants would be
/// violated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SymbolError {
    #[error("duplicate symbol '{name}': already defined at {previous}")]
    Duplicate { name: String, previous: Location },

    #[error("invalid redefinition of '{name}': {reason} (previous definition at {previous})")]
    InvalidRedefinition {
        name: String,
        previous: Location,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: Vec<SymbolData>,
    anonymous_modules: usize,
    scopes: usize,
}

impl SymbolTable {
    /// Creates a table containing only the root symbol.
    pub fn new(root_location: Location) -> Self {
        Self {
            symbols: vec![SymbolData {
                name: String::new(),
                location: root_location,
                kind: SymbolKind::Root,
                access_modifier: AccessModifier::Public,
                parent: None,
                children: IndexMap::new(),
            }],
            anonymous_modules: 0,
            scopes: 0,
        }
    }

    pub fn get(&self, index: SymbolIndex) -> &SymbolData {
        &self.symbols[index.0]
    }

    pub fn get_mut(&mut self, index: SymbolIndex) -> &mut SymbolData {
        &mut self.symbols[index.0]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Iterates over every symbol including the root, in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolIndex, &SymbolData)> {
        self.symbols.iter().enumerate().map(|(index, data)| (SymbolIndex(index), data))
    }

    /// Generates a table-unique name for an anonymous module.
    pub fn fresh_module_name(&mut self) -> String {
        self.anonymous_modules += 1;
        format!("__MODULE#{}__", self.anonymous_modules)
    }

    /// Generates a table-unique name for a lexical scope.
    pub fn fresh_scope_name(&mut self, base: &str) -> String {
        self.scopes += 1;
        format!("__{base}#{}__", self.scopes)
    }

    /// Adds `symbol` under `parent`, enforcing the duplicate and
    /// alternative-definition invariants. With `alternative`, a repeated name
    /// of the same reference kind is accepted as long as its signature
    /// (definition type and noverb annotations) matches all previous entries.
    pub fn add_child(
        &mut self,
        parent: SymbolIndex,
        symbol: Symbol,
        alternative: bool,
    ) -> Result<SymbolIndex, SymbolError> {
        if let Some(existing) = self.symbols[parent.0].children.get(&symbol.name) {
            for prev in existing {
                let prev_data = &self.symbols[prev.0];
                // Symbols of a different reference kind share the name freely
                if prev_data.reference_kind() != symbol.kind.reference_kind() {
                    continue;
                }
                if !alternative {
                    return Err(SymbolError::Duplicate {
                        name: symbol.name,
                        previous: prev_data.location.clone(),
                    });
                }
                match (&prev_data.kind, &symbol.kind) {
                    (
                        SymbolKind::Def { def_type: prev_type, noverb: prev_noverb, noverbs: prev_noverbs },
                        SymbolKind::Def { def_type, noverb, noverbs },
                    ) => {
                        if prev_type != def_type {
                            return Err(SymbolError::InvalidRedefinition {
                                name: symbol.name,
                                previous: prev_data.location.clone(),
                                reason: format!("definition types do not match: {def_type} vs. {prev_type}"),
                            });
                        }
                        if prev_noverb != noverb {
                            return Err(SymbolError::InvalidRedefinition {
                                name: symbol.name,
                                previous: prev_data.location.clone(),
                                reason: "noverb signatures do not match the previous definition".into(),
                            });
                        }
                        if prev_noverbs != noverbs {
                            return Err(SymbolError::InvalidRedefinition {
                                name: symbol.name,
                                previous: prev_data.location.clone(),
                                reason: "noverb languages do not match the previous definition".into(),
                            });
                        }
                    }
                    (prev_kind, kind) if std::mem::discriminant(prev_kind) != std::mem::discriminant(kind) => {
                        return Err(SymbolError::InvalidRedefinition {
                            name: symbol.name,
                            previous: prev_data.location.clone(),
                            reason: "symbol kinds do not match".into(),
                        });
                    }
                    _ => {}
                }
            }
        }
        let index = SymbolIndex(self.symbols.len());
        self.symbols.push(SymbolData {
            name: symbol.name.clone(),
            location: symbol.location,
            kind: symbol.kind,
            access_modifier: symbol.access_modifier,
            parent: Some(parent),
            children: IndexMap::new(),
        });
        self.symbols[parent.0]
            .children
            .entry(symbol.name)
            .or_default()
            .push(index);
        Ok(index)
    }

    /// Adds a module symbol, inventing a private name when none is given.
    pub fn add_module(
        &mut self,
        parent: SymbolIndex,
        module_type: ModuleType,
        location: Location,
        name: Option<String>,
    ) -> Result<SymbolIndex, SymbolError> {
        let (name, access_modifier) = match name {
            Some(name) => (name, AccessModifier::Public),
            None => (self.fresh_module_name(), AccessModifier::Private),
        };
        self.add_child(
            parent,
            Symbol {
                name,
                location,
                kind: SymbolKind::Module { module_type },
                access_modifier,
            },
            false,
        )
    }

    /// Downward-only search among the children of `from`.
    pub fn find(&self, from: SymbolIndex, path: &[String]) -> Vec<SymbolIndex> {
        match path.split_first() {
            None => vec![from],
            Some((head, rest)) => {
                let children = match self.symbols[from.0].children.get(head) {
                    Some(children) => children.clone(),
                    None => return Vec::new(),
                };
                if rest.is_empty() {
                    children
                } else {
                    children.into_iter().flat_map(|child| self.find(child, rest)).collect()
                }
            }
        }
    }

    /// Upward-then-downward search starting at `from`. Module and binding
    /// symbols stop the upward recursion; if nothing resolved and the search
    /// origin itself carries the first path segment as its name, the rest of
    /// the path is resolved below it.
    pub fn lookup(
        &self,
        from: SymbolIndex,
        path: &[String],
        accepted: Option<ReferenceKind>,
    ) -> Vec<SymbolIndex> {
        let head = match path.first() {
            Some(head) => head,
            None => return Vec::new(),
        };
        let data = &self.symbols[from.0];
        let mut resolved = Vec::new();
        if let Some(roots) = data.children.get(head) {
            for root in roots.clone() {
                for found in self.find(root, &path[1..]) {
                    let kind = self.symbols[found.0].reference_kind();
                    if accepted.map_or(true, |accepted| accepted.intersects(kind)) {
                        resolved.push(found);
                    }
                }
            }
        }
        if resolved.is_empty() {
            let terminates = matches!(data.kind, SymbolKind::Module { .. } | SymbolKind::Binding { .. });
            if !terminates {
                if let Some(parent) = data.parent {
                    return self.lookup(parent, path, accepted);
                }
            }
            if data.name == *head {
                return self.find(from, &path[1..]);
            }
        }
        resolved
    }

    /// Pre-order traversal below and including `from`.
    pub fn traverse(&self, from: SymbolIndex, enter: &mut impl FnMut(SymbolIndex, &SymbolData)) {
        enter(from, &self.symbols[from.0]);
        let children: Vec<SymbolIndex> = self.symbols[from.0]
            .children
            .values()
            .flatten()
            .copied()
            .collect();
        for child in children {
            self.traverse(child, enter);
        }
    }

    /// The qualified name of a symbol: ancestor names excluding the root.
    pub fn qualified(&self, index: SymbolIndex) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = Some(index);
        while let Some(index) = current {
            let data = &self.symbols[index.0];
            if data.parent.is_some() {
                names.push(data.name.clone());
            }
            current = data.parent;
        }
        names.reverse();
        names
    }

    /// The nearest enclosing module symbol, including `from` itself.
    pub fn get_current_module(&self, from: SymbolIndex) -> Option<SymbolIndex> {
        let mut current = Some(from);
        while let Some(index) = current {
            if matches!(self.symbols[index.0].kind, SymbolKind::Module { .. }) {
                return Some(index);
            }
            current = self.symbols[index.0].parent;
        }
        None
    }

    /// The nearest enclosing binding symbol, including `from` itself.
    pub fn get_current_binding(&self, from: SymbolIndex) -> Option<SymbolIndex> {
        let mut current = Some(from);
        while let Some(index) = current {
            if matches!(self.symbols[index.0].kind, SymbolKind::Binding { .. }) {
                return Some(index);
            }
            current = self.symbols[index.0].parent;
        }
        None
    }

    /// The module name a reference written at `from` implicitly targets:
    /// the enclosing module's name, or the enclosing binding's module name.
    pub fn current_module_name(&self, from: SymbolIndex) -> Option<String> {
        if let Some(module) = self.get_current_module(from) {
            return Some(self.symbols[module.0].name.clone());
        }
        self.get_current_binding(from).map(|binding| self.symbols[binding.0].name.clone())
    }

    /// The access modifier effective from the table root: the strongest
    /// modifier anywhere on the chain wins.
    pub fn get_visible_access_modifier(&self, from: SymbolIndex) -> AccessModifier {
        let mut strongest = AccessModifier::Public;
        let mut current = Some(from);
        while let Some(index) = current {
            strongest = strongest.max(self.symbols[index.0].access_modifier);
            current = self.symbols[index.0].parent;
        }
        strongest
    }

    /// Returns true if `ancestor` lies on the parent chain of `descendant`.
    pub fn is_parent_of(&self, ancestor: SymbolIndex, descendant: SymbolIndex) -> bool {
        let mut current = self.symbols[descendant.0].parent;
        while let Some(index) = current {
            if index == ancestor {
                return true;
            }
            current = self.symbols[index.0].parent;
        }
        false
    }

    /// Imports `module` from `source` under `scope`: a copy of the module is
    /// attached to the scope, then all PUBLIC children are copied over.
    /// Nested public modules are imported next to the copy; definitions are
    /// copied into it, allowing alternatives when the source held several.
    /// Collisions never abort the import; they accumulate in `collisions`.
    pub fn import_from(
        &mut self,
        scope: SymbolIndex,
        source: &SymbolTable,
        module: SymbolIndex,
        collisions: &mut Vec<SymbolError>,
    ) {
        let copy = match self.add_child(scope, source.get(module).to_symbol(), false) {
            Ok(copy) => copy,
            Err(error) => {
                collisions.push(error);
                return;
            }
        };
        for alternatives in source.get(module).children.values() {
            let allow_alternatives = alternatives.len() > 1;
            for &child in alternatives {
                let child_data = source.get(child);
                if child_data.access_modifier != AccessModifier::Public {
                    continue;
                }
                match &child_data.kind {
                    SymbolKind::Module { .. } => {
                        self.import_from(scope, source, child, collisions);
                    }
                    SymbolKind::Def { .. } => {
                        if let Err(error) =
                            self.add_child(copy, child_data.to_symbol(), allow_alternatives)
                        {
                            collisions.push(error);
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Position, Range};
    use pretty_assertions::assert_eq;

    fn loc(line: u32) -> Location {
        Location::new(
            "/tmp/test.tex",
            Range::new(Position::new(line, 0), Position::new(line, 5)),
        )
    }

    fn def(def_type: DefType, noverb: bool) -> SymbolKind {
        SymbolKind::Def { def_type, noverb, noverbs: BTreeSet::new() }
    }

    fn table_with_module() -> (SymbolTable, SymbolIndex) {
        let mut table = SymbolTable::new(loc(0));
        let module = table
            .add_module(SymbolIndex::ROOT, ModuleType::Modsig, loc(0), Some("m".into()))
            .unwrap();
        (table, module)
    }

    #[test]
    fn duplicate_symbol_is_rejected() {
        let (mut table, module) = table_with_module();
        let symbol = Symbol {
            name: "x".into(),
            location: loc(1),
            kind: def(DefType::Sym, false),
            access_modifier: AccessModifier::Public,
        };
        table.add_child(module, symbol.clone(), false).unwrap();
        let error = table.add_child(module, symbol, false).unwrap_err();
        assert!(matches!(error, SymbolError::Duplicate { .. }));
    }

    #[test]
    fn alternatives_with_agreeing_signatures_are_accepted() {
        let (mut table, module) = table_with_module();
        let symbol = Symbol {
            name: "x".into(),
            location: loc(1),
            kind: def(DefType::Symdef, false),
            access_modifier: AccessModifier::Public,
        };
        table.add_child(module, symbol.clone(), true).unwrap();
        table.add_child(module, symbol, true).unwrap();
        let path = vec!["m".to_string(), "x".to_string()];
        assert_eq!(table.find(SymbolIndex::ROOT, &path).len(), 2);
    }

    #[test]
    fn alternative_with_differing_noverb_is_invalid() {
        let (mut table, module) = table_with_module();
        let first = Symbol {
            name: "x".into(),
            location: loc(1),
            kind: def(DefType::Symdef, false),
            access_modifier: AccessModifier::Public,
        };
        let second = Symbol {
            name: "x".into(),
            location: loc(2),
            kind: def(DefType::Symdef, true),
            access_modifier: AccessModifier::Public,
        };
        table.add_child(module, first, true).unwrap();
        let error = table.add_child(module, second, true).unwrap_err();
        assert!(matches!(error, SymbolError::InvalidRedefinition { .. }));
    }

    #[test]
    fn same_name_with_different_reference_kind_coexists() {
        let (mut table, module) = table_with_module();
        let sym = Symbol {
            name: "x".into(),
            location: loc(1),
            kind: def(DefType::Sym, false),
            access_modifier: AccessModifier::Public,
        };
        let symdef = Symbol {
            name: "x".into(),
            location: loc(2),
            kind: def(DefType::Symdef, false),
            access_modifier: AccessModifier::Public,
        };
        table.add_child(module, sym, false).unwrap();
        table.add_child(module, symdef, true).unwrap();
        let path = vec!["m".to_string(), "x".to_string()];
        assert_eq!(table.find(SymbolIndex::ROOT, &path).len(), 2);
    }

    #[test]
    fn lookup_climbs_to_parent_scopes() {
        let (mut table, module) = table_with_module();
        let symbol = Symbol {
            name: "x".into(),
            location: loc(1),
            kind: def(DefType::Sym, false),
            access_modifier: AccessModifier::Public,
        };
        let x = table.add_child(module, symbol, false).unwrap();
        let scope_name = table.fresh_scope_name("frame");
        let scope = table
            .add_child(
                module,
                Symbol {
                    name: scope_name,
                    location: loc(2),
                    kind: SymbolKind::Scope,
                    access_modifier: AccessModifier::Public,
                },
                false,
            )
            .unwrap();
        let resolved = table.lookup(scope, &["x".to_string()], None);
        assert_eq!(resolved, vec![x]);
    }

    #[test]
    fn modules_terminate_upward_lookup() {
        let mut table = SymbolTable::new(loc(0));
        let first = table
            .add_module(SymbolIndex::ROOT, ModuleType::Module, loc(0), Some("a".into()))
            .unwrap();
        let second = table
            .add_module(SymbolIndex::ROOT, ModuleType::Module, loc(1), Some("b".into()))
            .unwrap();
        table
            .add_child(
                second,
                Symbol {
                    name: "y".into(),
                    location: loc(2),
                    kind: def(DefType::Sym, false),
                    access_modifier: AccessModifier::Public,
                },
                false,
            )
            .unwrap();
        // From inside module `a`, the sibling module's symbol is not in reach.
        assert!(table.lookup(first, &["y".to_string()], None).is_empty());
    }

    #[test]
    fn lookup_resolves_own_module_by_name() {
        let (mut table, module) = table_with_module();
        let symbol = Symbol {
            name: "x".into(),
            location: loc(1),
            kind: def(DefType::Sym, false),
            access_modifier: AccessModifier::Public,
        };
        let x = table.add_child(module, symbol, false).unwrap();
        let path = vec!["m".to_string(), "x".to_string()];
        assert_eq!(table.lookup(module, &path, None), vec![x]);
    }

    #[test]
    fn visible_access_modifier_takes_strongest() {
        let mut table = SymbolTable::new(loc(0));
        let module = table
            .add_module(SymbolIndex::ROOT, ModuleType::Module, loc(0), None)
            .unwrap();
        let child = table
            .add_child(
                module,
                Symbol {
                    name: "x".into(),
                    location: loc(1),
                    kind: def(DefType::Def, false),
                    access_modifier: AccessModifier::Public,
                },
                false,
            )
            .unwrap();
        // The anonymous module is private, so everything below is private too.
        assert_eq!(table.get_visible_access_modifier(child), AccessModifier::Private);
    }

    #[test]
    fn import_from_copies_public_symbols() {
        let (mut source, module) = table_with_module();
        source
            .add_child(
                module,
                Symbol {
                    name: "x".into(),
                    location: loc(1),
                    kind: def(DefType::Sym, false),
                    access_modifier: AccessModifier::Public,
                },
                false,
            )
            .unwrap();
        source
            .add_child(
                module,
                Symbol {
                    name: "hidden".into(),
                    location: loc(2),
                    kind: def(DefType::Sym, false),
                    access_modifier: AccessModifier::Private,
                },
                false,
            )
            .unwrap();

        let mut target = SymbolTable::new(loc(0));
        let mut collisions = Vec::new();
        target.import_from(SymbolIndex::ROOT, &source, module, &mut collisions);
        assert!(collisions.is_empty());
        let path = vec!["m".to_string(), "x".to_string()];
        assert_eq!(target.find(SymbolIndex::ROOT, &path).len(), 1);
        let hidden = vec!["m".to_string(), "hidden".to_string()];
        assert!(target.find(SymbolIndex::ROOT, &hidden).is_empty());
    }

    #[test]
    fn qualified_names_exclude_root() {
        let (mut table, module) = table_with_module();
        let x = table
            .add_child(
                module,
                Symbol {
                    name: "x".into(),
                    location: loc(1),
                    kind: def(DefType::Sym, false),
                    access_modifier: AccessModifier::Public,
                },
                false,
            )
            .unwrap();
        assert_eq!(table.qualified(x), vec!["m".to_string(), "x".to_string()]);
    }
}
