//! Typed intermediate trees built from the raw LaTeX environment tree.
//!
//! The builder walks the environment tree depth-first and tries, for every
//! environment, a fixed list of classifiers. The first classifier whose name
//! pattern matches constructs a typed node, attaches it to the current top of
//! the attach stack and pushes itself; environments nobody recognises are
//! skipped but their children are still walked under the same attach point.
//! A classifier that matches by name but rejects the argument shape records
//! a fault at the environment's location and suppresses the node the same
//! way.
//!
//! Nodes live in an arena with parent indices so later passes can ask for
//! the enclosing module of any node without reference cycles.

use std::collections::BTreeSet;
use std::path::PathBuf;

use lazy_static::lazy_static;
use regex::Regex;

use crate::diagnostics::Diagnostic;
use crate::latex::{Environment, LatexParser, Token};
use crate::location::Location;

lazy_static! {
    static ref SCOPE_PATTERN: Regex = Regex::new(r"^(n?omtext|example|omgroup|frame)$").unwrap();
    static ref MODSIG_PATTERN: Regex = Regex::new(r"^modsig$").unwrap();
    static ref MODNL_PATTERN: Regex = Regex::new(r"^(mh)?modnl$").unwrap();
    static ref MODULE_PATTERN: Regex = Regex::new(r"^module(\*)?$").unwrap();
    static ref TREFI_PATTERN: Regex = Regex::new(r"^([ma]*)([dDtT])ref([ivx]+)(s)?(\*)?$").unwrap();
    static ref DEFI_PATTERN: Regex = Regex::new(r"^([ma]*)([dD])ef([ivx]+)(s)?(\*)?$").unwrap();
    static ref SYMI_PATTERN: Regex = Regex::new(r"^sym([ivx]+)(\*)?$").unwrap();
    static ref SYMDEF_PATTERN: Regex = Regex::new(r"^symdef(\*)?$").unwrap();
    static ref IMPORTMODULE_PATTERN: Regex = Regex::new(r"^(import|use)(mh)?module(\*)?$").unwrap();
    static ref GIMPORT_PATTERN: Regex = Regex::new(r"^g(import|use)(\*)?$").unwrap();
    static ref GSTRUCTURE_PATTERN: Regex = Regex::new(r"^gstructure(\*)?$").unwrap();
    static ref VIEW_PATTERN: Regex = Regex::new(r"^(mhview|gviewnl)$").unwrap();
    static ref VIEWSIG_PATTERN: Regex = Regex::new(r"^gviewsig$").unwrap();
    static ref TASSIGN_PATTERN: Regex = Regex::new(r"^([tv])assign$").unwrap();
}

/// Decodes a roman numeral written with `i`, `v` and `x`. The decoded value
/// is re-encoded and compared so that malformed numerals such as `iiv` are
/// rejected rather than silently accepted.
pub fn decode_roman(numeral: &str) -> Option<usize> {
    let digit = |c: char| match c {
        'i' => Some(1usize),
        'v' => Some(5),
        'x' => Some(10),
        _ => None,
    };
    let mut total = 0usize;
    let mut previous = 0usize;
    for c in numeral.chars().rev() {
        let value = digit(c)?;
        if value < previous {
            total = total.checked_sub(value)?;
        } else {
            total += value;
            previous = value;
        }
    }
    if total == 0 || encode_roman(total)? != numeral {
        return None;
    }
    Some(total)
}

fn encode_roman(mut value: usize) -> Option<String> {
    if value == 0 || value > 39 {
        return None;
    }
    let mut out = String::new();
    for (amount, digits) in [(10, "x"), (9, "ix"), (5, "v"), (4, "iv"), (1, "i")] {
        while value >= amount {
            out.push_str(digits);
            value -= amount;
        }
    }
    Some(out)
}

/// The `noverb` annotations of a `symi` or `symdef`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NoverbAnnotation {
    /// Bare `[noverb]`: the symbol must never be referenced
    pub all: bool,
    /// `[noverb={en,de}]`: languages the symbol must not be referenced from
    pub langs: BTreeSet<String>,
}

impl NoverbAnnotation {
    fn from_environment(env: &Environment) -> Self {
        let all = env.unnamed_args().iter().any(|token| token.text == "noverb");
        let langs = match env.named_args().get("noverb") {
            Some(token) => {
                let text = token.text.trim();
                let inner = text
                    .strip_prefix('{')
                    .and_then(|t| t.strip_suffix('}'))
                    .unwrap_or(text);
                inner
                    .split(',')
                    .map(|lang| lang.trim().to_string())
                    .filter(|lang| !lang.is_empty())
                    .collect()
            }
            None => BTreeSet::new(),
        };
        Self { all, langs }
    }
}

fn joined_name(tokens: &[Token], skip: usize) -> String {
    tokens
        .iter()
        .skip(skip)
        .map(|token| token.text.trim())
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeTree {
    pub scope_name: Token,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModSigTree {
    pub name: Token,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModNlTree {
    pub name: Token,
    pub lang: Token,
    pub mh_mode: bool,
    /// Default path of the module signature this binding attaches to:
    /// `<dir of binding>/<name>.tex`.
    pub module_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleTree {
    pub id: Option<Token>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrefiTree {
    pub tokens: Vec<Token>,
    pub target_annotation: Option<Token>,
    pub m: bool,
    pub a: bool,
    pub capital: bool,
    pub drefi: bool,
    pub i: usize,
    pub s: bool,
    pub asterisk: bool,
}

impl TrefiTree {
    /// The referenced symbol's name: the part after `?` in the target
    /// annotation if present, else the `-`-join of the tokens.
    pub fn name(&self) -> String {
        if let Some(annotation) = &self.target_annotation {
            if annotation.text.contains('?') {
                return annotation
                    .text
                    .rsplit('?')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();
            }
        }
        joined_name(&self.tokens, self.a as usize)
    }

    /// The explicitly named target module, if any: `[module]` names one, as
    /// does the left half of `[module?symbol]`; a bare `[?symbol]` does not.
    pub fn module(&self) -> Option<Token> {
        let annotation = self.target_annotation.as_ref()?;
        match annotation.text.find('?') {
            Some(index) => {
                let (left, _) = annotation.split(index, 1);
                if left.text.is_empty() {
                    None
                } else {
                    Some(left)
                }
            }
            None => Some(annotation.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefiTree {
    pub tokens: Vec<Token>,
    pub name_annotation: Option<Token>,
    pub m: bool,
    pub a: bool,
    pub capital: bool,
    pub i: usize,
    pub s: bool,
    pub asterisk: bool,
}

impl DefiTree {
    pub fn name(&self) -> String {
        if let Some(annotation) = &self.name_annotation {
            return annotation.text.trim().to_string();
        }
        joined_name(&self.tokens, self.a as usize)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymiTree {
    pub tokens: Vec<Token>,
    pub noverb: NoverbAnnotation,
    pub i: usize,
    pub asterisk: bool,
}

impl SymiTree {
    pub fn name(&self) -> String {
        joined_name(&self.tokens, 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymdefTree {
    pub name: Token,
    pub noverb: NoverbAnnotation,
    pub asterisk: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportModuleTree {
    pub module: Token,
    pub mhrepos: Option<Token>,
    pub repos: Option<Token>,
    pub dir: Option<Token>,
    pub load: Option<Token>,
    pub path: Option<Token>,
    pub export: bool,
    pub mh_mode: bool,
    pub asterisk: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GImportTree {
    pub module: Token,
    pub repository: Option<Token>,
    pub export: bool,
    pub asterisk: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GStructureTree {
    pub mhrepos: Option<Token>,
    pub module: Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEnv {
    Gviewnl,
    Mhview,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewTree {
    pub env: ViewEnv,
    pub module: Token,
    pub lang: Option<Token>,
    pub imports: Vec<Token>,
    pub fromrepos: Option<Token>,
    pub frompath: Option<Token>,
    pub torepos: Option<Token>,
    pub topath: Option<Token>,
}

impl ViewTree {
    pub fn source_module(&self) -> Option<&Token> {
        self.imports.first()
    }

    pub fn target_module(&self) -> Option<&Token> {
        self.imports.get(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewSigTree {
    pub fromrepos: Option<Token>,
    pub torepos: Option<Token>,
    pub module_name: Token,
    pub imports: Vec<Token>,
}

impl ViewSigTree {
    pub fn source_module(&self) -> Option<&Token> {
        self.imports.first()
    }

    pub fn target_module(&self) -> Option<&Token> {
        self.imports.get(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TassignTree {
    /// True for `vassign`: the assignment targets a value term
    pub value_assignment: bool,
    pub source_symbol: Token,
    pub target_term: Token,
}

/// A classified environment.
#[derive(Debug, Clone, PartialEq)]
pub enum IntermediateKind {
    Scope(ScopeTree),
    ModSig(ModSigTree),
    ModNl(ModNlTree),
    Module(ModuleTree),
    Trefi(TrefiTree),
    Defi(DefiTree),
    Symi(SymiTree),
    Symdef(SymdefTree),
    ImportModule(ImportModuleTree),
    GImport(GImportTree),
    GStructure(GStructureTree),
    View(ViewTree),
    ViewSig(ViewSigTree),
    Tassign(TassignTree),
}

/// Stable index of a node inside its [`IntermediateTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateNode {
    pub kind: IntermediateKind,
    pub location: Location,
    pub parent: Option<NodeIndex>,
    pub children: Vec<NodeIndex>,
}

/// The classified tree of one file: roots, arena nodes, and the
/// classification faults recorded along the way.
#[derive(Debug, Default)]
pub struct IntermediateTree {
    nodes: Vec<IntermediateNode>,
    pub roots: Vec<NodeIndex>,
    pub errors: Vec<(Location, Diagnostic)>,
}

impl IntermediateTree {
    /// Builds the typed tree from a parsed file.
    pub fn build(parser: &LatexParser) -> Self {
        let mut builder = Builder { tree: IntermediateTree::default(), stack: Vec::new() };
        for root in &parser.roots {
            builder.visit(root);
        }
        builder.tree
    }

    pub fn get(&self, index: NodeIndex) -> &IntermediateNode {
        &self.nodes[index.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, kind: IntermediateKind, location: Location, parent: Option<NodeIndex>) -> NodeIndex {
        let index = NodeIndex(self.nodes.len());
        self.nodes.push(IntermediateNode { kind, location, parent, children: Vec::new() });
        match parent {
            Some(parent) => self.nodes[parent.0].children.push(index),
            None => self.roots.push(index),
        }
        index
    }

    /// The name of the module environment enclosing `node`, if any.
    /// Anonymous `module` environments have no addressable name.
    pub fn find_parent_module_name(&self, node: NodeIndex) -> Option<String> {
        let mut current = self.nodes[node.0].parent;
        while let Some(index) = current {
            match &self.nodes[index.0].kind {
                IntermediateKind::ModSig(tree) => return Some(tree.name.text.clone()),
                IntermediateKind::ModNl(tree) => return Some(tree.name.text.clone()),
                IntermediateKind::Module(tree) => return tree.id.as_ref().map(|id| id.text.clone()),
                _ => {}
            }
            current = self.nodes[index.0].parent;
        }
        None
    }

    /// The nearest enclosing module-ish environment (module, modsig, modnl).
    pub fn find_parent_module_node(&self, node: NodeIndex) -> Option<&IntermediateKind> {
        let mut current = self.nodes[node.0].parent;
        while let Some(index) = current {
            match &self.nodes[index.0].kind {
                kind @ (IntermediateKind::ModSig(_)
                | IntermediateKind::ModNl(_)
                | IntermediateKind::Module(_)) => return Some(kind),
                _ => {}
            }
            current = self.nodes[index.0].parent;
        }
        None
    }
}

struct Builder {
    tree: IntermediateTree,
    stack: Vec<NodeIndex>,
}

impl Builder {
    fn visit(&mut self, env: &Environment) {
        let pushed = self.enter(env);
        for child in &env.children {
            self.visit(child);
        }
        if pushed {
            self.stack.pop();
        }
    }

    fn enter(&mut self, env: &Environment) -> bool {
        match classify(env) {
            Ok(Some(kind)) => {
                let parent = self.stack.last().copied();
                let index = self.tree.push(kind, env.location.clone(), parent);
                self.stack.push(index);
                true
            }
            Ok(None) => false,
            Err(message) => {
                self.tree
                    .errors
                    .push((env.location.clone(), Diagnostic::invalid_environment(message)));
                false
            }
        }
    }
}

/// Tries every classifier in declared order. The order matters: the first
/// name pattern that matches claims the environment.
fn classify(env: &Environment) -> Result<Option<IntermediateKind>, String> {
    type Classifier = fn(&Environment) -> Result<Option<IntermediateKind>, String>;
    const CLASSIFIERS: &[Classifier] = &[
        classify_scope,
        classify_modsig,
        classify_modnl,
        classify_module,
        classify_trefi,
        classify_defi,
        classify_symi,
        classify_symdef,
        classify_importmodule,
        classify_gimport,
        classify_gstructure,
        classify_view,
        classify_viewsig,
        classify_tassign,
    ];
    for classifier in CLASSIFIERS {
        if let Some(kind) = classifier(env)? {
            return Ok(Some(kind));
        }
    }
    Ok(None)
}

fn classify_scope(env: &Environment) -> Result<Option<IntermediateKind>, String> {
    if !SCOPE_PATTERN.is_match(&env.name.text) {
        return Ok(None);
    }
    Ok(Some(IntermediateKind::Scope(ScopeTree { scope_name: env.name.clone() })))
}

fn classify_modsig(env: &Environment) -> Result<Option<IntermediateKind>, String> {
    if !MODSIG_PATTERN.is_match(&env.name.text) {
        return Ok(None);
    }
    let name = env
        .rargs
        .first()
        .ok_or("modsig environment missing required argument: {<module name>}")?;
    Ok(Some(IntermediateKind::ModSig(ModSigTree { name: name.clone() })))
}

fn classify_modnl(env: &Environment) -> Result<Option<IntermediateKind>, String> {
    let captures = match MODNL_PATTERN.captures(&env.name.text) {
        Some(captures) => captures,
        None => return Ok(None),
    };
    if env.rargs.len() != 2 {
        return Err(format!("argument count mismatch (expected 2, found {})", env.rargs.len()));
    }
    let name = env.rargs[0].clone();
    let module_path = env
        .location
        .path
        .parent()
        .map(|dir| dir.join(format!("{}.tex", name.text.trim())))
        .unwrap_or_else(|| PathBuf::from(format!("{}.tex", name.text.trim())));
    Ok(Some(IntermediateKind::ModNl(ModNlTree {
        name,
        lang: env.rargs[1].clone(),
        mh_mode: captures.get(1).is_some(),
        module_path,
    })))
}

fn classify_module(env: &Environment) -> Result<Option<IntermediateKind>, String> {
    if !MODULE_PATTERN.is_match(&env.name.text) {
        return Ok(None);
    }
    let id = env.named_args().get("id").cloned().cloned();
    Ok(Some(IntermediateKind::Module(ModuleTree { id })))
}

fn classify_trefi(env: &Environment) -> Result<Option<IntermediateKind>, String> {
    let captures = match TREFI_PATTERN.captures(&env.name.text) {
        Some(captures) => captures,
        None => return Ok(None),
    };
    if env.rargs.is_empty() {
        return Err("argument count mismatch (expected at least 1, found 0)".into());
    }
    let unnamed = env.unnamed_args();
    if unnamed.len() > 1 {
        return Err(format!(
            "too many unnamed optional arguments in trefi: expected at most 1, found {}",
            unnamed.len()
        ));
    }
    let flags = captures.get(1).map_or("", |m| m.as_str());
    let letter = captures.get(2).map_or("", |m| m.as_str());
    let i = decode_roman(captures.get(3).map_or("", |m| m.as_str()))
        .ok_or_else(|| format!("invalid environment (are the roman numerals correct?): {}", env.name.text))?;
    let a = flags.contains('a');
    if i + a as usize != env.rargs.len() {
        return Err(format!(
            "trefi argument count mismatch: expected {} vs. actual {}",
            i + a as usize,
            env.rargs.len()
        ));
    }
    Ok(Some(IntermediateKind::Trefi(TrefiTree {
        tokens: env.rargs.clone(),
        target_annotation: unnamed.first().map(|token| (*token).clone()),
        m: flags.contains('m'),
        a,
        capital: letter == "T",
        drefi: letter == "d" || letter == "D",
        i,
        s: captures.get(4).is_some(),
        asterisk: captures.get(5).is_some(),
    })))
}

fn classify_defi(env: &Environment) -> Result<Option<IntermediateKind>, String> {
    let captures = match DEFI_PATTERN.captures(&env.name.text) {
        Some(captures) => captures,
        None => return Ok(None),
    };
    if env.rargs.is_empty() {
        return Err("argument count mismatch (expected at least 1, found 0)".into());
    }
    let flags = captures.get(1).map_or("", |m| m.as_str());
    let i = decode_roman(captures.get(3).map_or("", |m| m.as_str()))
        .ok_or_else(|| format!("invalid environment (are the roman numerals correct?): {}", env.name.text))?;
    let a = flags.contains('a');
    if i + a as usize != env.rargs.len() {
        return Err(format!(
            "defi argument count mismatch: expected {} vs. actual {}",
            i + a as usize,
            env.rargs.len()
        ));
    }
    Ok(Some(IntermediateKind::Defi(DefiTree {
        tokens: env.rargs.clone(),
        name_annotation: env.named_args().get("name").cloned().cloned(),
        m: flags.contains('m'),
        a,
        capital: captures.get(2).map_or("", |m| m.as_str()) == "D",
        i,
        s: captures.get(4).is_some(),
        asterisk: captures.get(5).is_some(),
    })))
}

fn classify_symi(env: &Environment) -> Result<Option<IntermediateKind>, String> {
    let captures = match SYMI_PATTERN.captures(&env.name.text) {
        Some(captures) => captures,
        None => return Ok(None),
    };
    if env.rargs.is_empty() {
        return Err("argument count mismatch (expected at least 1, found 0)".into());
    }
    let i = decode_roman(captures.get(1).map_or("", |m| m.as_str()))
        .ok_or_else(|| format!("invalid environment (are the roman numerals correct?): {}", env.name.text))?;
    if i != env.rargs.len() {
        return Err(format!(
            "symi argument count mismatch: expected {} vs. actual {}",
            i,
            env.rargs.len()
        ));
    }
    Ok(Some(IntermediateKind::Symi(SymiTree {
        tokens: env.rargs.clone(),
        noverb: NoverbAnnotation::from_environment(env),
        i,
        asterisk: captures.get(2).is_some(),
    })))
}

fn classify_symdef(env: &Environment) -> Result<Option<IntermediateKind>, String> {
    let captures = match SYMDEF_PATTERN.captures(&env.name.text) {
        Some(captures) => captures,
        None => return Ok(None),
    };
    let first = env
        .rargs
        .first()
        .ok_or("argument count mismatch: at least one argument required")?;
    let name = env.named_args().get("name").cloned().cloned().unwrap_or_else(|| first.clone());
    Ok(Some(IntermediateKind::Symdef(SymdefTree {
        name,
        noverb: NoverbAnnotation::from_environment(env),
        asterisk: captures.get(1).is_some(),
    })))
}

fn classify_importmodule(env: &Environment) -> Result<Option<IntermediateKind>, String> {
    let captures = match IMPORTMODULE_PATTERN.captures(&env.name.text) {
        Some(captures) => captures,
        None => return Ok(None),
    };
    if env.rargs.len() != 1 {
        return Err(format!(
            "argument count mismatch: expected exactly 1 argument but found {}",
            env.rargs.len()
        ));
    }
    let named = env.named_args();
    let mh_mode = captures.get(2).is_some();
    let mhrepos = named.get("mhrepos").or_else(|| named.get("repos")).cloned().cloned();
    let repos = named.get("repos").cloned().cloned();
    let dir = named.get("dir").cloned().cloned();
    let path = named.get("path").cloned().cloned();
    let load = named.get("load").cloned().cloned();
    if mh_mode {
        if dir.is_some() && path.is_some() {
            return Err(
                "invalid argument configuration in importmhmodule: \"dir\" and \"path\" must not be specified at the same time"
                    .into(),
            );
        }
        if mhrepos.is_some() && dir.is_none() && path.is_none() {
            return Err(
                "invalid argument configuration in importmhmodule: \"mhrepos\" requires a \"dir\" or \"path\" argument"
                    .into(),
            );
        }
        if load.is_some() {
            return Err(
                "invalid argument configuration in importmhmodule: \"load\" argument must not be specified".into(),
            );
        }
    } else if mhrepos.is_some() || dir.is_some() || path.is_some() {
        return Err(
            "invalid argument configuration in importmodule: \"mhrepos\", \"dir\" or \"path\" must not be specified"
                .into(),
        );
    } else if load.is_none() {
        return Err("invalid argument configuration in importmodule: missing \"load\" argument".into());
    }
    Ok(Some(IntermediateKind::ImportModule(ImportModuleTree {
        module: env.rargs[0].clone(),
        mhrepos,
        repos,
        dir,
        load,
        path,
        export: captures.get(1).map_or("", |m| m.as_str()) == "import",
        mh_mode,
        asterisk: captures.get(3).is_some(),
    })))
}

fn classify_gimport(env: &Environment) -> Result<Option<IntermediateKind>, String> {
    let captures = match GIMPORT_PATTERN.captures(&env.name.text) {
        Some(captures) => captures,
        None => return Ok(None),
    };
    if env.rargs.len() != 1 {
        return Err(format!("argument count mismatch (expected 1, found {})", env.rargs.len()));
    }
    let unnamed = env.unnamed_args();
    if unnamed.len() > 1 {
        return Err(format!(
            "optional argument count mismatch (expected at most 1, found {})",
            unnamed.len()
        ));
    }
    Ok(Some(IntermediateKind::GImport(GImportTree {
        module: env.rargs[0].clone(),
        repository: unnamed.first().map(|token| (*token).clone()),
        export: captures.get(1).map_or("", |m| m.as_str()) == "import",
        asterisk: captures.get(2).is_some(),
    })))
}

fn classify_gstructure(env: &Environment) -> Result<Option<IntermediateKind>, String> {
    if !GSTRUCTURE_PATTERN.is_match(&env.name.text) {
        return Ok(None);
    }
    if env.rargs.len() != 2 {
        return Err(format!(
            "gstructure environment requires 2 arguments but {} found",
            env.rargs.len()
        ));
    }
    Ok(Some(IntermediateKind::GStructure(GStructureTree {
        mhrepos: env.named_args().get("mhrepos").cloned().cloned(),
        module: env.rargs[1].clone(),
    })))
}

fn classify_view(env: &Environment) -> Result<Option<IntermediateKind>, String> {
    if !VIEW_PATTERN.is_match(&env.name.text) {
        return Ok(None);
    }
    let named = env.named_args();
    let (view_env, lang, imports) = match env.name.text.as_str() {
        "gviewnl" => {
            if env.rargs.len() < 2 {
                return Err(format!(
                    "argument count mismatch: gviewnl requires at least 2 arguments, found {}",
                    env.rargs.len()
                ));
            }
            if named.contains_key("frompath") {
                return Err("frompath argument not allowed in gviewnl".into());
            }
            (ViewEnv::Gviewnl, Some(env.rargs[1].clone()), env.rargs[2..].to_vec())
        }
        _ => {
            if env.rargs.is_empty() {
                return Err("argument count mismatch: mhview requires at least 1 argument, found 0".into());
            }
            if named.contains_key("fromrepos") {
                return Err("fromrepos argument not allowed in mhview".into());
            }
            (ViewEnv::Mhview, None, env.rargs[1..].to_vec())
        }
    };
    Ok(Some(IntermediateKind::View(ViewTree {
        env: view_env,
        module: env.rargs[0].clone(),
        lang,
        imports,
        fromrepos: named.get("fromrepos").cloned().cloned(),
        frompath: named.get("frompath").cloned().cloned(),
        torepos: named.get("torepos").cloned().cloned(),
        topath: named.get("topath").cloned().cloned(),
    })))
}

fn classify_viewsig(env: &Environment) -> Result<Option<IntermediateKind>, String> {
    if !VIEWSIG_PATTERN.is_match(&env.name.text) {
        return Ok(None);
    }
    if env.rargs.is_empty() {
        return Err("viewsig requires at least one argument, found 0".into());
    }
    let named = env.named_args();
    Ok(Some(IntermediateKind::ViewSig(ViewSigTree {
        fromrepos: named.get("fromrepos").cloned().cloned(),
        torepos: named.get("torepos").cloned().cloned(),
        module_name: env.rargs[0].clone(),
        imports: env.rargs[1..].to_vec(),
    })))
}

fn classify_tassign(env: &Environment) -> Result<Option<IntermediateKind>, String> {
    let captures = match TASSIGN_PATTERN.captures(&env.name.text) {
        Some(captures) => captures,
        None => return Ok(None),
    };
    if env.rargs.len() != 2 {
        return Err(format!(
            "tassign requires exactly 2 arguments, found {}",
            env.rargs.len()
        ));
    }
    Ok(Some(IntermediateKind::Tassign(TassignTree {
        value_assignment: captures.get(1).map_or("", |m| m.as_str()) == "v",
        source_symbol: env.rargs[0].clone(),
        target_term: env.rargs[1].clone(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latex::LatexParser;
    use rstest::rstest;
    use std::path::Path;

    fn build(content: &str) -> IntermediateTree {
        let parser = LatexParser::parse(Path::new("/tmp/repo/source/m.tex"), Some(content)).unwrap();
        IntermediateTree::build(&parser)
    }

    #[rstest]
    #[case("i", Some(1))]
    #[case("ii", Some(2))]
    #[case("iii", Some(3))]
    #[case("iv", Some(4))]
    #[case("v", Some(5))]
    #[case("ix", Some(9))]
    #[case("x", Some(10))]
    #[case("iiv", None)]
    #[case("", None)]
    fn roman_numerals(#[case] input: &str, #[case] expected: Option<usize>) {
        assert_eq!(decode_roman(input), expected);
    }

    #[test]
    fn classifies_modsig_with_symi() {
        let tree = build("\\begin{modsig}{m}\\symi{alpha}\\symii{alpha}{beta}\\end{modsig}");
        assert_eq!(tree.roots.len(), 1);
        let root = tree.get(tree.roots[0]);
        assert!(matches!(root.kind, IntermediateKind::ModSig(_)));
        assert_eq!(root.children.len(), 2);
        match &tree.get(root.children[1]).kind {
            IntermediateKind::Symi(symi) => assert_eq!(symi.name(), "alpha-beta"),
            kind => panic!("expected symi, found {kind:?}"),
        }
    }

    #[test]
    fn symi_arity_mismatch_is_a_fault() {
        let tree = build("\\begin{modsig}{m}\\symii{alpha}\\end{modsig}");
        assert_eq!(tree.errors.len(), 1);
        assert!(tree.errors[0].1.to_string().contains("argument count mismatch"));
        // The faulty environment is suppressed
        assert_eq!(tree.get(tree.roots[0]).children.len(), 0);
    }

    #[test]
    fn trefi_names_and_modules() {
        let tree = build("\\module[id=u]{\\trefi[m?alpha]{a} \\atrefii[m]{x}{b}{c} \\trefi{plain}}");
        let module = tree.get(tree.roots[0]);
        let kinds: Vec<_> = module.children.iter().map(|c| &tree.get(*c).kind).collect();
        match kinds[0] {
            IntermediateKind::Trefi(trefi) => {
                assert_eq!(trefi.name(), "alpha");
                assert_eq!(trefi.module().map(|m| m.text), Some("m".to_string()));
            }
            kind => panic!("unexpected kind {kind:?}"),
        }
        match kinds[1] {
            IntermediateKind::Trefi(trefi) => {
                assert!(trefi.a);
                // the leading token carries the `a` argument and is skipped
                assert_eq!(trefi.name(), "b-c");
                assert_eq!(trefi.module().map(|m| m.text), Some("m".to_string()));
            }
            kind => panic!("unexpected kind {kind:?}"),
        }
        match kinds[2] {
            IntermediateKind::Trefi(trefi) => {
                assert_eq!(trefi.name(), "plain");
                assert!(trefi.module().is_none());
            }
            kind => panic!("unexpected kind {kind:?}"),
        }
    }

    #[test]
    fn drefi_flag_is_detected() {
        let tree = build("\\module[id=u]{\\drefi{x}}");
        let module = tree.get(tree.roots[0]);
        match &tree.get(module.children[0]).kind {
            IntermediateKind::Trefi(trefi) => assert!(trefi.drefi),
            kind => panic!("unexpected kind {kind:?}"),
        }
    }

    #[test]
    fn symdef_noverb_annotations() {
        let tree = build("\\begin{modsig}{m}\\symdef[noverb]{x}\\symdef[noverb={en,de}]{y}\\end{modsig}");
        let root = tree.get(tree.roots[0]);
        match &tree.get(root.children[0]).kind {
            IntermediateKind::Symdef(symdef) => assert!(symdef.noverb.all),
            kind => panic!("unexpected kind {kind:?}"),
        }
        match &tree.get(root.children[1]).kind {
            IntermediateKind::Symdef(symdef) => {
                assert!(!symdef.noverb.all);
                assert!(symdef.noverb.langs.contains("en"));
                assert!(symdef.noverb.langs.contains("de"));
            }
            kind => panic!("unexpected kind {kind:?}"),
        }
    }

    #[test]
    fn importmodule_argument_constraints() {
        let faulty = build("\\module[id=u]{\\importmhmodule[dir=a,path=b]{m}}");
        assert_eq!(faulty.errors.len(), 1);
        let missing_load = build("\\module[id=u]{\\importmodule{m}}");
        assert_eq!(missing_load.errors.len(), 1);
        let good = build("\\module[id=u]{\\importmodule[load=lib/m]{m}}");
        assert!(good.errors.is_empty());
        let module = good.get(good.roots[0]);
        match &good.get(module.children[0]).kind {
            IntermediateKind::ImportModule(import) => {
                assert!(import.export);
                assert!(!import.mh_mode);
                assert_eq!(import.load.as_ref().map(|t| t.text.as_str()), Some("lib/m"));
            }
            kind => panic!("unexpected kind {kind:?}"),
        }
    }

    #[test]
    fn usemodule_does_not_export() {
        let tree = build("\\module[id=u]{\\usemodule[load=lib/m]{m}}");
        let module = tree.get(tree.roots[0]);
        match &tree.get(module.children[0]).kind {
            IntermediateKind::ImportModule(import) => assert!(!import.export),
            kind => panic!("unexpected kind {kind:?}"),
        }
    }

    #[test]
    fn gimport_with_repository() {
        let tree = build("\\begin{modsig}{m}\\gimport[smglom/other]{n}\\end{modsig}");
        let root = tree.get(tree.roots[0]);
        match &tree.get(root.children[0]).kind {
            IntermediateKind::GImport(gimport) => {
                assert!(gimport.export);
                assert_eq!(gimport.repository.as_ref().map(|t| t.text.as_str()), Some("smglom/other"));
            }
            kind => panic!("unexpected kind {kind:?}"),
        }
    }

    #[test]
    fn modnl_derives_sibling_module_path() {
        let parser = LatexParser::parse(
            Path::new("/tmp/repo/source/m/m.en.tex"),
            Some("\\begin{modnl}{m}{en}\\end{modnl}"),
        )
        .unwrap();
        let tree = IntermediateTree::build(&parser);
        match &tree.get(tree.roots[0]).kind {
            IntermediateKind::ModNl(modnl) => {
                assert_eq!(modnl.module_path, Path::new("/tmp/repo/source/m/m.tex"));
                assert!(!modnl.mh_mode);
            }
            kind => panic!("unexpected kind {kind:?}"),
        }
    }

    #[test]
    fn parent_module_name_resolution() {
        let tree = build("\\module[id=u]{\\trefi{x}}");
        let module = tree.get(tree.roots[0]);
        let trefi = module.children[0];
        assert_eq!(tree.find_parent_module_name(trefi), Some("u".to_string()));
    }

    #[test]
    fn unknown_environments_are_transparent() {
        let tree = build("\\begin{document}\\begin{modsig}{m}\\end{modsig}\\end{document}");
        // `document` is not classified, `modsig` still becomes a root
        assert_eq!(tree.roots.len(), 1);
        assert!(matches!(tree.get(tree.roots[0]).kind, IntermediateKind::ModSig(_)));
    }
}
