//! The symbol arena and its indexes

use std::collections::HashMap;

use thiserror::Error;

use super::{Location, QualifiedName, Symbol, SymbolId, SymbolKind};

/// Upper bound on base-class chains followed during lookup
const MAX_BASE_DEPTH: usize = 8;

/// A name + kind that is already documented somewhere else
#[derive(Error, Debug, Clone, PartialEq)]
#[error("duplicate {kind} `{name}`: documented at {existing}, again at {duplicate}")]
pub struct DuplicateSymbolError {
    pub name: QualifiedName,
    pub kind: SymbolKind,
    pub existing: Location,
    pub duplicate: Location,
}

/// Lexical context for unqualified lookup, outermost segment first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeStack {
    segments: Vec<String>,
}

impl ScopeStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope stack positioned inside `name`
    #[must_use]
    pub fn within(name: &QualifiedName) -> Self {
        Self {
            segments: name.segments().to_vec(),
        }
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    /// Push every segment of a qualified name; returns how many were pushed
    pub fn push_name(&mut self, name: &QualifiedName) -> usize {
        self.segments.extend(name.segments().iter().cloned());
        name.len()
    }

    pub fn pop(&mut self) -> Option<String> {
        self.segments.pop()
    }

    pub fn truncate(&mut self, depth: usize) {
        self.segments.truncate(depth);
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn current(&self) -> QualifiedName {
        QualifiedName::new(self.segments.clone())
    }

    /// Enclosing scopes from the innermost out to the global scope
    pub fn widening(&self) -> impl Iterator<Item = QualifiedName> + '_ {
        (0..=self.segments.len())
            .rev()
            .map(|n| QualifiedName::new(self.segments[..n].to_vec()))
    }
}

/// Index of every known symbol
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_key: HashMap<(QualifiedName, SymbolKind), SymbolId>,
    by_name: HashMap<QualifiedName, Vec<SymbolId>>,
    by_location: HashMap<(String, String), SymbolId>,
    by_refid: HashMap<String, SymbolId>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(u32::try_from(i).unwrap_or(u32::MAX)), s))
    }

    /// Add a symbol
    ///
    /// Re-inserting a name + kind at the same location returns the existing
    /// id. A local symbol replaces an external one with the same key; an
    /// external symbol never replaces anything.
    pub fn insert(&mut self, symbol: Symbol) -> Result<SymbolId, DuplicateSymbolError> {
        let key = (symbol.name.clone(), symbol.kind);
        if let Some(&id) = self.by_key.get(&key) {
            let existing = &self.symbols[id.index()];
            if existing.location == symbol.location {
                return Ok(id);
            }
            return match (existing.is_local(), symbol.is_local()) {
                (false, true) => {
                    self.unindex(id);
                    self.symbols[id.index()] = symbol;
                    self.index(id);
                    Ok(id)
                }
                (_, false) => Ok(id),
                (true, true) => Err(DuplicateSymbolError {
                    name: symbol.name,
                    kind: symbol.kind,
                    existing: existing.location.clone(),
                    duplicate: symbol.location,
                }),
            };
        }

        let id = SymbolId(u32::try_from(self.symbols.len()).unwrap_or(u32::MAX));
        self.by_key.insert(key, id);
        self.by_name
            .entry(symbol.name.clone())
            .or_default()
            .push(id);
        self.symbols.push(symbol);
        self.index(id);
        Ok(id)
    }

    fn index(&mut self, id: SymbolId) {
        let symbol = &self.symbols[id.index()];
        if let Location::Local { page, anchor } = &symbol.location {
            self.by_location
                .entry((page.clone(), anchor.clone()))
                .or_insert(id);
        }
        if let Some(refid) = &symbol.refid {
            self.by_refid.entry(refid.clone()).or_insert(id);
        }
    }

    fn unindex(&mut self, id: SymbolId) {
        let symbol = &self.symbols[id.index()];
        if let Location::Local { page, anchor } = &symbol.location {
            let key = (page.clone(), anchor.clone());
            if self.by_location.get(&key) == Some(&id) {
                self.by_location.remove(&key);
            }
        }
        if let Some(refid) = &symbol.refid {
            if self.by_refid.get(refid) == Some(&id) {
                self.by_refid.remove(refid);
            }
        }
    }

    pub(crate) fn set_bases(&mut self, id: SymbolId, bases: Vec<SymbolId>) {
        if let Some(symbol) = self.symbols.get_mut(id.index()) {
            symbol.bases = bases;
        }
    }

    /// Exact lookup by fully qualified name and kind
    #[must_use]
    pub fn find(&self, name: &QualifiedName, kind: SymbolKind) -> Option<&Symbol> {
        self.by_key.get(&(name.clone(), kind)).and_then(|&id| self.get(id))
    }

    /// Every kind documented under exactly this qualified name
    #[must_use]
    pub fn named(&self, name: &QualifiedName) -> &[SymbolId] {
        self.by_name.get(name).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn by_refid(&self, refid: &str) -> Option<SymbolId> {
        self.by_refid.get(refid).copied()
    }

    /// Symbol documented at `page#anchor`
    #[must_use]
    pub fn symbol_at(&self, page: &str, anchor: &str) -> Option<SymbolId> {
        self.by_location
            .get(&(page.to_string(), anchor.to_string()))
            .copied()
    }

    /// The compound a page documents, if it documents one
    #[must_use]
    pub fn compound_for_page(&self, page: &str) -> Option<SymbolId> {
        self.symbol_at(page, "")
    }

    /// Whether any local symbol of `kind` exists
    #[must_use]
    pub fn has_local_kind(&self, kind: SymbolKind) -> bool {
        self.symbols.iter().any(|s| s.kind == kind && s.is_local())
    }

    /// Unqualified lookup: the best match at the innermost scope that has one
    #[must_use]
    pub fn lookup(&self, path: &str, scope: &ScopeStack) -> Option<&Symbol> {
        self.candidates(path, scope)
            .first()
            .and_then(|&id| self.get(id))
    }

    /// Every match at the innermost scope level that has any
    ///
    /// `path` is `a::b::c`; a leading `::` restricts lookup to the global
    /// scope. Matches are ordered local before external, then by kind rank,
    /// then by insertion order.
    #[must_use]
    pub fn candidates(&self, path: &str, scope: &ScopeStack) -> Vec<SymbolId> {
        let relative = QualifiedName::parse(path);
        if relative.is_empty() {
            return Vec::new();
        }
        let levels: Vec<QualifiedName> = if path.trim_start().starts_with("::") {
            vec![QualifiedName::global()]
        } else {
            scope.widening().collect()
        };

        for prefix in levels {
            let mut found = self.named(&prefix.join(&relative)).to_vec();
            if found.is_empty() && !prefix.is_global() {
                found = self.in_bases(&prefix, &relative, 0);
            }
            if !found.is_empty() {
                self.order(&mut found);
                return found;
            }
        }
        Vec::new()
    }

    /// Members inherited by the class named `class`
    fn in_bases(
        &self,
        class: &QualifiedName,
        relative: &QualifiedName,
        depth: usize,
    ) -> Vec<SymbolId> {
        if depth >= MAX_BASE_DEPTH {
            return Vec::new();
        }
        let mut found = Vec::new();
        for &id in self.named(class) {
            let Some(symbol) = self.get(id) else { continue };
            if !symbol.kind.is_class_like() {
                continue;
            }
            for &base in &symbol.bases {
                let Some(base_symbol) = self.get(base) else { continue };
                let direct = self.named(&base_symbol.name.join(relative));
                if direct.is_empty() {
                    found.extend(self.in_bases(&base_symbol.name, relative, depth + 1));
                } else {
                    found.extend_from_slice(direct);
                }
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }

    fn order(&self, ids: &mut [SymbolId]) {
        ids.sort_by_key(|&id| {
            let symbol = &self.symbols[id.index()];
            (!symbol.is_local(), symbol.kind.rank(), id)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(name: &str, kind: SymbolKind, page: &str, anchor: &str) -> Symbol {
        Symbol::new(QualifiedName::parse(name), kind, Location::local(page, anchor))
    }

    fn external(name: &str, kind: SymbolKind, url: &str) -> Symbol {
        Symbol::new(
            QualifiedName::parse(name),
            kind,
            Location::External {
                url: url.to_string(),
            },
        )
    }

    fn scope(name: &str) -> ScopeStack {
        ScopeStack::within(&QualifiedName::parse(name))
    }

    #[test]
    fn test_insert_same_location_is_idempotent() {
        let mut table = SymbolTable::new();
        let a = table.insert(local("ns::foo", SymbolKind::Function, "ns.html", "a1")).unwrap();
        let b = table.insert(local("ns::foo", SymbolKind::Function, "ns.html", "a1")).unwrap();
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insert_conflicting_anchor_fails() {
        let mut table = SymbolTable::new();
        table.insert(local("ns::foo", SymbolKind::Variable, "ns.html", "a1")).unwrap();
        let err = table
            .insert(local("ns::foo", SymbolKind::Variable, "ns.html", "a2"))
            .unwrap_err();
        assert_eq!(err.kind, SymbolKind::Variable);
        assert!(err.to_string().contains("ns::foo"));
    }

    #[test]
    fn test_same_name_different_kind_coexists() {
        let mut table = SymbolTable::new();
        table.insert(local("ns::stat", SymbolKind::Struct, "structns_1_1stat.html", "")).unwrap();
        table.insert(local("ns::stat", SymbolKind::Function, "ns.html", "a3")).unwrap();
        assert_eq!(table.named(&QualifiedName::parse("ns::stat")).len(), 2);
        // types rank ahead of functions
        assert_eq!(table.lookup("stat", &scope("ns")).unwrap().kind, SymbolKind::Struct);
    }

    #[test]
    fn test_local_wins_over_external() {
        let mut table = SymbolTable::new();
        table.insert(external("vec", SymbolKind::Class, "https://ext/vec")).unwrap();
        let id = table.insert(local("vec", SymbolKind::Class, "classvec.html", "")).unwrap();
        assert!(table.get(id).unwrap().is_local());

        // and an external import never replaces a local one
        table.insert(external("vec", SymbolKind::Class, "https://ext/other")).unwrap();
        assert!(table.lookup("vec", &ScopeStack::new()).unwrap().is_local());
        assert_eq!(table.compound_for_page("classvec.html"), Some(id));
    }

    #[test]
    fn test_local_preferred_on_tie_between_kinds() {
        let mut table = SymbolTable::new();
        table.insert(external("size", SymbolKind::Typedef, "https://ext/size")).unwrap();
        table.insert(local("size", SymbolKind::Function, "file.html", "a9")).unwrap();
        let found = table.lookup("size", &ScopeStack::new()).unwrap();
        assert!(found.is_local());
    }

    #[test]
    fn test_innermost_scope_wins() {
        let mut table = SymbolTable::new();
        table.insert(local("value", SymbolKind::Variable, "global.html", "g")).unwrap();
        table.insert(local("a::value", SymbolKind::Variable, "a.html", "a")).unwrap();
        table.insert(local("a::b::value", SymbolKind::Variable, "b.html", "b")).unwrap();

        let hit = table.lookup("value", &scope("a::b::c")).unwrap();
        assert_eq!(hit.name.to_string(), "a::b::value");
        let hit = table.lookup("value", &scope("a::x")).unwrap();
        assert_eq!(hit.name.to_string(), "a::value");
        let hit = table.lookup("::value", &scope("a::b")).unwrap();
        assert_eq!(hit.name.to_string(), "value");
    }

    #[test]
    fn test_qualified_lookup_widens() {
        let mut table = SymbolTable::new();
        table.insert(local("a::b::thing", SymbolKind::Class, "classa_1_1b_1_1thing.html", "")).unwrap();
        assert!(table.lookup("b::thing", &scope("a::other")).is_some());
        assert!(table.lookup("b::thing", &ScopeStack::new()).is_none());
        assert!(table.lookup("a::b::thing", &ScopeStack::new()).is_some());
    }

    #[test]
    fn test_lookup_through_base_classes() {
        let mut table = SymbolTable::new();
        let base = table.insert(local("ns::base", SymbolKind::Class, "classns_1_1base.html", "")).unwrap();
        table.insert(local("ns::base::size", SymbolKind::Function, "classns_1_1base.html", "a1")).unwrap();
        let derived = table.insert(local("ns::derived", SymbolKind::Class, "classns_1_1derived.html", "")).unwrap();
        table.set_bases(derived, vec![base]);

        let hit = table.lookup("size", &scope("ns::derived")).unwrap();
        assert_eq!(hit.name.to_string(), "ns::base::size");
    }

    #[test]
    fn test_unresolved_is_none() {
        let table = SymbolTable::new();
        assert!(table.lookup("missing", &scope("a")).is_none());
        assert!(table.lookup("", &scope("a")).is_none());
    }

    #[test]
    fn test_scope_stack_widening() {
        let stack = scope("a::b");
        let levels: Vec<String> = stack.widening().map(|q| q.to_string()).collect();
        assert_eq!(levels, vec!["a::b", "a", ""]);
    }
}
