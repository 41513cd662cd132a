//! Symbol table: a chain of lexical scopes consulted by the TAC
//! generator for name resolution and static type tracking.
//!
//! Variables live in whichever scope declared them and die when that
//! scope is popped. Functions live only in the global scope, are created
//! once, and cannot be redefined. A name can never denote both a
//! variable and a function across overlapping scopes.

use crate::compiler::ast::Type;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Write-once binding (`fixed` declaration). Meaningful for
    /// variables only.
    pub fixed: bool,
    /// Inferred static type, refined on first assignment.
    pub ty: Option<Type>,
    /// Scope depth at declaration; 0 is global.
    pub depth: usize,
    /// Ordered parameter names. Functions only.
    pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("redeclaration of '{0}' in the same scope")]
    Redeclared(String),
    #[error("function '{0}' is already defined")]
    Redefined(String),
    #[error("'{0}' already names a function")]
    ShadowsFunction(String),
    #[error("'{0}' already names a variable")]
    ShadowsVariable(String),
}

#[derive(Debug, Default)]
struct Scope {
    variables: HashMap<String, Symbol>,
}

/// The scope chain. `push_scope` opens a child table on entering a
/// block, loop, function, or case; `pop_scope` discards it and every
/// symbol defined within it.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    functions: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            functions: HashMap::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        // The global scope is never popped.
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn define_variable(
        &mut self,
        name: &str,
        fixed: bool,
        ty: Option<Type>,
    ) -> Result<&Symbol, ScopeError> {
        if self.functions.contains_key(name) {
            return Err(ScopeError::ShadowsFunction(name.to_string()));
        }
        let depth = self.depth();
        let scope = self.scopes.last_mut().expect("scope chain is never empty");
        if scope.variables.contains_key(name) {
            return Err(ScopeError::Redeclared(name.to_string()));
        }
        let symbol = Symbol {
            name: name.to_string(),
            kind: SymbolKind::Variable,
            fixed,
            ty,
            depth,
            params: Vec::new(),
        };
        Ok(scope.variables.entry(name.to_string()).or_insert(symbol))
    }

    pub fn define_function(
        &mut self,
        name: &str,
        params: Vec<String>,
    ) -> Result<&Symbol, ScopeError> {
        if self.functions.contains_key(name) {
            return Err(ScopeError::Redefined(name.to_string()));
        }
        if self.lookup_variable(name).is_some() {
            return Err(ScopeError::ShadowsVariable(name.to_string()));
        }
        let symbol = Symbol {
            name: name.to_string(),
            kind: SymbolKind::Function,
            fixed: false,
            ty: None,
            depth: 0,
            params,
        };
        Ok(self.functions.entry(name.to_string()).or_insert(symbol))
    }

    /// Walk the chain innermost-first.
    pub fn lookup_variable(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.variables.get(name))
    }

    pub fn lookup_variable_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.variables.get_mut(name))
    }

    /// Functions are not nested or closed over: global scope only.
    pub fn lookup_function(&self, name: &str) -> Option<&Symbol> {
        self.functions.get(name)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_lookup() {
        let mut table = SymbolTable::new();
        table.define_variable("a", false, Some(Type::Integer)).unwrap();
        let sym = table.lookup_variable("a").unwrap();
        assert_eq!(sym.ty, Some(Type::Integer));
        assert_eq!(sym.depth, 0);
        assert!(!sym.fixed);
    }

    #[test]
    fn test_redeclaration_same_scope_fails() {
        let mut table = SymbolTable::new();
        table.define_variable("a", false, None).unwrap();
        assert_eq!(
            table.define_variable("a", true, None),
            Err(ScopeError::Redeclared("a".into()))
        );
    }

    #[test]
    fn test_shadowing_outer_scope_allowed() {
        let mut table = SymbolTable::new();
        table.define_variable("a", false, Some(Type::Integer)).unwrap();
        table.push_scope();
        table.define_variable("a", false, Some(Type::Text)).unwrap();
        assert_eq!(table.lookup_variable("a").unwrap().ty, Some(Type::Text));
        table.pop_scope();
        assert_eq!(table.lookup_variable("a").unwrap().ty, Some(Type::Integer));
    }

    #[test]
    fn test_pop_discards_symbols() {
        let mut table = SymbolTable::new();
        table.push_scope();
        table.define_variable("local", false, None).unwrap();
        table.pop_scope();
        assert!(table.lookup_variable("local").is_none());
    }

    #[test]
    fn test_function_variable_clash() {
        let mut table = SymbolTable::new();
        table.define_function("f", vec!["x".into()]).unwrap();
        assert_eq!(
            table.define_variable("f", false, None),
            Err(ScopeError::ShadowsFunction("f".into()))
        );
        table.define_variable("g", false, None).unwrap();
        assert_eq!(
            table.define_function("g", vec![]),
            Err(ScopeError::ShadowsVariable("g".into()))
        );
    }

    #[test]
    fn test_function_redefinition_fails() {
        let mut table = SymbolTable::new();
        table.define_function("f", vec![]).unwrap();
        assert_eq!(
            table.define_function("f", vec![]),
            Err(ScopeError::Redefined("f".into()))
        );
    }
}
