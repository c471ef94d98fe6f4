use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

/// An interned name. Two symbols are equal iff they were interned from the
/// same text in the same table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

struct SymbolTableImpl {
    names: Vec<Arc<str>>,
    mappings: AHashMap<Arc<str>, Symbol>,
}

impl SymbolTableImpl {
    fn new() -> Self {
        Self {
            names: Vec::new(),
            mappings: AHashMap::new(),
        }
    }

    fn get_or_add(&mut self, value: &str) -> Symbol {
        if let Some(&symbol) = self.mappings.get(value) {
            return symbol;
        }
        let symbol = Symbol(self.names.len() as u32);
        let interned = Arc::<str>::from(value);
        self.mappings.insert(interned.clone(), symbol);
        self.names.push(interned);
        symbol
    }

    fn name(&self, symbol: Symbol) -> Option<Arc<str>> {
        self.names.get(symbol.index()).cloned()
    }
}

/// Process-wide symbol table. Lookups take the read lock; only the first
/// interning of a name takes the write lock.
pub struct SymbolTable(RwLock<SymbolTableImpl>);

impl SymbolTable {
    pub fn new() -> Self {
        Self(RwLock::new(SymbolTableImpl::new()))
    }

    pub fn intern(&self, value: &str) -> Symbol {
        if let Some(&symbol) = self.0.read().mappings.get(value) {
            return symbol;
        }
        self.0.write().get_or_add(value)
    }

    pub fn lookup(&self, value: &str) -> Option<Symbol> {
        self.0.read().mappings.get(value).copied()
    }

    pub fn name(&self, symbol: Symbol) -> Option<Arc<str>> {
        self.0.read().name(symbol)
    }

    pub fn len(&self) -> usize {
        self.0.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
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
    use std::thread;

    #[test]
    fn interning_is_stable() {
        let table = SymbolTable::new();
        let a = table.intern("foo");
        let b = table.intern("bar");
        assert_ne!(a, b);
        assert_eq!(table.intern("foo"), a);
        assert_eq!(table.name(a).as_deref(), Some("foo"));
        assert_eq!(table.lookup("bar"), Some(b));
        assert_eq!(table.lookup("baz"), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn unknown_symbol_has_no_name() {
        let table = SymbolTable::new();
        assert!(table.name(Symbol(42)).is_none());
    }

    #[test]
    fn concurrent_interning_agrees() {
        let table = Arc::new(SymbolTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                thread::spawn(move || {
                    (0..64)
                        .map(|i| table.intern(&format!("name{i}")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<_> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        for other in &results[1..] {
            assert_eq!(&results[0], other);
        }
        assert_eq!(table.len(), 64);
    }
}
