// Toy Scope Arena
// Scope records addressed by id, with a free list for reuse

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::value::Cell;
use crate::error::{ToyError, ToyResult};

/// Handle to a scope record in a [`ScopeArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Default)]
struct ScopeRecord {
    vars: FxHashMap<Rc<str>, Cell>,
    parent: Option<ScopeId>,
}

/// Owns every scope record. Released slots are recycled.
#[derive(Debug, Default)]
pub struct ScopeArena {
    records: Vec<Option<ScopeRecord>>,
    free: Vec<usize>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope with no parent
    pub fn root(&mut self) -> ScopeId {
        self.alloc(None)
    }

    /// Create a scope with no parent, pre-populated with `vars`.
    /// A later entry replaces an earlier one of the same name.
    pub fn root_with(&mut self, vars: impl IntoIterator<Item = (Rc<str>, Cell)>) -> ScopeId {
        let id = self.alloc(None);
        if let Some(Some(record)) = self.records.get_mut(id.0) {
            record.vars.extend(vars);
        }
        id
    }

    /// Create a child scope of `parent`
    pub fn push(&mut self, parent: ScopeId) -> ScopeId {
        self.alloc(Some(parent))
    }

    fn alloc(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let record = ScopeRecord {
            vars: FxHashMap::default(),
            parent,
        };
        match self.free.pop() {
            Some(slot) => {
                self.records[slot] = Some(record);
                ScopeId(slot)
            }
            None => {
                self.records.push(Some(record));
                ScopeId(self.records.len() - 1)
            }
        }
    }

    fn record(&self, id: ScopeId) -> ToyResult<&ScopeRecord> {
        self.records
            .get(id.0)
            .and_then(|r| r.as_ref())
            .ok_or_else(|| ToyError::protocol(format!("Scope {} is not live", id.0)))
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.record(id).ok().and_then(|r| r.parent)
    }

    /// Walk the chain from `id` towards the root
    pub fn lookup(&self, id: ScopeId, name: &str) -> Option<Cell> {
        let mut current = Some(id);
        while let Some(scope) = current {
            let record = self.record(scope).ok()?;
            if let Some(cell) = record.vars.get(name) {
                return Some(cell.clone());
            }
            current = record.parent;
        }
        None
    }

    /// Bind `name` in `id` itself. Fails if the name already lives there.
    pub fn define(&mut self, id: ScopeId, name: Rc<str>, cell: Cell) -> ToyResult<()> {
        let record = self
            .records
            .get_mut(id.0)
            .and_then(|r| r.as_mut())
            .ok_or_else(|| ToyError::protocol(format!("Scope {} is not live", id.0)))?;
        if record.vars.contains_key(&name) {
            return Err(ToyError::duplicate(&name));
        }
        record.vars.insert(name, cell);
        Ok(())
    }

    /// Drop one record, returning its parent
    pub fn release(&mut self, id: ScopeId) -> Option<ScopeId> {
        let record = self.records.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        record.parent
    }

    /// Release `from` and its ancestors, stopping before `stop`
    pub fn release_until(&mut self, from: ScopeId, stop: ScopeId) {
        let mut current = Some(from);
        while let Some(scope) = current {
            if scope == stop {
                break;
            }
            current = self.release(scope);
        }
    }

    /// Bindings of one record, sorted by name
    pub fn bindings(&self, id: ScopeId) -> Vec<(Rc<str>, Cell)> {
        let mut vars: Vec<_> = match self.record(id) {
            Ok(record) => record
                .vars
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Err(_) => Vec::new(),
        };
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        vars
    }

    /// Number of live records
    pub fn live(&self) -> usize {
        self.records.len() - self.free.len()
    }
}
