// id.rs — Stable identifiers for declarations in the analysis pool
//
// IDs are allocated after the parallel scan, in (dialect, file path, source
// order), so the same inputs always produce the same numbering regardless of
// which worker finished first.

use serde::Serialize;

/// Stable identifier for a declaration in a `DeclPool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeclId(pub u32);

impl DeclId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for DeclId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allocator for stable IDs. Produces monotonically increasing IDs in
/// allocation order.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_decl: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_decl(&mut self) -> DeclId {
        let id = DeclId(self.next_decl);
        self.next_decl += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.alloc_decl(), DeclId(0));
        assert_eq!(ids.alloc_decl(), DeclId(1));
        assert_eq!(ids.alloc_decl().index(), 2);
    }
}
