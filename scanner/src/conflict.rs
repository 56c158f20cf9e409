// conflict.rs — Register conflict detection
//
// Walks the registry slot by slot. Uses whose declarations share a lineage
// (same original declaration, or the same confidently matched host struct)
// are one logical binding. A slot is a conflict when it holds more than one
// lineage and their layout fingerprints differ.
//
// Preconditions: the registry was built from the same pool; `confident`
//                maps shader ids to their confidently matched host ids.
// Postconditions: output is sorted by slot; each conflict lists every use
//                 in the slot; the function is pure, so repeated runs over
//                 the same registry yield identical results.
// Failure modes: none.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::aggregate::{RegisterKey, RegisterUse, Registry};
use crate::decl::{DeclPool, Stage};
use crate::diag::DiagLevel;
use crate::id::DeclId;
use crate::resolve::Resolution;
use crate::types::normalize_type_name;

/// Logical identity of a declaration for conflict purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Lineage {
    /// Confidently matched to this host declaration.
    Host { host: DeclId },
    /// Unmatched: identified by where it was written.
    Origin {
        file: PathBuf,
        line: u32,
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub key: RegisterKey,
    pub uses: Vec<RegisterUse>,
    pub severity: DiagLevel,
}

pub struct Detector<'a> {
    pool: &'a DeclPool,
    resolution: &'a Resolution,
    confident: &'a HashMap<DeclId, DeclId>,
}

impl<'a> Detector<'a> {
    pub fn new(
        pool: &'a DeclPool,
        resolution: &'a Resolution,
        confident: &'a HashMap<DeclId, DeclId>,
    ) -> Self {
        Detector {
            pool,
            resolution,
            confident,
        }
    }

    pub fn lineage(&self, id: DeclId) -> Lineage {
        if let Some(host) = self.confident.get(&id) {
            return Lineage::Host { host: *host };
        }
        let decl = self.pool.get(id);
        Lineage::Origin {
            file: decl.source_file.clone(),
            line: decl.source_line,
            name: decl.name.clone(),
        }
    }

    /// SHA-256 over the normalized name, resource kind, element type and
    /// flattened field types. Equal fingerprints mean verified compatible.
    pub fn fingerprint(&self, id: DeclId) -> String {
        let decl = self.pool.get(id);
        let mut hasher = Sha256::new();
        hasher.update(normalize_type_name(&decl.name).as_bytes());
        hasher.update(b"\0");
        hasher.update(format!("{:?}", decl.resource).as_bytes());
        hasher.update(b"\0");
        if let Some(elem) = &decl.element_type {
            hasher.update(normalize_type_name(elem).as_bytes());
        }
        hasher.update(b"\0");
        match self.resolution.layout(id) {
            Some(fields) => {
                for f in fields {
                    hasher.update(format!("{}{:?};", f.ty, f.array_dims).as_bytes());
                }
            }
            None => {
                for f in &decl.fields {
                    hasher.update(format!("{}{:?};", f.ty, f.array_dims).as_bytes());
                }
            }
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    fn slot_conflict(&self, key: RegisterKey, uses: &BTreeSet<RegisterUse>) -> Option<Conflict> {
        let mut lineages: BTreeSet<Lineage> = BTreeSet::new();
        let mut prints: BTreeMap<DeclId, String> = BTreeMap::new();
        for u in uses {
            lineages.insert(self.lineage(u.declaration_id));
            prints
                .entry(u.declaration_id)
                .or_insert_with(|| self.fingerprint(u.declaration_id));
        }
        if lineages.len() < 2 {
            return None;
        }
        let distinct: BTreeSet<&String> = prints.values().collect();
        if distinct.len() < 2 {
            return None;
        }

        // Incompatible uses live in the same stage: Error.
        let mut by_stage: BTreeMap<Stage, BTreeSet<&String>> = BTreeMap::new();
        for u in uses {
            if let Some(p) = prints.get(&u.declaration_id) {
                by_stage.entry(u.stage).or_default().insert(p);
            }
        }
        let severity = if by_stage.values().any(|p| p.len() > 1) {
            DiagLevel::Error
        } else {
            DiagLevel::Warning
        };

        Some(Conflict {
            key,
            uses: uses.iter().cloned().collect(),
            severity,
        })
    }

    pub fn detect(&self, registry: &Registry) -> Vec<Conflict> {
        registry
            .slots()
            .filter_map(|(key, uses)| self.slot_conflict(*key, uses))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::{DeclDraft, DeclKind, Declaration, Dialect, Field, RegisterBinding, RegisterClass};
    use crate::resolve::resolve;
    use crate::source::{Location, Span};
    use crate::types::{ScalarKind, SemanticType};

    fn cbuffer(id: u32, name: &str, file: &str, line: u32, fields: &[ScalarKind]) -> Declaration {
        DeclDraft {
            dialect: Dialect::ShaderSide,
            kind: DeclKind::Buffer,
            name: name.to_string(),
            fields: fields
                .iter()
                .enumerate()
                .map(|(i, k)| Field {
                    ty: SemanticType::Scalar(*k),
                    name: format!("f{}", i),
                    array_dims: Vec::new(),
                    explicit_offset: None,
                    span: Span::default(),
                    line,
                })
                .collect(),
            register_binding: Some(RegisterBinding {
                class: RegisterClass::B,
                index: 2,
                space: 0,
                count: 1,
            }),
            resource: None,
            element_type: None,
            location: Location::new(file, line),
        }
        .into_declaration(DeclId(id), PathBuf::from(file))
    }

    fn use_of(id: u32, feature: &str, stage: Stage) -> RegisterUse {
        RegisterUse {
            register_type: RegisterClass::B,
            index: 2,
            space: 0,
            feature: feature.to_string(),
            stage,
            declaration_id: DeclId(id),
        }
    }

    fn run(pool: &DeclPool, uses: Vec<RegisterUse>, confident: &HashMap<DeclId, DeclId>) -> Vec<Conflict> {
        let resolution = resolve(pool);
        let registry: Registry = uses.into_iter().collect();
        Detector::new(pool, &resolution, confident).detect(&registry)
    }

    #[test]
    fn unrelated_layouts_conflict() {
        let pool = DeclPool::new(vec![
            cbuffer(0, "GrassCB", "grass.hlsl", 3, &[ScalarKind::Float]),
            cbuffer(1, "WaterCB", "water.hlsl", 7, &[ScalarKind::Uint, ScalarKind::Uint]),
        ]);
        let conflicts = run(
            &pool,
            vec![use_of(0, "Grass", Stage::Pixel), use_of(1, "Water", Stage::Pixel)],
            &HashMap::new(),
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].uses.len(), 2);
        assert_eq!(conflicts[0].severity, DiagLevel::Error);
    }

    #[test]
    fn disjoint_stages_downgrade_to_warning() {
        let pool = DeclPool::new(vec![
            cbuffer(0, "GrassCB", "grass.hlsl", 3, &[ScalarKind::Float]),
            cbuffer(1, "WaterCB", "water.hlsl", 7, &[ScalarKind::Uint]),
        ]);
        let conflicts = run(
            &pool,
            vec![use_of(0, "Grass", Stage::Vertex), use_of(1, "Water", Stage::Pixel)],
            &HashMap::new(),
        );
        assert_eq!(conflicts[0].severity, DiagLevel::Warning);
    }

    #[test]
    fn same_declaration_across_stages_is_fine() {
        let pool = DeclPool::new(vec![cbuffer(0, "PerFrame", "common.hlsli", 1, &[ScalarKind::Float])]);
        let conflicts = run(
            &pool,
            vec![use_of(0, "Grass", Stage::Vertex), use_of(0, "Grass", Stage::Pixel)],
            &HashMap::new(),
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn shared_header_copies_share_lineage() {
        // The same header declaration scanned through two units.
        let pool = DeclPool::new(vec![
            cbuffer(0, "PerFrame", "common.hlsli", 4, &[ScalarKind::Float]),
            cbuffer(1, "PerFrame", "common.hlsli", 4, &[ScalarKind::Float]),
        ]);
        let conflicts = run(
            &pool,
            vec![use_of(0, "Grass", Stage::Pixel), use_of(1, "Water", Stage::Pixel)],
            &HashMap::new(),
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn same_host_match_shares_lineage() {
        let pool = DeclPool::new(vec![
            cbuffer(0, "GrassCB", "grass.hlsl", 3, &[ScalarKind::Float]),
            cbuffer(1, "WaterCB", "water.hlsl", 7, &[ScalarKind::Uint]),
        ]);
        let confident = HashMap::from([(DeclId(0), DeclId(9)), (DeclId(1), DeclId(9))]);
        let conflicts = run(
            &pool,
            vec![use_of(0, "Grass", Stage::Pixel), use_of(1, "Water", Stage::Pixel)],
            &confident,
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn identical_layouts_are_compatible() {
        let pool = DeclPool::new(vec![
            cbuffer(0, "Shared", "a.hlsl", 3, &[ScalarKind::Float]),
            cbuffer(1, "Shared", "b.hlsl", 9, &[ScalarKind::Float]),
        ]);
        let conflicts = run(
            &pool,
            vec![use_of(0, "A", Stage::Pixel), use_of(1, "B", Stage::Pixel)],
            &HashMap::new(),
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let pool = DeclPool::new(vec![cbuffer(0, "A", "a.hlsl", 1, &[ScalarKind::Float])]);
        let resolution = resolve(&pool);
        let confident = HashMap::new();
        let fp = Detector::new(&pool, &resolution, &confident).fingerprint(DeclId(0));
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
