// aggregate.rs — Register-use aggregation
//
// Expands entry points (feature, stage, referenced declarations) into one
// `RegisterUse` per bound declaration, per register slot it occupies, and
// files them in a registry keyed by (class, index, space).
//
// Preconditions: the pool is complete.
// Postconditions: only shader-side buffers with a register binding produce
//                 uses; a resource array bound at `tN` with count K
//                 occupies N..N+K, stopping at the last u32 index.
//                 Registry iteration order is sorted.
// Failure modes: entry points naming unknown declarations emit W0400 and
//                contribute nothing for that name. Without entry points,
//                each declaration's own stage set decides liveness.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decl::{DeclKind, DeclPool, Declaration, Dialect, RegisterClass, Stage};
use crate::diag::{codes, DiagKind, Diagnostic};
use crate::id::DeclId;

/// One compiled shader entry, as supplied by an entry-point enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub feature: String,
    pub stage: Stage,
    /// Restrict name lookups to declarations scanned from this unit.
    #[serde(default)]
    pub unit: Option<PathBuf>,
    /// Names of the register-bearing declarations the entry references.
    pub declarations: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RegisterUse {
    pub register_type: RegisterClass,
    pub index: u32,
    pub space: u32,
    pub feature: String,
    pub stage: Stage,
    pub declaration_id: DeclId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RegisterKey {
    pub register_type: RegisterClass,
    pub index: u32,
    pub space: u32,
}

/// Register uses grouped by slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    slots: BTreeMap<RegisterKey, BTreeSet<RegisterUse>>,
}

impl Registry {
    pub fn insert(&mut self, register_use: RegisterUse) {
        let key = RegisterKey {
            register_type: register_use.register_type,
            index: register_use.index,
            space: register_use.space,
        };
        self.slots.entry(key).or_default().insert(register_use);
    }

    pub fn slots(&self) -> impl Iterator<Item = (&RegisterKey, &BTreeSet<RegisterUse>)> {
        self.slots.iter()
    }

    pub fn uses(&self) -> impl Iterator<Item = &RegisterUse> {
        self.slots.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.slots.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl FromIterator<RegisterUse> for Registry {
    fn from_iter<T: IntoIterator<Item = RegisterUse>>(iter: T) -> Self {
        let mut registry = Registry::default();
        for u in iter {
            registry.insert(u);
        }
        registry
    }
}

#[derive(Debug, Default)]
pub struct Aggregation {
    pub registry: Registry,
    pub diagnostics: Vec<Diagnostic>,
}

fn is_bound_buffer(decl: &Declaration) -> bool {
    decl.dialect == Dialect::ShaderSide
        && matches!(decl.kind, DeclKind::Buffer | DeclKind::CompositeBuffer)
        && decl.register_binding.is_some()
}

pub fn aggregate(pool: &DeclPool, entries: &[EntryPoint]) -> Aggregation {
    let mut out = Aggregation::default();
    for entry in entries {
        for name in &entry.declarations {
            let all = pool.named(Dialect::ShaderSide, name);
            let scoped: Vec<DeclId> = match &entry.unit {
                Some(unit) => all
                    .iter()
                    .copied()
                    .filter(|id| pool.get(*id).unit == *unit)
                    .collect(),
                None => all.to_vec(),
            };
            if scoped.is_empty() {
                let scope = entry
                    .unit
                    .as_ref()
                    .map(|u| format!(" in {}", u.display()))
                    .unwrap_or_default();
                out.diagnostics.push(
                    Diagnostic::warning(
                        DiagKind::UnknownEntryReference,
                        format!(
                            "entry point {}/{} references unknown declaration '{}'{}",
                            entry.feature, entry.stage, name, scope
                        ),
                    )
                    .with_code(codes::UNKNOWN_ENTRY_REFERENCE),
                );
                continue;
            }
            for id in scoped {
                let decl = pool.get(id);
                if !is_bound_buffer(decl) {
                    debug!("{} has no register binding; no register use", decl.name);
                    continue;
                }
                add_uses(&mut out.registry, decl, &entry.feature, entry.stage);
            }
        }
    }
    out
}

fn add_uses(registry: &mut Registry, decl: &Declaration, feature: &str, stage: Stage) {
    let Some(binding) = decl.register_binding else {
        return;
    };
    let slots = (0..binding.count.max(1)).map_while(|slot| binding.index.checked_add(slot));
    for index in slots {
        registry.insert(RegisterUse {
            register_type: binding.class,
            index,
            space: binding.space,
            feature: feature.to_string(),
            stage,
            declaration_id: decl.id,
        });
    }
}

/// The feature a shader file belongs to: the directory after a `features`
/// path component, else the file stem.
pub fn feature_for_path(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts
        .iter()
        .position(|p| p.eq_ignore_ascii_case("features"))
        .filter(|i| i + 2 < parts.len())
        .map(|i| parts[i + 1].clone())
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_default()
}

/// Register uses without enumerator data: every bound shader buffer is live
/// in each stage whose preprocessing pass kept it, under the feature of the
/// unit it was scanned from.
pub fn aggregate_implicit(pool: &DeclPool) -> Aggregation {
    let mut out = Aggregation::default();
    for decl in pool.of_dialect(Dialect::ShaderSide).filter(|d| is_bound_buffer(d)) {
        if decl.stages.is_empty() {
            debug!("{} is live in no stage; no register use", decl.name);
            continue;
        }
        let feature = feature_for_path(&decl.unit);
        for stage in &decl.stages {
            add_uses(&mut out.registry, decl, &feature, *stage);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::{DeclDraft, RegisterBinding};
    use crate::source::Location;

    fn buffer(id: u32, name: &str, unit: &str, class: RegisterClass, index: u32, count: u32) -> Declaration {
        DeclDraft {
            dialect: Dialect::ShaderSide,
            kind: DeclKind::Buffer,
            name: name.to_string(),
            fields: Vec::new(),
            register_binding: Some(RegisterBinding {
                class,
                index,
                space: 0,
                count,
            }),
            resource: None,
            element_type: None,
            location: Location::new(unit, 1),
        }
        .into_declaration(DeclId(id), PathBuf::from(unit))
    }

    fn entry(feature: &str, stage: Stage, names: &[&str]) -> EntryPoint {
        EntryPoint {
            feature: feature.to_string(),
            stage,
            unit: None,
            declarations: names.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn one_use_per_feature_and_stage() {
        let pool = DeclPool::new(vec![buffer(0, "GrassTex", "a.hlsl", RegisterClass::T, 3, 1)]);
        let agg = aggregate(
            &pool,
            &[
                entry("Grass", Stage::Vertex, &["GrassTex"]),
                entry("Grass", Stage::Pixel, &["GrassTex"]),
            ],
        );
        assert!(agg.diagnostics.is_empty());
        assert_eq!(agg.registry.len(), 2);
        let (key, uses) = agg.registry.slots().next().unwrap();
        assert_eq!(key.index, 3);
        assert_eq!(uses.len(), 2);
    }

    #[test]
    fn resource_arrays_occupy_consecutive_slots() {
        let pool = DeclPool::new(vec![buffer(0, "Shadows", "a.hlsl", RegisterClass::T, 4, 3)]);
        let agg = aggregate(&pool, &[entry("Shadow", Stage::Pixel, &["Shadows"])]);
        let indices: Vec<u32> = agg.registry.uses().map(|u| u.index).collect();
        assert_eq!(indices, vec![4, 5, 6]);
    }

    #[test]
    fn slots_past_the_last_index_are_dropped() {
        let pool = DeclPool::new(vec![buffer(0, "Tail", "a.hlsl", RegisterClass::T, u32::MAX - 1, 4)]);
        let agg = aggregate(&pool, &[entry("Edge", Stage::Pixel, &["Tail"])]);
        let indices: Vec<u32> = agg.registry.uses().map(|u| u.index).collect();
        assert_eq!(indices, vec![u32::MAX - 1, u32::MAX]);
    }

    #[test]
    fn unknown_reference_warns() {
        let pool = DeclPool::new(vec![buffer(0, "A", "a.hlsl", RegisterClass::B, 0, 1)]);
        let agg = aggregate(&pool, &[entry("Water", Stage::Pixel, &["Missing", "A"])]);
        assert_eq!(agg.registry.len(), 1);
        assert_eq!(agg.diagnostics.len(), 1);
        assert_eq!(agg.diagnostics[0].code, Some(codes::UNKNOWN_ENTRY_REFERENCE));
        assert!(agg.diagnostics[0].message.contains("Water/pixel"));
    }

    #[test]
    fn unit_scope_restricts_lookup() {
        let pool = DeclPool::new(vec![
            buffer(0, "PerFrame", "a.hlsl", RegisterClass::B, 0, 1),
            buffer(1, "PerFrame", "b.hlsl", RegisterClass::B, 0, 1),
        ]);
        let mut e = entry("A", Stage::Pixel, &["PerFrame"]);
        e.unit = Some(PathBuf::from("b.hlsl"));
        let agg = aggregate(&pool, &[e]);
        let ids: Vec<DeclId> = agg.registry.uses().map(|u| u.declaration_id).collect();
        assert_eq!(ids, vec![DeclId(1)]);
    }

    #[test]
    fn feature_from_path() {
        assert_eq!(
            feature_for_path(Path::new("package/Shaders/Features/Grass/Grass.hlsl")),
            "Grass"
        );
        assert_eq!(feature_for_path(Path::new("shaders/Water.hlsl")), "Water");
    }

    #[test]
    fn implicit_uses_follow_declaration_stages() {
        let mut grass = buffer(0, "GrassTex", "Features/Grass/Grass.hlsl", RegisterClass::T, 3, 1);
        grass.stages = [Stage::Vertex, Stage::Pixel].into_iter().collect();
        let mut water = buffer(1, "WaterTex", "Features/Water/Water.hlsl", RegisterClass::T, 3, 1);
        water.stages = [Stage::Pixel].into_iter().collect();
        let unused = buffer(2, "Dead", "Features/Water/Water.hlsl", RegisterClass::T, 9, 1);
        let pool = DeclPool::new(vec![grass, water, unused]);

        let agg = aggregate_implicit(&pool);
        let uses: Vec<(&str, Stage, u32)> = agg
            .registry
            .uses()
            .map(|u| (u.feature.as_str(), u.stage, u.index))
            .collect();
        assert_eq!(
            uses,
            vec![
                ("Grass", Stage::Vertex, 3),
                ("Grass", Stage::Pixel, 3),
                ("Water", Stage::Pixel, 3),
            ]
        );
        assert!(agg.diagnostics.is_empty());
    }

    #[test]
    fn entry_point_json() {
        let e: EntryPoint = serde_json::from_str(
            r#"{ "feature": "Grass", "stage": "ps", "declarations": ["GrassTex"] }"#,
        )
        .unwrap();
        assert_eq!(e.stage, Stage::Pixel);
        assert_eq!(e.unit, None);
    }
}
