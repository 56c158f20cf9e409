// decl.rs — Declaration data model and the identifier-indexed pool
//
// A `Declaration` is immutable once it enters the `DeclPool`. Composite
// members stay as unresolved names here; `resolve` turns them into
// flattened layouts.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::id::DeclId;
use crate::source::{Location, Span};
use crate::types::SemanticType;

// ── Enumerations ────────────────────────────────────────────────────────────

/// Which extraction grammar produced a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    ShaderSide,
    HostSide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    PlainStruct,
    Buffer,
    CompositeBuffer,
}

const TEXTURE_TYPES: &[&str] = &[
    "Texture1D",
    "Texture1DArray",
    "Texture2D",
    "Texture2DArray",
    "Texture2DMS",
    "Texture2DMSArray",
    "Texture3D",
    "TextureCube",
    "TextureCubeArray",
];

/// GPU resource flavor of a shader-side buffer declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ConstantBuffer,
    TextureBuffer,
    StructuredBuffer,
    RwStructuredBuffer,
    AppendStructuredBuffer,
    ConsumeStructuredBuffer,
    ByteAddressBuffer,
    RwByteAddressBuffer,
    TypedBuffer,
    Texture,
    RwTexture,
    Sampler,
}

impl ResourceKind {
    /// Classify a template-style or plain resource type name.
    pub fn from_type_name(name: &str) -> Option<ResourceKind> {
        let kind = match name {
            "ConstantBuffer" => ResourceKind::ConstantBuffer,
            "StructuredBuffer" => ResourceKind::StructuredBuffer,
            "RWStructuredBuffer" => ResourceKind::RwStructuredBuffer,
            "AppendStructuredBuffer" => ResourceKind::AppendStructuredBuffer,
            "ConsumeStructuredBuffer" => ResourceKind::ConsumeStructuredBuffer,
            "ByteAddressBuffer" => ResourceKind::ByteAddressBuffer,
            "RWByteAddressBuffer" => ResourceKind::RwByteAddressBuffer,
            "Buffer" => ResourceKind::TypedBuffer,
            "RWBuffer" => ResourceKind::TypedBuffer,
            "SamplerState" | "SamplerComparisonState" | "sampler" => ResourceKind::Sampler,
            _ if name
                .strip_prefix("RW")
                .is_some_and(|t| TEXTURE_TYPES.contains(&t)) =>
            {
                ResourceKind::RwTexture
            }
            _ if TEXTURE_TYPES.contains(&name) => ResourceKind::Texture,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether the resource is backed by a declared struct layout that can
    /// be aligned against host code.
    pub fn has_layout(self) -> bool {
        matches!(
            self,
            ResourceKind::ConstantBuffer
                | ResourceKind::TextureBuffer
                | ResourceKind::StructuredBuffer
                | ResourceKind::RwStructuredBuffer
                | ResourceKind::AppendStructuredBuffer
                | ResourceKind::ConsumeStructuredBuffer
        )
    }
}

/// Register class letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RegisterClass {
    #[serde(rename = "t")]
    T,
    #[serde(rename = "b")]
    B,
    #[serde(rename = "u")]
    U,
    #[serde(rename = "s")]
    S,
}

impl RegisterClass {
    pub fn from_letter(c: char) -> Option<RegisterClass> {
        match c.to_ascii_lowercase() {
            't' => Some(RegisterClass::T),
            'b' => Some(RegisterClass::B),
            'u' => Some(RegisterClass::U),
            's' => Some(RegisterClass::S),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            RegisterClass::T => 't',
            RegisterClass::B => 'b',
            RegisterClass::U => 'u',
            RegisterClass::S => 's',
        }
    }

    /// D3D view category, for reports.
    pub fn view(self) -> &'static str {
        match self {
            RegisterClass::T => "SRV",
            RegisterClass::B => "CBV",
            RegisterClass::U => "UAV",
            RegisterClass::S => "Sampler",
        }
    }
}

impl fmt::Display for RegisterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// `register(t3, space1)`; `count` > 1 for resource arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RegisterBinding {
    pub class: RegisterClass,
    pub index: u32,
    pub space: u32,
    pub count: u32,
}

impl fmt::Display for RegisterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class, self.index)?;
        if self.space != 0 {
            write!(f, ", space{}", self.space)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[serde(alias = "vs")]
    Vertex,
    #[serde(alias = "ps")]
    Pixel,
    #[serde(alias = "cs")]
    Compute,
    #[serde(alias = "gs")]
    Geometry,
    #[serde(alias = "hs")]
    Hull,
    #[serde(alias = "ds")]
    Domain,
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vertex" | "vs" | "vshader" => Ok(Stage::Vertex),
            "pixel" | "ps" | "pshader" | "fragment" => Ok(Stage::Pixel),
            "compute" | "cs" | "cshader" => Ok(Stage::Compute),
            "geometry" | "gs" => Ok(Stage::Geometry),
            "hull" | "hs" => Ok(Stage::Hull),
            "domain" | "ds" => Ok(Stage::Domain),
            other => Err(format!("unknown shader stage '{}'", other)),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Vertex => "vertex",
            Stage::Pixel => "pixel",
            Stage::Compute => "compute",
            Stage::Geometry => "geometry",
            Stage::Hull => "hull",
            Stage::Domain => "domain",
        };
        f.write_str(s)
    }
}

// ── Fields ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub ty: SemanticType,
    pub name: String,
    pub array_dims: Vec<u32>,
    /// Byte offset from `packoffset` or a host `offsetof` assertion.
    pub explicit_offset: Option<u32>,
    #[serde(skip)]
    pub span: Span,
    /// Original line the field was declared on.
    pub line: u32,
}

impl Field {
    pub fn is_padding(&self) -> bool {
        is_padding_name(&self.name)
    }
}

/// Padding by naming convention: `pad`, `_pad0`, `padding[3]`, `lightPad`.
pub fn is_padding_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    let base = lower.split('[').next().unwrap_or(&lower);
    let base = base
        .trim_end_matches(|c: char| c.is_ascii_digit() || c == '_')
        .trim_start_matches('_');
    base == "pad"
        || base.starts_with("pad_")
        || base.starts_with("padding")
        || base.ends_with("pad")
        || base.ends_with("padding")
}

// ── Declarations ────────────────────────────────────────────────────────────

/// A declaration as extracted, before it has an id.
#[derive(Debug, Clone)]
pub struct DeclDraft {
    pub dialect: Dialect,
    pub kind: DeclKind,
    pub name: String,
    pub fields: Vec<Field>,
    pub register_binding: Option<RegisterBinding>,
    pub resource: Option<ResourceKind>,
    /// Element struct of `ConstantBuffer<T>` / `StructuredBuffer<T>`.
    pub element_type: Option<String>,
    pub location: Location,
}

impl DeclDraft {
    pub fn into_declaration(self, id: DeclId, unit: PathBuf) -> Declaration {
        let member_refs = if self.kind == DeclKind::CompositeBuffer {
            let mut refs: Vec<String> = Vec::new();
            if let Some(elem) = &self.element_type {
                refs.push(elem.clone());
            }
            for field in &self.fields {
                if let Some(name) = field.ty.named() {
                    if !refs.iter().any(|r| r == name) {
                        refs.push(name.to_string());
                    }
                }
            }
            refs
        } else {
            Vec::new()
        };
        Declaration {
            id,
            dialect: self.dialect,
            kind: self.kind,
            name: self.name,
            fields: self.fields,
            member_refs,
            register_binding: self.register_binding,
            resource: self.resource,
            element_type: self.element_type,
            unit,
            stages: BTreeSet::new(),
            source_file: self.location.file,
            source_line: self.location.line,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Declaration {
    pub id: DeclId,
    pub dialect: Dialect,
    pub kind: DeclKind,
    pub name: String,
    pub fields: Vec<Field>,
    /// Names of other declarations this composite inlines, in order.
    pub member_refs: Vec<String>,
    pub register_binding: Option<RegisterBinding>,
    pub resource: Option<ResourceKind>,
    pub element_type: Option<String>,
    /// Translation unit the declaration was scanned from.
    pub unit: PathBuf,
    /// Stages whose preprocessing pass kept the declaration. Empty on the
    /// host side.
    pub stages: BTreeSet<Stage>,
    pub source_file: PathBuf,
    pub source_line: u32,
}

impl Declaration {
    pub fn location(&self) -> Location {
        Location::new(self.source_file.clone(), self.source_line)
    }
}

/// All declarations of one run, indexed by id, with a per-dialect name index.
#[derive(Debug, Default)]
pub struct DeclPool {
    decls: Vec<Declaration>,
    by_name: HashMap<(Dialect, String), Vec<DeclId>>,
}

impl DeclPool {
    /// Build the pool; `decls[i].id` must equal `DeclId(i)`.
    pub fn new(decls: Vec<Declaration>) -> Self {
        let mut by_name: HashMap<(Dialect, String), Vec<DeclId>> = HashMap::new();
        debug_assert!(decls.iter().enumerate().all(|(i, d)| d.id.index() == i));
        for d in &decls {
            by_name
                .entry((d.dialect, d.name.clone()))
                .or_default()
                .push(d.id);
        }
        DeclPool { decls, by_name }
    }

    pub fn get(&self, id: DeclId) -> &Declaration {
        &self.decls[id.index()]
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.decls.iter()
    }

    pub fn of_dialect(&self, dialect: Dialect) -> impl Iterator<Item = &Declaration> {
        self.decls.iter().filter(move |d| d.dialect == dialect)
    }

    /// Every declaration with this exact name in the dialect, in id order.
    pub fn named(&self, dialect: Dialect, name: &str) -> &[DeclId] {
        self.by_name
            .get(&(dialect, name.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolve a name as seen from `from`: prefer a declaration in the same
    /// source file, then the same translation unit, then the lowest id.
    pub fn lookup(&self, from: &Declaration, name: &str) -> Option<DeclId> {
        let ids = self.named(from.dialect, name);
        ids.iter()
            .copied()
            .find(|id| self.get(*id).source_file == from.source_file)
            .or_else(|| ids.iter().copied().find(|id| self.get(*id).unit == from.unit))
            .or_else(|| ids.first().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarKind;

    fn field(name: &str) -> Field {
        Field {
            ty: SemanticType::Scalar(ScalarKind::Float),
            name: name.to_string(),
            array_dims: Vec::new(),
            explicit_offset: None,
            span: Span::default(),
            line: 1,
        }
    }

    fn draft(name: &str, file: &str, kind: DeclKind, fields: Vec<Field>) -> DeclDraft {
        DeclDraft {
            dialect: Dialect::ShaderSide,
            kind,
            name: name.to_string(),
            fields,
            register_binding: None,
            resource: None,
            element_type: None,
            location: Location::new(file, 1),
        }
    }

    #[test]
    fn padding_names() {
        for name in ["pad", "_pad0", "pad1", "padding", "padding[3]", "lightPad", "_padding"] {
            assert!(is_padding_name(name), "{name}");
        }
        for name in ["paddle", "spread", "position", "Padded"] {
            assert!(!is_padding_name(name), "{name}");
        }
    }

    #[test]
    fn composite_member_refs_follow_field_order() {
        let mut a = field("light");
        a.ty = SemanticType::Named("Light".into());
        let mut b = field("shadow");
        b.ty = SemanticType::Named("Shadow".into());
        let mut c = field("light2");
        c.ty = SemanticType::Named("Light".into());
        let d = draft("PerFrame", "a.hlsl", DeclKind::CompositeBuffer, vec![a, b, c])
            .into_declaration(DeclId(0), PathBuf::from("a.hlsl"));
        assert_eq!(d.member_refs, vec!["Light", "Shadow"]);
    }

    #[test]
    fn lookup_prefers_same_file() {
        let decls = vec![
            draft("Light", "x.hlsli", DeclKind::PlainStruct, vec![field("a")])
                .into_declaration(DeclId(0), PathBuf::from("x.hlsl")),
            draft("Light", "y.hlsli", DeclKind::PlainStruct, vec![field("a")])
                .into_declaration(DeclId(1), PathBuf::from("y.hlsl")),
            draft("User", "y.hlsli", DeclKind::PlainStruct, vec![field("a")])
                .into_declaration(DeclId(2), PathBuf::from("y.hlsl")),
        ];
        let pool = DeclPool::new(decls);
        let user = pool.get(DeclId(2));
        assert_eq!(pool.lookup(user, "Light"), Some(DeclId(1)));
        assert_eq!(pool.lookup(user, "Missing"), None);
        assert_eq!(pool.named(Dialect::ShaderSide, "Light").len(), 2);
    }

    #[test]
    fn stage_from_str() {
        assert_eq!("PS".parse::<Stage>(), Ok(Stage::Pixel));
        assert_eq!("vertex".parse::<Stage>(), Ok(Stage::Vertex));
        assert!("tess".parse::<Stage>().is_err());
    }

    #[test]
    fn binding_display() {
        let b = RegisterBinding {
            class: RegisterClass::T,
            index: 3,
            space: 1,
            count: 1,
        };
        assert_eq!(b.to_string(), "t3, space1");
    }
}
