// types.rs — Semantic type tags shared by both dialects
//
// Normalizes shader spellings (`float3`, `vector<float,3>`, `min16uint2`) and
// host spellings (`DirectX::XMFLOAT3`, `Vector3`, `glm::vec3`, `uint32_t`)
// onto one set of tags, and scores how compatible two tagged fields are.
//
// Preconditions: spellings have modifiers (`const`, `row_major`, ...) removed.
// Postconditions: every spelling maps to some tag; nothing is rejected.
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::Serialize;

use crate::decl::Dialect;

// ── Scalars ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    /// HLSL `bool` and Win32 `BOOL` (4 bytes).
    Bool,
    /// C++ `bool` (1 byte).
    ByteBool,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Half,
    Int,
    Uint,
    Float,
    Int64,
    Uint64,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Bool,
    Signed,
    Unsigned,
    Float,
}

impl ScalarKind {
    pub fn bytes(self) -> u32 {
        match self {
            ScalarKind::ByteBool | ScalarKind::Int8 | ScalarKind::Uint8 => 1,
            ScalarKind::Int16 | ScalarKind::Uint16 | ScalarKind::Half => 2,
            ScalarKind::Bool | ScalarKind::Int | ScalarKind::Uint | ScalarKind::Float => 4,
            ScalarKind::Int64 | ScalarKind::Uint64 | ScalarKind::Double => 8,
        }
    }

    pub fn family(self) -> Family {
        match self {
            ScalarKind::Bool | ScalarKind::ByteBool => Family::Bool,
            ScalarKind::Int8 | ScalarKind::Int16 | ScalarKind::Int | ScalarKind::Int64 => {
                Family::Signed
            }
            ScalarKind::Uint8 | ScalarKind::Uint16 | ScalarKind::Uint | ScalarKind::Uint64 => {
                Family::Unsigned
            }
            ScalarKind::Half | ScalarKind::Float | ScalarKind::Double => Family::Float,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::ByteBool => "bool8",
            ScalarKind::Int8 => "int8",
            ScalarKind::Uint8 => "uint8",
            ScalarKind::Int16 => "int16",
            ScalarKind::Uint16 => "uint16",
            ScalarKind::Half => "half",
            ScalarKind::Int => "int",
            ScalarKind::Uint => "uint",
            ScalarKind::Float => "float",
            ScalarKind::Int64 => "int64",
            ScalarKind::Uint64 => "uint64",
            ScalarKind::Double => "double",
        }
    }
}

// ── Semantic type ───────────────────────────────────────────────────────────

/// Normalized type tag of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "tag", content = "value", rename_all = "snake_case")]
pub enum SemanticType {
    Scalar(ScalarKind),
    Vector(ScalarKind, u8),
    /// Rows, columns as spelled.
    Matrix(ScalarKind, u8, u8),
    /// A user-defined type referenced by name (last path segment).
    Named(String),
    /// A field whose spelling could not be parsed; carries the raw text.
    Unknown(String),
}

impl SemanticType {
    /// Normalize a type spelling in the given dialect.
    ///
    /// Accepts qualified paths (`DirectX::XMFLOAT4X4`), template forms with
    /// comma-separated arguments (`vector<float,3>`) and multi-word builtins
    /// (`unsigned int`).
    pub fn from_spelling(spelling: &str, dialect: Dialect) -> SemanticType {
        let spelling = spelling.trim();
        let (path, args) = match spelling.split_once('<') {
            Some((base, rest)) => (
                base.trim(),
                rest.trim_end_matches('>')
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .collect::<Vec<_>>(),
            ),
            None => (spelling, Vec::new()),
        };
        let base = path.rsplit("::").next().unwrap_or(path).trim();

        if base == "vector" || base == "matrix" {
            return template_numeric(base, &args);
        }

        let parsed = match dialect {
            Dialect::ShaderSide => shader_numeric(base),
            Dialect::HostSide => host_numeric(base).or_else(|| shader_numeric(base)),
        };
        parsed.unwrap_or_else(|| SemanticType::Named(base.to_string()))
    }

    pub fn scalar(&self) -> Option<ScalarKind> {
        match self {
            SemanticType::Scalar(k) | SemanticType::Vector(k, _) | SemanticType::Matrix(k, _, _) => {
                Some(*k)
            }
            _ => None,
        }
    }

    /// Number of scalar components, for numeric tags.
    pub fn components(&self) -> Option<u32> {
        match self {
            SemanticType::Scalar(_) => Some(1),
            SemanticType::Vector(_, n) => Some(u32::from(*n)),
            SemanticType::Matrix(_, r, c) => Some(u32::from(*r) * u32::from(*c)),
            _ => None,
        }
    }

    /// Byte-size class: component count times scalar size, without any
    /// register packing. `None` for named and unknown types.
    pub fn byte_size(&self) -> Option<u32> {
        Some(self.scalar()?.bytes() * self.components()?)
    }

    pub fn is_named(&self) -> bool {
        matches!(self, SemanticType::Named(_))
    }

    pub fn named(&self) -> Option<&str> {
        match self {
            SemanticType::Named(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticType::Scalar(k) => write!(f, "{}", k.name()),
            SemanticType::Vector(k, n) => write!(f, "{}{}", k.name(), n),
            SemanticType::Matrix(k, r, c) => write!(f, "{}{}x{}", k.name(), r, c),
            SemanticType::Named(n) => write!(f, "{}", n),
            SemanticType::Unknown(raw) => write!(f, "?{}", raw),
        }
    }
}

// ── Spelling tables ─────────────────────────────────────────────────────────

/// Shader scalar base names, longest first so `uint16_t` wins over `uint`.
const SHADER_SCALARS: &[(&str, ScalarKind)] = &[
    ("min16float", ScalarKind::Half),
    ("min10float", ScalarKind::Half),
    ("float16_t", ScalarKind::Half),
    ("float32_t", ScalarKind::Float),
    ("float64_t", ScalarKind::Double),
    ("min16uint", ScalarKind::Uint16),
    ("min16int", ScalarKind::Int16),
    ("min12int", ScalarKind::Int16),
    ("uint16_t", ScalarKind::Uint16),
    ("uint32_t", ScalarKind::Uint),
    ("uint64_t", ScalarKind::Uint64),
    ("int16_t", ScalarKind::Int16),
    ("int32_t", ScalarKind::Int),
    ("int64_t", ScalarKind::Int64),
    ("double", ScalarKind::Double),
    ("float", ScalarKind::Float),
    ("dword", ScalarKind::Uint),
    ("half", ScalarKind::Half),
    ("uint", ScalarKind::Uint),
    ("bool", ScalarKind::Bool),
    ("int", ScalarKind::Int),
];

fn scalar_by_name(name: &str) -> Option<ScalarKind> {
    SHADER_SCALARS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, k)| *k)
}

/// `<scalar>`, `<scalar>N` or `<scalar>RxC` (e.g. `float4x4`).
fn shader_numeric(base: &str) -> Option<SemanticType> {
    let lower = base.to_ascii_lowercase();
    let (name, kind) = SHADER_SCALARS
        .iter()
        .find(|(n, _)| lower.starts_with(n))?;
    dims_suffix(*kind, &lower[name.len()..])
}

fn dims_suffix(kind: ScalarKind, suffix: &str) -> Option<SemanticType> {
    let dim = |s: &str| s.parse::<u8>().ok().filter(|n| (1..=4).contains(n));
    if suffix.is_empty() {
        return Some(SemanticType::Scalar(kind));
    }
    match suffix.split_once('x') {
        Some((r, c)) => Some(SemanticType::Matrix(kind, dim(r)?, dim(c)?)),
        None => Some(SemanticType::Vector(kind, dim(suffix)?)),
    }
}

/// `vector<float,3>`, `matrix<float,4,4>`; bare `vector`/`matrix` default to
/// four floats per row.
fn template_numeric(base: &str, args: &[&str]) -> SemanticType {
    let kind = args
        .first()
        .and_then(|a| scalar_by_name(&a.to_ascii_lowercase()))
        .unwrap_or(ScalarKind::Float);
    let n = |i: usize| {
        args.get(i)
            .and_then(|a| a.parse::<u8>().ok())
            .filter(|n| (1..=4).contains(n))
            .unwrap_or(4)
    };
    if base == "vector" {
        SemanticType::Vector(kind, n(1))
    } else {
        SemanticType::Matrix(kind, n(1), n(2))
    }
}

fn host_numeric(base: &str) -> Option<SemanticType> {
    use ScalarKind::*;
    let scalar = match base {
        "bool" => Some(ByteBool),
        "BOOL" => Some(Bool),
        "char" | "signed char" | "int8_t" | "INT8" => Some(Int8),
        "unsigned char" | "uint8_t" | "UINT8" | "BYTE" => Some(Uint8),
        "short" | "signed short" | "int16_t" | "INT16" | "SHORT" => Some(Int16),
        "unsigned short" | "uint16_t" | "UINT16" | "WORD" | "USHORT" => Some(Uint16),
        "int" | "signed" | "signed int" | "int32_t" | "INT" | "INT32" | "long" | "LONG" => {
            Some(Int)
        }
        "unsigned" | "unsigned int" | "uint32_t" | "UINT" | "UINT32" | "DWORD" | "ULONG"
        | "unsigned long" | "uint" => Some(Uint),
        "long long" | "int64_t" | "INT64" | "LONGLONG" => Some(Int64),
        "unsigned long long" | "uint64_t" | "UINT64" | "ULONGLONG" | "size_t" => Some(Uint64),
        "float" | "FLOAT" => Some(Float),
        "double" => Some(Double),
        _ => None,
    };
    if let Some(k) = scalar {
        return Some(SemanticType::Scalar(k));
    }

    let fixed = match base {
        "XMVECTOR" | "Vector4" | "Color" | "Quaternion" | "Plane" | "NiColorA" => {
            Some(SemanticType::Vector(Float, 4))
        }
        "Vector3" | "NiPoint3" | "NiColor" => Some(SemanticType::Vector(Float, 3)),
        "Vector2" | "NiPoint2" => Some(SemanticType::Vector(Float, 2)),
        "XMMATRIX" | "Matrix" => Some(SemanticType::Matrix(Float, 4, 4)),
        "NiMatrix3" => Some(SemanticType::Matrix(Float, 3, 3)),
        _ => None,
    };
    fixed.or_else(|| directxmath(base)).or_else(|| glm(base))
}

/// `XMFLOAT3`, `XMFLOAT4A`, `XMFLOAT3X4`, `XMINT2`, `XMUINT4`.
fn directxmath(base: &str) -> Option<SemanticType> {
    let rest = base.strip_prefix("XM")?;
    let rest = rest.strip_suffix('A').unwrap_or(rest);
    let (kind, dims) = if let Some(d) = rest.strip_prefix("FLOAT") {
        (ScalarKind::Float, d)
    } else if let Some(d) = rest.strip_prefix("UINT") {
        (ScalarKind::Uint, d)
    } else if let Some(d) = rest.strip_prefix("INT") {
        (ScalarKind::Int, d)
    } else {
        return None;
    };
    if dims.is_empty() {
        return None;
    }
    dims_suffix(kind, &dims.to_ascii_lowercase())
}

/// `vec3`, `ivec2`, `uvec4`, `dvec3`, `mat4`, `mat3x4`.
fn glm(base: &str) -> Option<SemanticType> {
    let prefixes = [
        ("dvec", ScalarKind::Double),
        ("ivec", ScalarKind::Int),
        ("uvec", ScalarKind::Uint),
        ("vec", ScalarKind::Float),
    ];
    for (prefix, kind) in prefixes {
        if let Some(n) = base.strip_prefix(prefix) {
            return match dims_suffix(kind, n)? {
                v @ SemanticType::Vector(..) => Some(v),
                _ => None,
            };
        }
    }
    let dims = base.strip_prefix("mat")?;
    match dims_suffix(ScalarKind::Float, dims)? {
        SemanticType::Vector(k, n) => Some(SemanticType::Matrix(k, n, n)),
        m @ SemanticType::Matrix(..) => Some(m),
        SemanticType::Scalar(_) | SemanticType::Named(_) | SemanticType::Unknown(_) => None,
    }
}

// ── Compatibility ───────────────────────────────────────────────────────────

/// Normalized type name for named-type comparison across dialects.
pub fn normalize_type_name(name: &str) -> String {
    name.rsplit("::")
        .next()
        .unwrap_or(name)
        .trim()
        .to_ascii_lowercase()
}

fn dims_product(dims: &[u32]) -> u32 {
    dims.iter().product()
}

/// Score how compatible two fields' types are, in [0, 1].
///
/// - 1.0: same scalar family and size, same total component count after
///   arrays (so `float3` matches `float[3]` and `XMFLOAT4X4` matches
///   `float4 m[4]`), or the same named type with the same array shape.
/// - 0.75: same total bytes across integer/bool families (`uint` vs `int`).
/// - 0.5: same total bytes otherwise (`float` vs `uint` bit reinterpretation).
/// - 0.0: anything else.
pub fn compatibility(a: &SemanticType, a_dims: &[u32], b: &SemanticType, b_dims: &[u32]) -> f64 {
    match (a, b) {
        (SemanticType::Named(x), SemanticType::Named(y)) => {
            let same = normalize_type_name(x) == normalize_type_name(y)
                && dims_product(a_dims) == dims_product(b_dims);
            if same {
                1.0
            } else {
                0.0
            }
        }
        (SemanticType::Unknown(x), SemanticType::Unknown(y)) => {
            if x == y && a_dims == b_dims {
                1.0
            } else {
                0.0
            }
        }
        _ => numeric_compatibility(a, a_dims, b, b_dims),
    }
}

fn numeric_compatibility(
    a: &SemanticType,
    a_dims: &[u32],
    b: &SemanticType,
    b_dims: &[u32],
) -> f64 {
    let (Some(ka), Some(kb)) = (a.scalar(), b.scalar()) else {
        return 0.0;
    };
    let (Some(ca), Some(cb)) = (a.components(), b.components()) else {
        return 0.0;
    };
    let total_a = ca * dims_product(a_dims);
    let total_b = cb * dims_product(b_dims);

    if ka.family() == kb.family() && ka.bytes() == kb.bytes() && total_a == total_b {
        return 1.0;
    }
    if ka.bytes() * total_a != kb.bytes() * total_b {
        return 0.0;
    }
    match (ka.family(), kb.family()) {
        (Family::Float, _) | (_, Family::Float) => 0.5,
        _ => 0.75,
    }
}
