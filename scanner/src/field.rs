// field.rs — Field parser for one member declaration
//
// Parses the tokens of a single `;`-terminated member (terminator excluded)
// into one or more `Field`s. Uses chumsky combinators over the shared token
// set, so the same grammar serves both dialects; only type normalization
// differs.
//
// Preconditions: `tokens` come from `lexer::lex()` over `src.text`.
// Postconditions: a segment always yields at least one field. Segments that
//                 do not parse become a single opaque field (type Unknown)
//                 so field positions stay stable.
// Failure modes: unparseable segments produce a W0101 warning.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::decl::{Dialect, Field};
use crate::diag::{codes, DiagKind, Diagnostic};
use crate::lexer::Token;
use crate::source::{ExpandedSource, Span};
use crate::types::SemanticType;

/// Words that qualify a member without changing its layout.
const LEADING_MODIFIERS: &[&str] = &[
    "const",
    "volatile",
    "mutable",
    "constexpr",
    "inline",
    "uniform",
    "row_major",
    "column_major",
    "precise",
    "nointerpolation",
    "noperspective",
    "linear",
    "centroid",
    "globallycoherent",
    "groupshared",
    "snorm",
    "unorm",
];

/// Words that combine into one builtin C/C++ type name.
const BUILTIN_WORDS: &[&str] = &["unsigned", "signed", "long", "short", "int", "char"];

// ── Syntax tree ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct TypeExpr {
    path: Vec<String>,
    args: Vec<TypeArg>,
}

#[derive(Debug, Clone, PartialEq)]
enum TypeArg {
    Type(TypeExpr),
    Int(u64),
}

#[derive(Debug, Clone, PartialEq)]
enum Annotation {
    Offset(u32),
    Other,
}

#[derive(Debug, Clone, PartialEq)]
struct Declarator {
    pointer: bool,
    name: String,
    span: SimpleSpan,
    dims: Vec<u32>,
    annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq)]
struct ParsedSegment {
    ty: TypeExpr,
    declarators: Vec<Declarator>,
}

impl TypeExpr {
    fn spelling(&self) -> String {
        let mut s = self.path.join("::");
        if !self.args.is_empty() {
            let args: Vec<String> = self
                .args
                .iter()
                .map(|a| match a {
                    TypeArg::Type(t) => t.spelling(),
                    TypeArg::Int(n) => n.to_string(),
                })
                .collect();
            s.push('<');
            s.push_str(&args.join(","));
            s.push('>');
        }
        s
    }

    /// `std::array<T, N>` → (`T`, pushes `N`), recursively. `None` when an
    /// `N` does not fit a `u32` dim.
    fn strip_std_array(&self, dims: &mut Vec<u32>) -> Option<TypeExpr> {
        let is_array = match self.path.as_slice() {
            [last] => last == "array",
            [.., ns, last] => ns == "std" && last == "array",
            [] => false,
        };
        if is_array {
            if let [TypeArg::Type(elem), TypeArg::Int(n)] = self.args.as_slice() {
                dims.push(u32::try_from(*n).ok()?);
                return elem.strip_std_array(dims);
            }
        }
        Some(self.clone())
    }
}

/// `packoffset(c3.y)` → 3 * 16 + 1 * 4.
fn packoffset_bytes(register: &str, component: Option<&str>) -> Option<u32> {
    let index: u32 = register.strip_prefix(['c', 'C'])?.parse().ok()?;
    let comp = match component {
        None => 0,
        Some("x") | Some("r") => 0,
        Some("y") | Some("g") => 1,
        Some("z") | Some("b") => 2,
        Some("w") | Some("a") => 3,
        Some(_) => return None,
    };
    index.checked_mul(16)?.checked_add(comp * 4)
}

/// `long long int` → `long long`, `short int` → `short`.
fn join_builtin(words: Vec<String>) -> String {
    let has_size = words.iter().any(|w| w == "long" || w == "short");
    words
        .into_iter()
        .filter(|w| !(has_size && w == "int"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Grammar ─────────────────────────────────────────────────────────────────

fn segment_parser<'tokens, I>(
) -> impl Parser<'tokens, I, ParsedSegment, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let ident = select! { Token::Ident(s) => s };

    // ── Balanced groups (initializers, register(...) bodies) ──

    let balanced = recursive(|bal| {
        let inner = bal.clone().or(none_of([
            Token::LParen,
            Token::RParen,
            Token::LBrace,
            Token::RBrace,
        ])
        .ignored());
        choice((
            inner
                .clone()
                .repeated()
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .ignored(),
            inner
                .repeated()
                .delimited_by(just(Token::LBrace), just(Token::RBrace))
                .ignored(),
        ))
    });

    let paren_group = none_of([Token::RParen])
        .repeated()
        .delimited_by(just(Token::LParen), just(Token::RParen))
        .ignored();

    // ── Modifiers ──

    let leading_modifier = choice((
        select! { Token::Ident(s) if LEADING_MODIFIERS.contains(&s.as_str()) => () },
        just(Token::Alignas).ignore_then(paren_group.clone()),
    ));
    let trailing_modifier =
        select! { Token::Ident(s) if s == "const" || s == "volatile" => () };

    // ── Types ──

    let ty = recursive(|ty| {
        let arg = ty
            .map(TypeArg::Type)
            .or(select! { Token::Int(n) => TypeArg::Int(n) });
        let args = arg
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::Lt), just(Token::Gt));

        let builtin = select! { Token::Ident(s) if BUILTIN_WORDS.contains(&s.as_str()) => s }
            .repeated()
            .at_least(1)
            .collect::<Vec<_>>()
            .map(|words| TypeExpr {
                path: vec![join_builtin(words)],
                args: Vec::new(),
            });

        let path = just(Token::PathSep)
            .or_not()
            .ignore_then(
                ident
                    .clone()
                    .separated_by(just(Token::PathSep))
                    .at_least(1)
                    .collect::<Vec<_>>(),
            );

        let named = just(Token::Struct)
            .or(just(Token::Class))
            .or_not()
            .ignore_then(path)
            .then(args.or_not())
            .map(|(path, args)| TypeExpr {
                path,
                args: args.unwrap_or_default(),
            });

        builtin.or(named)
    });

    // ── Declarators ──

    let dim = select! { Token::Int(n) if n > 0 && n <= u64::from(u32::MAX) => n as u32 }
        .delimited_by(just(Token::LBracket), just(Token::RBracket));

    let packoffset = just(Token::Packoffset)
        .ignore_then(
            ident
                .clone()
                .then(just(Token::Dot).ignore_then(ident).or_not())
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .try_map(|(register, component), span| {
            packoffset_bytes(&register, component.as_deref())
                .map(Annotation::Offset)
                .ok_or_else(|| Rich::custom(span, format!("bad packoffset '{}'", register)))
        });
    let register = just(Token::Register)
        .ignore_then(paren_group)
        .to(Annotation::Other);
    let semantic = select! {
        Token::Ident(_) => Annotation::Other,
        Token::Int(_) => Annotation::Other,
    };
    let annotation = just(Token::Colon).ignore_then(choice((packoffset, register, semantic)));

    let init_token = balanced.clone().or(none_of([
        Token::Comma,
        Token::LParen,
        Token::RParen,
        Token::LBrace,
        Token::RBrace,
    ])
    .ignored());
    let initializer = just(Token::Equals)
        .ignore_then(init_token.repeated().at_least(1))
        .ignored()
        .or(balanced);

    let pointer = just(Token::Star)
        .or(just(Token::Amp))
        .repeated()
        .collect::<Vec<_>>()
        .map(|marks| !marks.is_empty());

    let declarator = pointer
        .then(select! { Token::Ident(s) = e => (s, e.span()) })
        .then(dim.repeated().collect::<Vec<_>>())
        .then(annotation.repeated().collect::<Vec<_>>())
        .then_ignore(initializer.or_not())
        .map(|(((pointer, (name, span)), dims), annotations)| Declarator {
            pointer,
            name,
            span,
            dims,
            annotations,
        });

    leading_modifier
        .repeated()
        .ignore_then(ty)
        .then_ignore(trailing_modifier.repeated())
        .then(
            declarator
                .separated_by(just(Token::Comma))
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .then_ignore(end())
        .map(|(ty, declarators)| ParsedSegment { ty, declarators })
}

// ── Public API ──────────────────────────────────────────────────────────────

/// Fields parsed from one member segment.
#[derive(Debug)]
pub struct SegmentParse {
    pub fields: Vec<Field>,
    /// The member is a pointer or reference.
    pub pointer: bool,
    /// Set when the segment fell back to an opaque field.
    pub diagnostic: Option<Diagnostic>,
}

/// Parse one member segment.
pub fn parse_segment(
    tokens: &[(Token, Span)],
    dialect: Dialect,
    src: &ExpandedSource,
) -> SegmentParse {
    let end = tokens.last().map_or(0, |(_, s)| s.end);
    let token_iter = tokens.iter().cloned().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (end..end).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let (parsed, errors) = segment_parser().parse(stream).into_output_errors();
    match parsed {
        Some(seg) if errors.is_empty() => match lower_segment(seg, dialect, src) {
            Some(parse) => parse,
            None => opaque_segment(
                tokens,
                src,
                "std::array size does not fit in 32 bits".to_string(),
            ),
        },
        _ => {
            let reason = errors
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unrecognized member".to_string());
            opaque_segment(tokens, src, reason)
        }
    }
}

fn lower_segment(
    seg: ParsedSegment,
    dialect: Dialect,
    src: &ExpandedSource,
) -> Option<SegmentParse> {
    let mut pointer = false;
    let fields = seg
        .declarators
        .into_iter()
        .map(|d| {
            pointer |= d.pointer;
            let mut dims = d.dims;
            let elem = seg.ty.strip_std_array(&mut dims)?;
            let span = Span::new(d.span.start(), d.span.end());
            Some(Field {
                ty: SemanticType::from_spelling(&elem.spelling(), dialect),
                name: d.name,
                array_dims: dims,
                explicit_offset: d.annotations.iter().find_map(|a| match a {
                    Annotation::Offset(o) => Some(*o),
                    Annotation::Other => None,
                }),
                span,
                line: src.locate(span.start).line,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    Some(SegmentParse {
        fields,
        pointer,
        diagnostic: None,
    })
}

/// Keep an unparseable member as one field whose name is the last
/// identifier before any array suffix, annotation or initializer.
fn opaque_segment(tokens: &[(Token, Span)], src: &ExpandedSource, reason: String) -> SegmentParse {
    let head_len = tokens
        .iter()
        .position(|(t, _)| matches!(t, Token::LBracket | Token::Colon | Token::Equals))
        .unwrap_or(tokens.len());
    let (name, name_span) = tokens[..head_len]
        .iter()
        .rev()
        .chain(tokens.iter().rev())
        .find_map(|(t, s)| t.ident().map(|n| (n.to_string(), *s)))
        .unwrap_or_else(|| {
            let span = tokens.first().map_or(Span::default(), |(_, s)| *s);
            ("<anonymous>".to_string(), span)
        });

    let first = tokens.first().map_or(0, |(_, s)| s.start);
    let last = tokens.last().map_or(0, |(_, s)| s.end);
    let raw = src
        .text
        .get(first..last)
        .unwrap_or("")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let pointer = tokens[..head_len]
        .iter()
        .any(|(t, _)| matches!(t, Token::Star | Token::Amp));

    let location = src.locate(name_span.start);
    let diagnostic = Diagnostic::warning(
        DiagKind::Parse,
        format!("cannot parse member '{}', keeping it as an opaque field", raw),
    )
    .with_code(codes::OPAQUE_FIELD)
    .at(location.clone())
    .with_hint(reason);

    SegmentParse {
        fields: vec![Field {
            ty: SemanticType::Unknown(raw),
            name,
            array_dims: Vec::new(),
            explicit_offset: None,
            span: name_span,
            line: location.line,
        }],
        pointer,
        diagnostic: Some(diagnostic),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::types::ScalarKind;
    use std::path::Path;

    fn parse(text: &str, dialect: Dialect) -> SegmentParse {
        let src = ExpandedSource::identity(Path::new("t.hlsl"), text.to_string());
        let tokens = lex(&src.text).tokens;
        parse_segment(&tokens, dialect, &src)
    }

    fn shader_ok(text: &str) -> Vec<Field> {
        let result = parse(text, Dialect::ShaderSide);
        assert!(result.diagnostic.is_none(), "{:?}", result.diagnostic);
        result.fields
    }

    fn host_ok(text: &str) -> Vec<Field> {
        let result = parse(text, Dialect::HostSide);
        assert!(result.diagnostic.is_none(), "{:?}", result.diagnostic);
        result.fields
    }

    #[test]
    fn simple_vector() {
        let f = shader_ok("float3 pos");
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].name, "pos");
        assert_eq!(f[0].ty, SemanticType::Vector(ScalarKind::Float, 3));
        assert!(f[0].array_dims.is_empty());
    }

    #[test]
    fn modifiers_and_multi_dim_arrays() {
        let f = shader_ok("row_major float4x4 bones[4][2]");
        assert_eq!(f[0].ty, SemanticType::Matrix(ScalarKind::Float, 4, 4));
        assert_eq!(f[0].array_dims, vec![4, 2]);
    }

    #[test]
    fn packoffset_is_captured() {
        let f = shader_ok("float2 uv : packoffset(c3.z)");
        assert_eq!(f[0].explicit_offset, Some(3 * 16 + 8));
        let f = shader_ok("float4 color : packoffset(c1)");
        assert_eq!(f[0].explicit_offset, Some(16));
    }

    #[test]
    fn semantics_and_initializers_are_ignored() {
        let f = shader_ok("float4 pos : SV_Position");
        assert_eq!(f[0].name, "pos");
        let f = host_ok("float scale = 1.0f");
        assert_eq!(f[0].name, "scale");
        let f = host_ok("uint32_t flags{ 0 }");
        assert_eq!(f[0].ty, SemanticType::Scalar(ScalarKind::Uint));
    }

    #[test]
    fn multiple_declarators() {
        let f = shader_ok("float a, b[2], c");
        let names: Vec<_> = f.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(f[1].array_dims, vec![2]);
    }

    #[test]
    fn host_qualified_and_builtin_types() {
        let f = host_ok("DirectX::XMFLOAT4X4 viewProj");
        assert_eq!(f[0].ty, SemanticType::Matrix(ScalarKind::Float, 4, 4));
        let f = host_ok("unsigned int count");
        assert_eq!(f[0].ty, SemanticType::Scalar(ScalarKind::Uint));
        let f = host_ok("alignas(16) const float4 tint");
        assert_eq!(f[0].ty, SemanticType::Vector(ScalarKind::Float, 4));
        let f = host_ok("struct Light light");
        assert_eq!(f[0].ty, SemanticType::Named("Light".into()));
    }

    #[test]
    fn std_array_becomes_dims() {
        let f = host_ok("std::array<float, 4> weights");
        assert_eq!(f[0].ty, SemanticType::Scalar(ScalarKind::Float));
        assert_eq!(f[0].array_dims, vec![4]);
        let f = host_ok("std::array<std::array<float, 4>, 2> m[3]");
        assert_eq!(f[0].array_dims, vec![3, 2, 4]);
    }

    #[test]
    fn template_vectors() {
        let f = shader_ok("vector<float, 3> dir");
        assert_eq!(f[0].ty, SemanticType::Vector(ScalarKind::Float, 3));
    }

    #[test]
    fn pointers_are_flagged() {
        let result = parse("Light* lights", Dialect::HostSide);
        assert!(result.pointer);
        let result = parse("const Light& ref", Dialect::HostSide);
        assert!(result.pointer);
    }

    #[test]
    fn unparseable_member_becomes_opaque() {
        let result = parse("float4 lights[MAX_LIGHTS]", Dialect::ShaderSide);
        assert_eq!(result.fields.len(), 1);
        assert_eq!(result.fields[0].name, "lights");
        assert!(matches!(result.fields[0].ty, SemanticType::Unknown(_)));
        let diag = result.diagnostic.expect("diagnostic");
        assert_eq!(diag.code, Some(codes::OPAQUE_FIELD));
    }

    #[test]
    fn packoffset_bytes_components() {
        assert_eq!(packoffset_bytes("c0", Some("w")), Some(12));
        assert_eq!(packoffset_bytes("c10", None), Some(160));
        assert_eq!(packoffset_bytes("b0", None), None);
        assert_eq!(packoffset_bytes("c1", Some("q")), None);
        assert_eq!(packoffset_bytes("c268435455", Some("w")), Some(u32::MAX - 3));
        assert_eq!(packoffset_bytes("c268435456", None), None);
        assert_eq!(packoffset_bytes("c300000000", Some("y")), None);
    }

    #[test]
    fn oversized_std_array_becomes_opaque() {
        let result = parse("std::array<float, 5000000000> big", Dialect::HostSide);
        assert_eq!(result.fields.len(), 1);
        assert_eq!(result.fields[0].name, "big");
        assert!(matches!(result.fields[0].ty, SemanticType::Unknown(_)));
        assert!(result.fields[0].array_dims.is_empty());
        let diag = result.diagnostic.expect("diagnostic");
        assert_eq!(diag.code, Some(codes::OPAQUE_FIELD));
    }

    #[test]
    fn overflowing_packoffset_becomes_opaque() {
        let result = parse("float4 tint : packoffset(c300000000)", Dialect::ShaderSide);
        assert_eq!(result.fields.len(), 1);
        assert_eq!(result.fields[0].name, "tint");
        assert_eq!(result.fields[0].explicit_offset, None);
        assert!(result.diagnostic.is_some());
    }
}
