// extract.rs — Declaration extractor
//
// Scans one expanded source for structural declarations. The caller picks
// the grammar (shader-side or host-side); the extractor never guesses the
// dialect from content.
//
// Shader side: `struct`, `cbuffer`, `tbuffer`, `ConstantBuffer<T>`,
//   structured buffers, and register-bound textures, typed buffers and
//   samplers.
// Host side: `struct`/`class` definitions plus
//   `static_assert(offsetof(T, f) == N)` offset facts.
//
// Preconditions: `src` is an expanded translation unit with a line map.
// Postconditions: every draft's location is a line of an original file.
// Failure modes: unterminated bodies (E0100), unsupported register classes
//                (W0102), stray characters (W0103) and opaque members
//                (W0101) are diagnostics; extraction always completes.
// Side effects: none.

use std::ops::Range;

use tracing::{debug, trace};

use crate::config::ExtractConfig;
use crate::decl::{
    DeclDraft, DeclKind, Dialect, Field, RegisterBinding, RegisterClass, ResourceKind,
};
use crate::diag::{codes, DiagKind, Diagnostic};
use crate::field::parse_segment;
use crate::lexer::{lex, Token};
use crate::source::{ExpandedSource, Location, Span};
use crate::types::SemanticType;

/// Leading words of members that contribute no instance storage.
const NON_FIELD_WORDS: &[&str] = &[
    "using",
    "typedef",
    "friend",
    "template",
    "enum",
    "union",
    "static_assert",
    "virtual",
    "explicit",
    "operator",
    "constexpr",
];

const ACCESS_WORDS: &[&str] = &["public", "private", "protected"];

/// Most register slots one resource array may occupy. Matches the D3D11
/// per-stage SRV slot count; larger arrays are capped with W0104.
pub const MAX_RESOURCE_SLOTS: u32 = 128;

/// `static_assert(offsetof(T, f) == N)` found in host source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetAssert {
    pub type_name: String,
    pub field: String,
    pub offset: u32,
}

/// Everything extracted from one expanded source.
#[derive(Debug, Default)]
pub struct Extraction {
    pub drafts: Vec<DeclDraft>,
    pub offset_asserts: Vec<OffsetAssert>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Extract declarations from `src` using the grammar for `dialect`.
pub fn extract(src: &ExpandedSource, dialect: Dialect, config: &ExtractConfig) -> Extraction {
    let lexed = lex(&src.text);
    let mut scanner = Scanner {
        src,
        toks: &lexed.tokens,
        dialect,
        config,
        out: Extraction::default(),
    };
    for err in &lexed.errors {
        scanner.out.diagnostics.push(
            Diagnostic::warning(DiagKind::Lex, err.message.clone())
                .with_code(codes::LEX_ERROR)
                .at(src.locate(err.span.start)),
        );
    }
    scanner.run();
    scanner.out
}

/// Header facts between a declaration name and its opening brace.
struct Header {
    bases: Vec<String>,
    binding: Option<RegisterBinding>,
    open: usize,
}

struct Scanner<'a> {
    src: &'a ExpandedSource,
    toks: &'a [(Token, Span)],
    dialect: Dialect,
    config: &'a ExtractConfig,
    out: Extraction,
}

impl<'a> Scanner<'a> {
    fn tok(&self, i: usize) -> Option<&'a Token> {
        self.toks.get(i).map(|(t, _)| t)
    }

    fn ident_at(&self, i: usize) -> Option<&'a str> {
        self.tok(i).and_then(Token::ident)
    }

    fn locate(&self, i: usize) -> Location {
        let offset = self.toks.get(i).map_or(0, |(_, s)| s.start);
        self.src.locate(offset)
    }

    /// Index of the token closing the group opened at `open`.
    fn matching(&self, open: usize) -> Option<usize> {
        let (o, c) = match self.tok(open)? {
            Token::LBrace => (Token::LBrace, Token::RBrace),
            Token::LParen => (Token::LParen, Token::RParen),
            Token::LBracket => (Token::LBracket, Token::RBracket),
            Token::Lt => (Token::Lt, Token::Gt),
            _ => return None,
        };
        let mut depth = 0usize;
        for (i, (t, _)) in self.toks.iter().enumerate().skip(open) {
            if *t == o {
                depth += 1;
            } else if *t == c {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
        }
        None
    }

    fn run(&mut self) {
        let toks = self.toks;
        for (i, (tok, _)) in toks.iter().enumerate() {
            match (self.dialect, tok) {
                (Dialect::ShaderSide, Token::Struct) => self.shader_struct(i),
                (Dialect::ShaderSide, Token::Cbuffer | Token::Tbuffer) => self.shader_cbuffer(i),
                (Dialect::ShaderSide, Token::Ident(name)) => {
                    if let Some(kind) = ResourceKind::from_type_name(name) {
                        self.shader_resource(i, kind);
                    }
                }
                (Dialect::HostSide, Token::Struct | Token::Class) => self.host_struct(i),
                (Dialect::HostSide, Token::Ident(name)) if name == "static_assert" => {
                    self.offset_assert(i)
                }
                _ => {}
            }
        }
    }

    fn unterminated(&mut self, name_idx: usize, name: &str) {
        let diag = Diagnostic::error(
            DiagKind::Parse,
            format!("declaration '{}' has no closing brace; skipped", name),
        )
        .with_code(codes::UNTERMINATED_DECL)
        .at(self.locate(name_idx));
        self.out.diagnostics.push(diag);
    }

    fn skip_by_name(&self, name: &str, at: usize) -> bool {
        let builtin = !matches!(
            SemanticType::from_spelling(name, self.dialect),
            SemanticType::Named(_)
        );
        if builtin {
            debug!("skipping {} (built-in type name) at {}", name, self.locate(at));
            return true;
        }
        if self.dialect == Dialect::ShaderSide && self.config.is_skipped_name(name) {
            debug!("skipping shader IO struct {} at {}", name, self.locate(at));
            return true;
        }
        false
    }

    // ── Headers ──

    /// Walk from just after a declaration name to its `{`. Returns `None`
    /// for forward declarations and non-definitions.
    fn header(&mut self, mut j: usize) -> Option<Header> {
        let mut header = Header {
            bases: Vec::new(),
            binding: None,
            open: 0,
        };
        loop {
            match self.tok(j)? {
                Token::Ident(w) if w == "final" => j += 1,
                Token::Colon if self.tok(j + 1) == Some(&Token::Register) => {
                    let (binding, next) = self.register_clause(j + 1)?;
                    header.binding = binding;
                    j = next;
                }
                Token::Colon => {
                    let (bases, next) = self.base_list(j + 1)?;
                    header.bases = bases;
                    j = next;
                }
                Token::LBrace => {
                    header.open = j;
                    return Some(header);
                }
                _ => return None,
            }
        }
    }

    /// `public Base, private ns::Other<T>` up to the opening brace.
    fn base_list(&self, mut j: usize) -> Option<(Vec<String>, usize)> {
        let mut bases = Vec::new();
        let mut current: Option<String> = None;
        loop {
            match self.tok(j)? {
                Token::LBrace => break,
                Token::Semi | Token::RBrace => return None,
                Token::Comma => {
                    bases.extend(current.take());
                }
                Token::Lt => {
                    j = self.matching(j)?;
                }
                Token::Ident(w) if ACCESS_WORDS.contains(&w.as_str()) || w == "virtual" => {}
                Token::Ident(w) => current = Some(w.clone()),
                _ => {}
            }
            j += 1;
        }
        bases.extend(current);
        Some((bases, j))
    }

    /// `register(t3, space1)` starting at the `register` keyword. Returns the
    /// binding (if its class is supported) and the index after `)`.
    fn register_clause(&mut self, reg: usize) -> Option<(Option<RegisterBinding>, usize)> {
        let open = reg + 1;
        if self.tok(open) != Some(&Token::LParen) {
            return None;
        }
        let close = self.matching(open)?;
        let mut class = None;
        let mut index = 0;
        let mut space = 0;
        for k in open + 1..close {
            let Some(word) = self.ident_at(k) else {
                continue;
            };
            if let Some(n) = word.strip_prefix("space").and_then(|n| n.parse().ok()) {
                space = n;
                continue;
            }
            let mut chars = word.chars();
            let Some(letter) = chars.next() else { continue };
            let Ok(n) = chars.as_str().parse::<u32>() else {
                // Profile prefixes such as `register(ps, b0)`.
                continue;
            };
            match RegisterClass::from_letter(letter) {
                Some(c) => {
                    class = Some(c);
                    index = n;
                }
                None => {
                    let diag = Diagnostic::warning(
                        DiagKind::Parse,
                        format!("unsupported register class in '{}'; binding ignored", word),
                    )
                    .with_code(codes::UNSUPPORTED_REGISTER)
                    .at(self.locate(k));
                    self.out.diagnostics.push(diag);
                }
            }
        }
        let binding = class.map(|class| RegisterBinding {
            class,
            index,
            space,
            count: 1,
        });
        Some((binding, close + 1))
    }

    // ── Bodies ──

    /// Token ranges of the member declarations between `open` and `close`.
    fn member_segments(&self, open: usize, close: usize) -> Vec<Range<usize>> {
        let mut segments = Vec::new();
        let mut start = open + 1;
        let mut j = open + 1;
        while j < close {
            match self.tok(j) {
                Some(Token::Semi) => {
                    segments.push(start..j);
                    start = j + 1;
                    j += 1;
                }
                Some(Token::Colon)
                    if j == start + 1
                        && self
                            .ident_at(start)
                            .is_some_and(|w| ACCESS_WORDS.contains(&w)) =>
                {
                    start = j + 1;
                    j += 1;
                }
                Some(Token::LBrace) => {
                    let Some(end) = self.matching(j).filter(|e| *e < close) else {
                        break;
                    };
                    if self.is_function_head(start..j) {
                        trace!("skipping member function body at {}", self.locate(j));
                        start = end + 1;
                        j = end + 1;
                    } else if self.starts_nested_type(start..j) {
                        // Nested type definitions (and members declared with
                        // them inline) are not fields of this declaration.
                        let semi = (end + 1..close)
                            .find(|k| self.tok(*k) == Some(&Token::Semi))
                            .unwrap_or(close);
                        start = semi + 1;
                        j = semi + 1;
                    } else {
                        j = end + 1;
                    }
                }
                _ => j += 1,
            }
        }
        segments
            .into_iter()
            .filter(|r| !r.is_empty() && self.is_field_segment(r.clone()))
            .collect()
    }

    fn is_function_head(&self, range: Range<usize>) -> bool {
        let mut prev: Option<&Token> = None;
        for k in range {
            match self.tok(k) {
                Some(Token::Equals) | Some(Token::LBrace) => return false,
                Some(Token::Tilde) => return true,
                Some(Token::LParen) => {
                    if !matches!(
                        prev,
                        Some(Token::Alignas) | Some(Token::Register) | Some(Token::Packoffset)
                    ) {
                        return true;
                    }
                }
                _ => {}
            }
            prev = self.tok(k);
        }
        false
    }

    fn starts_nested_type(&self, range: Range<usize>) -> bool {
        range.clone().next().is_some_and(|k| {
            matches!(self.tok(k), Some(Token::Struct) | Some(Token::Class))
                || self
                    .ident_at(k)
                    .is_some_and(|w| w == "union" || w == "enum")
        })
    }

    fn is_field_segment(&self, range: Range<usize>) -> bool {
        let first = range.start;
        if self.tok(first) == Some(&Token::Static) {
            return false;
        }
        if self
            .ident_at(first)
            .is_some_and(|w| NON_FIELD_WORDS.contains(&w))
        {
            return false;
        }
        // `struct Foo;` forward declarations inside a body.
        if range.len() == 2 && matches!(self.tok(first), Some(Token::Struct) | Some(Token::Class))
        {
            return false;
        }
        !self.is_function_head(range)
    }

    /// Parse every member of a body. Returns the fields and whether any
    /// member is a pointer or reference.
    fn parse_body(&mut self, open: usize, close: usize) -> (Vec<Field>, bool) {
        let mut fields = Vec::new();
        let mut pointer = false;
        for range in self.member_segments(open, close) {
            let parsed = parse_segment(&self.toks[range], self.dialect, self.src);
            pointer |= parsed.pointer;
            fields.extend(parsed.fields);
            self.out.diagnostics.extend(parsed.diagnostic);
        }
        (fields, pointer)
    }

    fn push(&mut self, draft: DeclDraft) {
        debug!(
            "found {:?} {:?} {} at {} with {} fields",
            draft.dialect,
            draft.kind,
            draft.name,
            draft.location,
            draft.fields.len()
        );
        self.out.drafts.push(draft);
    }

    // ── Shader side ──

    fn shader_struct(&mut self, i: usize) {
        let Some(name) = self.ident_at(i + 1) else {
            return;
        };
        let Some(header) = self.header(i + 2) else {
            return;
        };
        let Some(close) = self.matching(header.open) else {
            self.unterminated(i + 1, name);
            return;
        };
        if self.skip_by_name(name, i + 1) {
            return;
        }
        let (mut fields, _) = self.parse_body(header.open, close);
        prepend_bases(&mut fields, &header.bases, self.toks[i + 1].1, self.locate(i + 1).line);
        self.push(DeclDraft {
            dialect: Dialect::ShaderSide,
            kind: DeclKind::PlainStruct,
            name: name.to_string(),
            fields,
            register_binding: header.binding,
            resource: None,
            element_type: None,
            location: self.locate(i + 1),
        });
    }

    fn shader_cbuffer(&mut self, i: usize) {
        let Some(name) = self.ident_at(i + 1) else {
            return;
        };
        let Some(header) = self.header(i + 2) else {
            return;
        };
        let Some(close) = self.matching(header.open) else {
            self.unterminated(i + 1, name);
            return;
        };
        if self.skip_by_name(name, i + 1) {
            return;
        }
        let (fields, _) = self.parse_body(header.open, close);
        let kind = if fields.iter().any(|f| f.ty.is_named()) {
            DeclKind::CompositeBuffer
        } else {
            DeclKind::Buffer
        };
        let resource = if self.tok(i) == Some(&Token::Tbuffer) {
            ResourceKind::TextureBuffer
        } else {
            ResourceKind::ConstantBuffer
        };
        self.push(DeclDraft {
            dialect: Dialect::ShaderSide,
            kind,
            name: name.to_string(),
            fields,
            register_binding: header.binding,
            resource: Some(resource),
            element_type: None,
            location: self.locate(i + 1),
        });
    }

    /// `Kind[<Elem>] name[N]... : register(...)`; only bound resources count.
    fn shader_resource(&mut self, i: usize, resource: ResourceKind) {
        let mut j = i + 1;
        let mut element: Option<String> = None;
        if self.tok(j) == Some(&Token::Lt) {
            let Some(close) = self.matching(j) else {
                return;
            };
            element = Some(self.spell(j + 1..close));
            j = close + 1;
        }
        let Some(var) = self.ident_at(j) else {
            return;
        };
        let var_idx = j;
        j += 1;

        let mut count: u32 = 1;
        let mut dims = Vec::new();
        while self.tok(j) == Some(&Token::LBracket) {
            if let (Some(Token::Int(n)), Some(Token::RBracket)) = (self.tok(j + 1), self.tok(j + 2))
            {
                let n = u32::try_from(*n).unwrap_or(u32::MAX);
                count = count.saturating_mul(n);
                dims.push(n);
                j += 3;
            } else {
                // Unbounded or symbolic arrays occupy at least their base slot.
                let Some(close) = self.matching(j) else {
                    return;
                };
                j = close + 1;
            }
        }

        if self.tok(j) != Some(&Token::Colon) || self.tok(j + 1) != Some(&Token::Register) {
            trace!("ignoring unbound resource {} at {}", var, self.locate(var_idx));
            return;
        }
        let Some((Some(mut binding), _)) = self.register_clause(j + 1) else {
            return;
        };
        if count > MAX_RESOURCE_SLOTS {
            let diag = Diagnostic::warning(
                DiagKind::Parse,
                format!(
                    "resource array '{}' spans {} slots; counted as {}",
                    var, count, MAX_RESOURCE_SLOTS
                ),
            )
            .with_code(codes::RESOURCE_ARRAY_CAPPED)
            .at(self.locate(var_idx));
            self.out.diagnostics.push(diag);
            count = MAX_RESOURCE_SLOTS;
        }
        binding.count = count;

        let elem_ty = element
            .as_deref()
            .map(|e| SemanticType::from_spelling(e, Dialect::ShaderSide));
        let line = self.locate(var_idx).line;
        let span = self.toks[var_idx].1;
        let elem_field = |ty: SemanticType| Field {
            ty,
            name: var.to_string(),
            array_dims: dims.clone(),
            explicit_offset: None,
            span,
            line,
        };

        let (kind, fields) = match (resource.has_layout(), elem_ty) {
            (true, Some(ty @ SemanticType::Named(_))) => {
                (DeclKind::CompositeBuffer, vec![elem_field(ty)])
            }
            (true, Some(_)) if resource == ResourceKind::ConstantBuffer => {
                debug!("skipping ConstantBuffer of a built-in type at {}", self.locate(var_idx));
                return;
            }
            (true, Some(ty)) => (DeclKind::Buffer, vec![elem_field(ty)]),
            _ => (DeclKind::Buffer, Vec::new()),
        };

        self.push(DeclDraft {
            dialect: Dialect::ShaderSide,
            kind,
            name: var.to_string(),
            fields,
            register_binding: Some(binding),
            resource: Some(resource),
            element_type: element,
            location: self.locate(var_idx),
        });
    }

    /// Re-spell a token range compactly (`vector<float,4>`).
    fn spell(&self, range: Range<usize>) -> String {
        let mut out = String::new();
        let mut prev_word = false;
        for (t, _) in &self.toks[range] {
            let word = matches!(t, Token::Ident(_) | Token::Int(_) | Token::Float(_));
            if word && prev_word {
                out.push(' ');
            }
            out.push_str(&t.to_string());
            prev_word = word;
        }
        out
    }

    // ── Host side ──

    fn host_struct(&mut self, i: usize) {
        if i > 0 && self.ident_at(i - 1).is_some_and(|w| w == "enum") {
            return;
        }
        // Skip attributes: alignas(N), [[...]], MACRO(...).
        let mut j = i + 1;
        loop {
            match (self.tok(j), self.tok(j + 1)) {
                (Some(Token::Alignas), Some(Token::LParen)) => match self.matching(j + 1) {
                    Some(close) => j = close + 1,
                    None => return,
                },
                (Some(Token::LBracket), Some(Token::LBracket)) => match self.matching(j) {
                    Some(close) => j = close + 1,
                    None => return,
                },
                (Some(Token::Ident(_)), Some(Token::LParen)) => match self.matching(j + 1) {
                    Some(close) => j = close + 1,
                    None => return,
                },
                _ => break,
            }
        }
        let name_idx = j;
        let Some(name) = self.ident_at(name_idx) else {
            return;
        };
        let Some(header) = self.header(name_idx + 1) else {
            return;
        };
        let Some(close) = self.matching(header.open) else {
            self.unterminated(name_idx, name);
            return;
        };
        if self.skip_by_name(name, name_idx) {
            return;
        }

        let diag_mark = self.out.diagnostics.len();
        let (mut fields, pointer) = self.parse_body(header.open, close);
        if pointer && self.config.skip_host_pointer_structs {
            debug!("skipping host struct {} at {} (contains pointers)", name, self.locate(name_idx));
            self.out.diagnostics.truncate(diag_mark);
            return;
        }
        prepend_bases(
            &mut fields,
            &header.bases,
            self.toks[name_idx].1,
            self.locate(name_idx).line,
        );
        if fields.is_empty() {
            debug!(
                "skipping host struct {} at {} (no instance fields)",
                name,
                self.locate(name_idx)
            );
            return;
        }
        self.push(DeclDraft {
            dialect: Dialect::HostSide,
            kind: DeclKind::PlainStruct,
            name: name.to_string(),
            fields,
            register_binding: None,
            resource: None,
            element_type: None,
            location: self.locate(name_idx),
        });
    }

    /// `static_assert(offsetof(T, f) == N, ...)`.
    fn offset_assert(&mut self, i: usize) {
        let mut j = i + 1;
        let expect = |t: Token, j: &mut usize| {
            let ok = self.tok(*j) == Some(&t);
            *j += 1;
            ok
        };
        if !expect(Token::LParen, &mut j) {
            return;
        }
        if self.ident_at(j) != Some("offsetof") {
            return;
        }
        j += 1;
        if !expect(Token::LParen, &mut j) {
            return;
        }
        let mut type_name = None;
        while let Some(t) = self.tok(j) {
            match t {
                Token::Ident(s) => type_name = Some(s.clone()),
                Token::PathSep => {}
                _ => break,
            }
            j += 1;
        }
        let (Some(Token::Comma), Some(field), Some(Token::RParen)) =
            (self.tok(j), self.ident_at(j + 1), self.tok(j + 2))
        else {
            return;
        };
        j += 3;
        let (Some(Token::Equals), Some(Token::Equals), Some(Token::Int(n))) =
            (self.tok(j), self.tok(j + 1), self.tok(j + 2))
        else {
            return;
        };
        let (Some(type_name), Ok(offset)) = (type_name, u32::try_from(*n)) else {
            return;
        };
        trace!("offset fact {}::{} == {}", type_name, field, offset);
        self.out.offset_asserts.push(OffsetAssert {
            type_name,
            field: field.to_string(),
            offset,
        });
    }
}

/// Base classes lay out before the derived members; record each as a
/// named field so composite resolution inlines it.
fn prepend_bases(fields: &mut Vec<Field>, bases: &[String], span: Span, line: u32) {
    if bases.is_empty() {
        return;
    }
    let base_fields = bases.iter().map(|b| Field {
        ty: SemanticType::Named(b.clone()),
        name: b.clone(),
        array_dims: Vec::new(),
        explicit_offset: None,
        span,
        line,
    });
    fields.splice(0..0, base_fields);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarKind;
    use std::path::Path;

    fn run(text: &str, dialect: Dialect) -> Extraction {
        let src = ExpandedSource::identity(Path::new("test.src"), text.to_string());
        extract(&src, dialect, &ExtractConfig::default())
    }

    fn names(ex: &Extraction) -> Vec<&str> {
        ex.drafts.iter().map(|d| d.name.as_str()).collect()
    }

    fn field_names(d: &DeclDraft) -> Vec<&str> {
        d.fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn shader_struct_and_cbuffer() {
        let ex = run(
            "struct Light\n{\n    float3 dir;\n    float4 color;\n};\n\ncbuffer PerFrame : register(b2)\n{\n    float4x4 viewProj;\n    float time;\n}\n",
            Dialect::ShaderSide,
        );
        assert_eq!(names(&ex), vec!["Light", "PerFrame"]);
        let light = &ex.drafts[0];
        assert_eq!(light.kind, DeclKind::PlainStruct);
        assert_eq!(light.location, Location::new("test.src", 1));
        assert_eq!(field_names(light), vec!["dir", "color"]);
        assert_eq!(light.fields[1].line, 4);

        let per_frame = &ex.drafts[1];
        assert_eq!(per_frame.kind, DeclKind::Buffer);
        assert_eq!(per_frame.resource, Some(ResourceKind::ConstantBuffer));
        let b = per_frame.register_binding.unwrap();
        assert_eq!((b.class, b.index, b.space, b.count), (RegisterClass::B, 2, 0, 1));
        assert_eq!(per_frame.location.line, 7);
    }

    #[test]
    fn cbuffer_with_struct_members_is_composite() {
        let ex = run(
            "cbuffer Lights : register(b1) { Light sun; float intensity; };",
            Dialect::ShaderSide,
        );
        assert_eq!(ex.drafts[0].kind, DeclKind::CompositeBuffer);
    }

    #[test]
    fn constant_buffer_template() {
        let ex = run(
            "ConstantBuffer<PerView> view : register(b0, space1);",
            Dialect::ShaderSide,
        );
        let d = &ex.drafts[0];
        assert_eq!(d.name, "view");
        assert_eq!(d.kind, DeclKind::CompositeBuffer);
        assert_eq!(d.element_type.as_deref(), Some("PerView"));
        assert_eq!(d.fields[0].ty, SemanticType::Named("PerView".into()));
        assert_eq!(d.register_binding.unwrap().space, 1);
    }

    #[test]
    fn structured_buffers() {
        let ex = run(
            "StructuredBuffer<Particle> particles : register(t4);\nRWStructuredBuffer<float4> outColor : register(u0);",
            Dialect::ShaderSide,
        );
        assert_eq!(ex.drafts[0].kind, DeclKind::CompositeBuffer);
        assert_eq!(ex.drafts[1].kind, DeclKind::Buffer);
        assert_eq!(ex.drafts[1].resource, Some(ResourceKind::RwStructuredBuffer));
        assert_eq!(
            ex.drafts[1].fields[0].ty,
            SemanticType::Vector(ScalarKind::Float, 4)
        );
    }

    #[test]
    fn textures_need_a_register() {
        let ex = run(
            "Texture2D<float4> NoiseTex : register(t3);\nTexture2D Unbound;\nSamplerState Samp : register(s0);\nTexture2D Maps[4] : register(t8);\nfloat4 f(Texture2D tex) { return 0; }",
            Dialect::ShaderSide,
        );
        assert_eq!(names(&ex), vec!["NoiseTex", "Samp", "Maps"]);
        assert_eq!(ex.drafts[0].resource, Some(ResourceKind::Texture));
        assert!(ex.drafts[0].fields.is_empty());
        assert_eq!(ex.drafts[1].register_binding.unwrap().class, RegisterClass::S);
        assert_eq!(ex.drafts[2].register_binding.unwrap().count, 4);
    }

    #[test]
    fn huge_resource_arrays_are_capped() {
        let ex = run(
            "Texture2D Bindless[4000000000] : register(t0);
Texture2D Small[2] : register(t200);
",
            Dialect::ShaderSide,
        );
        assert_eq!(ex.drafts[0].register_binding.unwrap().count, MAX_RESOURCE_SLOTS);
        assert_eq!(ex.drafts[0].fields.len(), 0);
        assert_eq!(ex.drafts[1].register_binding.unwrap().count, 2);
        assert_eq!(ex.diagnostics.len(), 1);
        assert_eq!(ex.diagnostics[0].code, Some(codes::RESOURCE_ARRAY_CAPPED));
        assert_eq!(ex.diagnostics[0].location.as_ref().unwrap().line, 1);
    }

    #[test]
    fn shader_io_and_builtin_names_are_skipped() {
        let ex = run(
            "struct VS_OUTPUT { float4 pos : SV_Position; };\nstruct float4 { float x; };\nstruct Kept { float a; };",
            Dialect::ShaderSide,
        );
        assert_eq!(names(&ex), vec!["Kept"]);
    }

    #[test]
    fn unterminated_declaration_is_reported() {
        let ex = run("cbuffer Broken : register(b0) { float a;", Dialect::ShaderSide);
        assert!(ex.drafts.is_empty());
        assert_eq!(ex.diagnostics.len(), 1);
        assert_eq!(ex.diagnostics[0].code, Some(codes::UNTERMINATED_DECL));
    }

    #[test]
    fn unsupported_register_class_is_reported() {
        let ex = run("cbuffer Old : register(c0) { float a; };", Dialect::ShaderSide);
        assert_eq!(ex.drafts.len(), 1);
        assert!(ex.drafts[0].register_binding.is_none());
        assert_eq!(ex.diagnostics[0].code, Some(codes::UNSUPPORTED_REGISTER));
    }

    #[test]
    fn static_members_are_not_fields() {
        let ex = run(
            "cbuffer C : register(b0) { static const float K = 1.0; float a; };",
            Dialect::ShaderSide,
        );
        assert_eq!(field_names(&ex.drafts[0]), vec!["a"]);
    }

    #[test]
    fn host_struct_skips_non_fields() {
        let src = r#"
struct alignas(16) PerFrame final : public Base
{
public:
    static constexpr int kCount = 4;
    using Vec = DirectX::XMFLOAT3;
    PerFrame() = default;
    ~PerFrame();
    float Get() const { return time; }
    struct Inner { int x; };
    DirectX::XMFLOAT4X4 viewProj;
    float time = 0.0f;
    uint32_t flags{ 0 };
private:
    float pad[3];
};
"#;
        let ex = run(src, Dialect::HostSide);
        assert_eq!(names(&ex), vec!["PerFrame", "Inner"]);
        let d = &ex.drafts[0];
        assert_eq!(field_names(d), vec!["Base", "viewProj", "time", "flags", "pad"]);
        assert_eq!(d.fields[0].ty, SemanticType::Named("Base".into()));
        assert_eq!(d.location.line, 2);
        assert!(ex.diagnostics.is_empty(), "{:?}", ex.diagnostics);
    }

    #[test]
    fn host_pointer_and_static_only_structs_are_skipped() {
        let src = "struct Node { Node* next; int v; };\nstruct Consts { static const int A = 1; };\nstruct Data { int v; };";
        let ex = run(src, Dialect::HostSide);
        assert_eq!(names(&ex), vec!["Data"]);
    }

    #[test]
    fn host_non_definitions_are_ignored() {
        let src = "struct Fwd;\nenum class Mode { A, B };\nstruct Data* make();\nstruct Real { float v; };";
        let ex = run(src, Dialect::HostSide);
        assert_eq!(names(&ex), vec!["Real"]);
    }

    #[test]
    fn offset_asserts_are_collected() {
        let src = "struct S { float a; float b; };\nstatic_assert(offsetof(S, b) == 4);\nstatic_assert(sizeof(S) == 8);\nstatic_assert(offsetof(ns::S, a) == 0, \"a\");";
        let ex = run(src, Dialect::HostSide);
        assert_eq!(
            ex.offset_asserts,
            vec![
                OffsetAssert {
                    type_name: "S".into(),
                    field: "b".into(),
                    offset: 4
                },
                OffsetAssert {
                    type_name: "S".into(),
                    field: "a".into(),
                    offset: 0
                },
            ]
        );
    }
}
