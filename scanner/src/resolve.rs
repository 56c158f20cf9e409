// resolve.rs — Composite resolution and layout flattening
//
// Turns every declaration into a flat field layout by inlining the fields of
// named member types, on both dialects. References form a graph over the
// `DeclPool`; strongly connected components of that graph are reference
// cycles. Each cyclic component is reported once and its members (and
// everything that inlines them) are excluded.
//
// Preconditions: `pool` ids are dense (`DeclPool::new` invariant).
// Postconditions: no layout is computed by recursion; the graph walk uses an
//                 explicit stack and layouts are built sinks-first.
// Failure modes: unknown composite members (E0200) and cycles (E0201)
//                exclude the affected declarations.
// Side effects: none.

use tracing::debug;

use crate::decl::{is_padding_name, DeclKind, DeclPool};
use crate::diag::{codes, DiagKind, Diagnostic};
use crate::id::DeclId;
use crate::types::SemanticType;

/// One field of a flattened layout.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatField {
    /// Leaf field name.
    pub name: String,
    /// Dotted path through inlined members (`sun.dir`).
    pub path: String,
    pub ty: SemanticType,
    pub array_dims: Vec<u32>,
    pub explicit_offset: Option<u32>,
    pub padding: bool,
}

/// Flattened layouts for a whole pool.
#[derive(Debug)]
pub struct Resolution {
    layouts: Vec<Option<Vec<FlatField>>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    /// Flattened fields, or `None` if the declaration is excluded.
    pub fn layout(&self, id: DeclId) -> Option<&[FlatField]> {
        self.layouts.get(id.index())?.as_deref()
    }

    pub fn is_excluded(&self, id: DeclId) -> bool {
        self.layout(id).is_none()
    }
}

pub fn resolve(pool: &DeclPool) -> Resolution {
    let n = pool.len();
    let mut diagnostics = Vec::new();
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
    // Per field index: the declaration it inlines, if any.
    let mut targets: Vec<Vec<Option<usize>>> = Vec::with_capacity(n);
    let mut failed = vec![false; n];

    for decl in pool.iter() {
        let mut field_targets = Vec::with_capacity(decl.fields.len());
        let mut missing: Vec<&str> = Vec::new();
        for field in &decl.fields {
            let target = field.ty.named().and_then(|name| {
                let found = pool.lookup(decl, name);
                if found.is_none() && !missing.contains(&name) {
                    missing.push(name);
                }
                found
            });
            // Arrays of named structs stay a single field.
            let inline = target.filter(|_| field.array_dims.is_empty()).map(DeclId::index);
            if let Some(t) = inline {
                if !edges[decl.id.index()].contains(&t) {
                    edges[decl.id.index()].push(t);
                }
            }
            field_targets.push(inline);
        }
        if decl.kind == DeclKind::CompositeBuffer && !missing.is_empty() {
            failed[decl.id.index()] = true;
            for name in missing {
                diagnostics.push(
                    Diagnostic::error(
                        DiagKind::UnresolvedMember,
                        format!(
                            "'{}' references undeclared member type '{}'; excluded from alignment",
                            decl.name, name
                        ),
                    )
                    .with_code(codes::UNRESOLVED_MEMBER)
                    .at(decl.location()),
                );
            }
        }
        targets.push(field_targets);
    }

    let components = strongly_connected(&edges);

    let mut cycles: Vec<Vec<usize>> = components
        .iter()
        .filter(|c| c.len() > 1 || edges[c[0]].contains(&c[0]))
        .map(|c| {
            let mut members = c.clone();
            members.sort_unstable();
            members
        })
        .collect();
    cycles.sort();
    for members in &cycles {
        for m in members {
            failed[*m] = true;
        }
        let first = pool.get(DeclId(members[0] as u32));
        let names: Vec<&str> = members
            .iter()
            .map(|m| pool.get(DeclId(*m as u32)).name.as_str())
            .collect();
        let mut diag = Diagnostic::error(
            DiagKind::CompositeCycle,
            format!(
                "declarations {} reference each other; excluded from alignment",
                names.join(", ")
            ),
        )
        .with_code(codes::COMPOSITE_CYCLE)
        .at(first.location());
        for m in &members[1..] {
            diag = diag.with_related(pool.get(DeclId(*m as u32)).location(), "part of the cycle");
        }
        diagnostics.push(diag);
    }

    // Components arrive sinks-first, so every inlined target is done before
    // the declarations that use it.
    let mut layouts: Vec<Option<Vec<FlatField>>> = vec![None; n];
    for component in &components {
        for &v in component {
            if failed[v] {
                continue;
            }
            let decl = pool.get(DeclId(v as u32));
            let mut flat = Vec::new();
            let mut ok = true;
            for (idx, (field, target)) in decl.fields.iter().zip(&targets[v]).enumerate() {
                match target {
                    Some(t) => match &layouts[*t] {
                        Some(inner) => {
                            let base = field.explicit_offset.or((idx == 0).then_some(0));
                            flat.extend(inner.iter().map(|c| FlatField {
                                name: c.name.clone(),
                                path: format!("{}.{}", field.name, c.path),
                                ty: c.ty.clone(),
                                array_dims: c.array_dims.clone(),
                                explicit_offset: base
                                    .zip(c.explicit_offset)
                                    .map(|(a, b)| a + b),
                                padding: c.padding,
                            }));
                        }
                        None => {
                            ok = false;
                            break;
                        }
                    },
                    None => flat.push(FlatField {
                        name: field.name.clone(),
                        path: field.name.clone(),
                        ty: field.ty.clone(),
                        array_dims: field.array_dims.clone(),
                        explicit_offset: field.explicit_offset,
                        padding: is_padding_name(&field.name),
                    }),
                }
            }
            if ok {
                layouts[v] = Some(flat);
            } else {
                debug!(
                    "excluding {} at {}: inlines an excluded declaration",
                    decl.name,
                    decl.location()
                );
            }
        }
    }

    Resolution {
        layouts,
        diagnostics,
    }
}

/// Tarjan's algorithm with an explicit call stack. Components are returned
/// in reverse topological order (sinks first).
fn strongly_connected(edges: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNSEEN: usize = usize::MAX;
    let n = edges.len();
    let mut index = vec![UNSEEN; n];
    let mut low = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut components = Vec::new();
    let mut next = 0;
    let mut call: Vec<(usize, usize)> = Vec::new();

    for root in 0..n {
        if index[root] != UNSEEN {
            continue;
        }
        index[root] = next;
        low[root] = next;
        next += 1;
        stack.push(root);
        on_stack[root] = true;
        call.push((root, 0));

        while let Some(frame) = call.last_mut() {
            let v = frame.0;
            if frame.1 < edges[v].len() {
                let w = edges[v][frame.1];
                frame.1 += 1;
                if index[w] == UNSEEN {
                    index[w] = next;
                    low[w] = next;
                    next += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    call.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
                continue;
            }

            call.pop();
            if let Some(&(parent, _)) = call.last() {
                low[parent] = low[parent].min(low[v]);
            }
            if low[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }
    components
}
