// align.rs — Structural alignment of shader layouts against host layouts
//
// Scores every eligible host declaration against one shader declaration
// over their flattened layouts, then classifies the ranked candidates as
// confident, ambiguous or unmatched.
//
// Preconditions: `resolve` has run over the complete pool; the aligner
//                needs every host declaration at once.
// Postconditions: scores are within [0, 1]; candidates are ordered by rank
//                 descending, then host id; output order follows shader id.
// Failure modes: none. No candidate and ambiguity are outcomes.
// Side effects: none. `align_all` fans out over rayon's global pool.

use rayon::prelude::*;
use serde::Serialize;
use tracing::trace;

use crate::config::AlignConfig;
use crate::decl::{DeclPool, Declaration, Dialect};
use crate::id::DeclId;
use crate::resolve::{FlatField, Resolution};
use crate::similarity::{NameSimilarity, SequenceRatio};
use crate::types::{compatibility, normalize_type_name};

const BAND_EPSILON: f64 = 1e-9;

// ── Outcomes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub shader: DeclId,
    pub host: DeclId,
    pub score: f64,
    /// Unclamped score used for ordering and the ambiguity band. Equals
    /// `score` unless the name terms push it past 1.
    pub rank: f64,
    /// `(shader flat field, host flat field)`; `None` marks a gap.
    pub field_alignment: Vec<(usize, Option<usize>)>,
    /// Host flat fields no shader field was paired with.
    pub unmatched_host: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Confident,
    Ambiguous,
    Unmatched,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlignOutcome {
    Confident(MatchCandidate),
    /// Every candidate within the ambiguity band of the best, best first.
    Ambiguous(Vec<MatchCandidate>),
    Unmatched { best: Option<MatchCandidate> },
}

impl AlignOutcome {
    pub fn confidence(&self) -> Confidence {
        match self {
            AlignOutcome::Confident(_) => Confidence::Confident,
            AlignOutcome::Ambiguous(_) => Confidence::Ambiguous,
            AlignOutcome::Unmatched { .. } => Confidence::Unmatched,
        }
    }

    /// The confidently matched host declaration, if any.
    pub fn confident_host(&self) -> Option<DeclId> {
        match self {
            AlignOutcome::Confident(c) => Some(c.host),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub shader: DeclId,
    pub outcome: AlignOutcome,
}

/// Field pairing of one shader layout against one host layout.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPairing {
    pub score: f64,
    pub field_alignment: Vec<(usize, Option<usize>)>,
    pub unmatched_host: Vec<usize>,
}

// ── Aligner ─────────────────────────────────────────────────────────────────

pub struct Aligner<'c> {
    config: &'c AlignConfig,
    similarity: Box<dyn NameSimilarity>,
}

impl<'c> Aligner<'c> {
    pub fn new(config: &'c AlignConfig) -> Self {
        Aligner {
            config,
            similarity: Box::new(SequenceRatio),
        }
    }

    pub fn with_similarity(mut self, similarity: Box<dyn NameSimilarity>) -> Self {
        self.similarity = similarity;
        self
    }

    /// Whether a shader declaration takes part in alignment.
    pub fn is_eligible(decl: &Declaration, resolution: &Resolution) -> bool {
        decl.dialect == Dialect::ShaderSide
            && decl.resource.map_or(true, |r| r.has_layout())
            && resolution.layout(decl.id).is_some_and(|l| !l.is_empty())
    }

    /// Weighted type and name score of one field pair, in [0, 1].
    fn pair_score(&self, s: &FlatField, h: &FlatField) -> f64 {
        let ty = compatibility(&s.ty, &s.array_dims, &h.ty, &h.array_dims);
        let name = self.similarity.similarity(&s.name, &h.name);
        let (wt, wn) = (self.config.type_weight, self.config.name_weight);
        (wt * ty + wn * name) / (wt + wn)
    }

    fn strong(&self, s: &FlatField, h: &FlatField) -> bool {
        self.pair_score(s, h) >= self.config.resync_threshold
    }

    /// Find the nearest re-synchronization point after a mismatch at
    /// `(i, j)`: a strong pair whose successor pair is also strong (or runs
    /// off either end). Host-side skips are tried before shader-side ones.
    fn resync(&self, shader: &[FlatField], host: &[FlatField], i: usize, j: usize) -> Option<(usize, usize)> {
        let look = self.config.lookahead;
        for total in 1..=2 * look {
            for di in 0..=total.min(look) {
                let dj = total - di;
                if dj > look {
                    continue;
                }
                let (si, hj) = (i + di, j + dj);
                if si >= shader.len() || hj >= host.len() {
                    continue;
                }
                if !self.strong(&shader[si], &host[hj]) {
                    continue;
                }
                let next_ok = si + 1 >= shader.len()
                    || hj + 1 >= host.len()
                    || self.strong(&shader[si + 1], &host[hj + 1]);
                if next_ok {
                    return Some((si, hj));
                }
            }
        }
        None
    }

    /// Positional pairing with bounded re-alignment.
    pub fn pair_fields(&self, shader: &[FlatField], host: &[FlatField]) -> FieldPairing {
        let mut field_alignment = Vec::with_capacity(shader.len());
        let mut unmatched_host = Vec::new();
        let mut total = 0.0;
        let (mut i, mut j) = (0, 0);

        while i < shader.len() && j < host.len() {
            let (s, h) = (&shader[i], &host[j]);
            let score = self.pair_score(s, h);
            if score >= self.config.resync_threshold {
                field_alignment.push((i, Some(j)));
                total += score;
                i += 1;
                j += 1;
                continue;
            }
            if h.padding && !s.padding {
                unmatched_host.push(j);
                j += 1;
                continue;
            }
            if s.padding && !h.padding {
                field_alignment.push((i, None));
                i += 1;
                continue;
            }
            match self.resync(shader, host, i, j) {
                Some((si, hj)) => {
                    field_alignment.extend((i..si).map(|k| (k, None)));
                    unmatched_host.extend(j..hj);
                    i = si;
                    j = hj;
                }
                None => {
                    // No anchor in the window: keep the strict positional pair.
                    field_alignment.push((i, Some(j)));
                    total += score;
                    i += 1;
                    j += 1;
                }
            }
        }
        field_alignment.extend((i..shader.len()).map(|k| (k, None)));
        unmatched_host.extend(j..host.len());

        let shader_weight = field_alignment
            .iter()
            .filter(|(k, m)| m.is_some() || !shader[*k].padding)
            .count();
        let host_weight = unmatched_host.iter().filter(|k| !host[**k].padding).count();
        let denom = shader_weight + host_weight;
        let score = if denom == 0 { 0.0 } else { total / denom as f64 };

        FieldPairing {
            score,
            field_alignment,
            unmatched_host,
        }
    }

    /// Score one shader/host declaration pair.
    pub fn score(
        &self,
        shader: &Declaration,
        shader_layout: &[FlatField],
        host: &Declaration,
        host_layout: &[FlatField],
    ) -> MatchCandidate {
        let pairing = self.pair_fields(shader_layout, host_layout);
        let mut score = pairing.score;

        let agreeing = pairing
            .field_alignment
            .iter()
            .filter_map(|(s, h)| h.map(|h| (*s, h)))
            .filter(|(s, h)| {
                let (a, b) = (shader_layout[*s].explicit_offset, host_layout[*h].explicit_offset);
                a.is_some() && a == b
            })
            .count();
        if !shader_layout.is_empty() {
            score += self.config.offset_bonus * agreeing as f64 / shader_layout.len() as f64;
        }

        let (name_similarity, same_name) = self.decl_name_similarity(shader, host);
        score += self.config.decl_name_weight * name_similarity;
        if same_name {
            score += self.config.decl_name_bonus;
        }

        MatchCandidate {
            shader: shader.id,
            host: host.id,
            score: score.clamp(0.0, 1.0),
            rank: score.max(0.0),
            field_alignment: pairing.field_alignment,
            unmatched_host: pairing.unmatched_host,
        }
    }

    /// Best similarity of the host name to the shader name or its element
    /// type, and whether either is equal after normalization.
    fn decl_name_similarity(&self, shader: &Declaration, host: &Declaration) -> (f64, bool) {
        let host_name = normalize_type_name(&host.name);
        std::iter::once(shader.name.as_str())
            .chain(shader.element_type.as_deref())
            .map(normalize_type_name)
            .map(|n| {
                if n == host_name {
                    (1.0, true)
                } else {
                    (self.similarity.similarity(&n, &host_name), false)
                }
            })
            .fold((0.0, false), |(best, exact), (sim, eq)| (best.max(sim), exact || eq))
    }

    /// All host candidates within the field-count tolerance, best first.
    pub fn candidates(&self, pool: &DeclPool, resolution: &Resolution, shader: DeclId) -> Vec<MatchCandidate> {
        let decl = pool.get(shader);
        let Some(shader_layout) = resolution.layout(shader) else {
            return Vec::new();
        };
        let shader_count = shader_layout.iter().filter(|f| !f.padding).count();

        let mut out: Vec<MatchCandidate> = pool
            .of_dialect(Dialect::HostSide)
            .filter_map(|host| {
                let host_layout = resolution.layout(host.id)?;
                let host_count = host_layout.iter().filter(|f| !f.padding).count();
                if shader_count.abs_diff(host_count) > self.config.field_count_tolerance {
                    return None;
                }
                let candidate = self.score(decl, shader_layout, host, host_layout);
                (candidate.score > 0.0).then_some(candidate)
            })
            .collect();
        out.sort_by(|a, b| b.rank.total_cmp(&a.rank).then(a.host.cmp(&b.host)));
        trace!("{}: {} candidates", decl.name, out.len());
        out
    }

    /// Classify ranked candidates (best first).
    pub fn classify(&self, candidates: Vec<MatchCandidate>) -> AlignOutcome {
        let Some(top) = candidates.first() else {
            return AlignOutcome::Unmatched { best: None };
        };
        let (top_score, top_rank) = (top.score, top.rank);
        if top_score >= self.config.ambiguous_floor {
            let band: Vec<MatchCandidate> = candidates
                .iter()
                .filter(|c| {
                    c.score >= self.config.ambiguous_floor
                        && top_rank - c.rank <= self.config.ambiguity_band + BAND_EPSILON
                })
                .cloned()
                .collect();
            if band.len() >= 2 {
                return AlignOutcome::Ambiguous(band);
            }
        }
        let mut candidates = candidates;
        let best = candidates.swap_remove(0);
        if top_score >= self.config.confident_threshold {
            AlignOutcome::Confident(best)
        } else {
            AlignOutcome::Unmatched { best: Some(best) }
        }
    }

    pub fn align_decl(&self, pool: &DeclPool, resolution: &Resolution, shader: DeclId) -> Alignment {
        Alignment {
            shader,
            outcome: self.classify(self.candidates(pool, resolution, shader)),
        }
    }

    /// Align every eligible shader declaration, in shader id order.
    pub fn align_all(&self, pool: &DeclPool, resolution: &Resolution) -> Vec<Alignment> {
        let shaders: Vec<DeclId> = pool
            .of_dialect(Dialect::ShaderSide)
            .filter(|d| Self::is_eligible(d, resolution))
            .map(|d| d.id)
            .collect();
        shaders
            .par_iter()
            .map(|id| self.align_decl(pool, resolution, *id))
            .collect()
    }
}
