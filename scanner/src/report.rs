// report.rs — Report rows and rendering
//
// Converts alignment outcomes and conflicts into self-contained row
// records (names, files and lines inlined) that serialize to JSON or render
// as plain text lines.
//
// Preconditions: rows are built from one run's pool and resolution.
// Postconditions: alignment rows follow shader id order, then conflict rows
//                 in slot order.
// Failure modes: none.
// Side effects: none.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::align::{AlignOutcome, Alignment, Confidence, MatchCandidate};
use crate::conflict::Conflict;
use crate::decl::{DeclPool, Stage};
use crate::diag::{DiagLevel, Diagnostic};
use crate::id::DeclId;
use crate::resolve::Resolution;

// ── Row records ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclRef {
    pub id: DeclId,
    pub name: String,
    pub file: PathBuf,
    pub line: u32,
}

impl DeclRef {
    pub fn of(pool: &DeclPool, id: DeclId) -> Self {
        let d = pool.get(id);
        DeclRef {
            id,
            name: d.name.clone(),
            file: d.source_file.clone(),
            line: d.source_line,
        }
    }
}

impl fmt::Display for DeclRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.file.display(), self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRef {
    pub host: DeclRef,
    pub score: f64,
}

/// One shader field and the host field it was paired with, by path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldPair {
    pub shader: String,
    pub host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UseRef {
    pub feature: String,
    pub stage: Stage,
    pub declaration: DeclRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "row", rename_all = "snake_case")]
pub enum ReportRow {
    Match {
        shader: DeclRef,
        host: DeclRef,
        score: f64,
        confidence: Confidence,
        fields: Vec<FieldPair>,
        unmatched_host: Vec<String>,
    },
    Ambiguous {
        shader: DeclRef,
        candidates: Vec<ScoredRef>,
    },
    Unmatched {
        shader: DeclRef,
        best: Option<ScoredRef>,
    },
    Conflict {
        register: String,
        space: u32,
        severity: DiagLevel,
        uses: Vec<UseRef>,
    },
}

fn scored(pool: &DeclPool, c: &MatchCandidate) -> ScoredRef {
    ScoredRef {
        host: DeclRef::of(pool, c.host),
        score: c.score,
    }
}

fn path_of(resolution: &Resolution, id: DeclId, index: usize) -> String {
    resolution
        .layout(id)
        .and_then(|l| l.get(index))
        .map(|f| f.path.clone())
        .unwrap_or_else(|| format!("#{}", index))
}

pub fn match_row(pool: &DeclPool, resolution: &Resolution, alignment: &Alignment) -> ReportRow {
    let shader = DeclRef::of(pool, alignment.shader);
    match &alignment.outcome {
        AlignOutcome::Confident(c) => ReportRow::Match {
            shader,
            host: DeclRef::of(pool, c.host),
            score: c.score,
            confidence: Confidence::Confident,
            fields: c
                .field_alignment
                .iter()
                .map(|(s, h)| FieldPair {
                    shader: path_of(resolution, c.shader, *s),
                    host: h.map(|h| path_of(resolution, c.host, h)),
                })
                .collect(),
            unmatched_host: c
                .unmatched_host
                .iter()
                .map(|h| path_of(resolution, c.host, *h))
                .collect(),
        },
        AlignOutcome::Ambiguous(cands) => ReportRow::Ambiguous {
            shader,
            candidates: cands.iter().map(|c| scored(pool, c)).collect(),
        },
        AlignOutcome::Unmatched { best } => ReportRow::Unmatched {
            shader,
            best: best.as_ref().map(|c| scored(pool, c)),
        },
    }
}

pub fn conflict_row(pool: &DeclPool, conflict: &Conflict) -> ReportRow {
    ReportRow::Conflict {
        register: format!("{}{}", conflict.key.register_type, conflict.key.index),
        space: conflict.key.space,
        severity: conflict.severity,
        uses: conflict
            .uses
            .iter()
            .map(|u| UseRef {
                feature: u.feature.clone(),
                stage: u.stage,
                declaration: DeclRef::of(pool, u.declaration_id),
            })
            .collect(),
    }
}

pub fn build_rows(
    pool: &DeclPool,
    resolution: &Resolution,
    alignments: &[Alignment],
    conflicts: &[Conflict],
) -> Vec<ReportRow> {
    alignments
        .iter()
        .map(|a| match_row(pool, resolution, a))
        .chain(conflicts.iter().map(|c| conflict_row(pool, c)))
        .collect()
}

// ── Whole report ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub files_scanned: usize,
    pub files_failed: usize,
    pub shader_declarations: usize,
    pub host_declarations: usize,
    pub register_uses: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub rows: Vec<ReportRow>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: RunStats,
    pub cancelled: bool,
}

impl AnalysisReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &ReportRow> {
        self.rows
            .iter()
            .filter(|r| matches!(r, ReportRow::Conflict { .. }))
    }

    /// Error-severity conflicts or error diagnostics.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
            || self.conflicts().any(|r| {
                matches!(
                    r,
                    ReportRow::Conflict {
                        severity: DiagLevel::Error,
                        ..
                    }
                )
            })
    }

    pub fn render_text(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        let (mut matched, mut ambiguous, mut unmatched, mut conflicts) = (0, 0, 0, 0);
        for row in &self.rows {
            match row {
                ReportRow::Match { shader, host, score, .. } => {
                    matched += 1;
                    lines.push(format!("match {} -> {} score={:.2}", shader, host, score));
                }
                ReportRow::Ambiguous { shader, candidates } => {
                    ambiguous += 1;
                    let list: Vec<String> = candidates
                        .iter()
                        .map(|c| format!("{} score={:.2}", c.host, c.score))
                        .collect();
                    lines.push(format!("ambiguous {}: {}", shader, list.join(", ")));
                }
                ReportRow::Unmatched { shader, best } => {
                    unmatched += 1;
                    match best {
                        Some(b) => lines.push(format!(
                            "unmatched {}: best {} score={:.2}",
                            shader, b.host, b.score
                        )),
                        None => lines.push(format!("unmatched {}: no candidate", shader)),
                    }
                }
                ReportRow::Conflict {
                    register,
                    space,
                    severity,
                    uses,
                } => {
                    conflicts += 1;
                    let level = match severity {
                        DiagLevel::Error => "error",
                        DiagLevel::Warning => "warning",
                    };
                    lines.push(format!("conflict {} {}, space{}", level, register, space));
                    for u in uses {
                        lines.push(format!("  {}/{} {}", u.feature, u.stage, u.declaration));
                    }
                }
            }
        }
        for d in &self.diagnostics {
            lines.push(d.to_string());
        }
        let s = &self.stats;
        lines.push(format!(
            "{} files ({} failed), {} shader / {} host declarations, {} register uses",
            s.files_scanned, s.files_failed, s.shader_declarations, s.host_declarations, s.register_uses
        ));
        lines.push(format!(
            "{} matched, {} ambiguous, {} unmatched, {} conflicts{}",
            matched,
            ambiguous,
            unmatched,
            conflicts,
            if self.cancelled { " (cancelled)" } else { "" }
        ));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::DiagKind;

    fn decl_ref(id: u32, name: &str, file: &str, line: u32) -> DeclRef {
        DeclRef {
            id: DeclId(id),
            name: name.to_string(),
            file: PathBuf::from(file),
            line,
        }
    }

    #[test]
    fn decl_ref_display() {
        assert_eq!(decl_ref(0, "PerFrame", "a.hlsl", 3).to_string(), "PerFrame (a.hlsl:3)");
    }

    #[test]
    fn error_conflict_fails_report() {
        let mut report = AnalysisReport::default();
        assert!(!report.has_errors());
        report.rows.push(ReportRow::Conflict {
            register: "t3".into(),
            space: 0,
            severity: DiagLevel::Warning,
            uses: Vec::new(),
        });
        assert!(!report.has_errors());
        report.diagnostics.push(Diagnostic::error(DiagKind::CompositeCycle, "cycle"));
        assert!(report.has_errors());
    }

    #[test]
    fn json_rows_are_tagged() {
        let report = AnalysisReport {
            rows: vec![ReportRow::Unmatched {
                shader: decl_ref(0, "Lonely", "a.hlsl", 1),
                best: None,
            }],
            ..AnalysisReport::default()
        };
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["rows"][0]["row"], "unmatched");
        assert_eq!(json["rows"][0]["shader"]["name"], "Lonely");
        assert_eq!(json["cancelled"], false);
    }

    #[test]
    fn text_summary_counts_rows() {
        let report = AnalysisReport {
            rows: vec![
                ReportRow::Unmatched {
                    shader: decl_ref(0, "Lonely", "a.hlsl", 1),
                    best: None,
                },
                ReportRow::Ambiguous {
                    shader: decl_ref(1, "Twin", "a.hlsl", 5),
                    candidates: vec![
                        ScoredRef {
                            host: decl_ref(2, "A", "a.h", 1),
                            score: 0.81,
                        },
                        ScoredRef {
                            host: decl_ref(3, "B", "b.h", 1),
                            score: 0.79,
                        },
                    ],
                },
            ],
            ..AnalysisReport::default()
        };
        let text = report.render_text();
        assert!(text.contains("unmatched Lonely (a.hlsl:1): no candidate"));
        assert!(text.contains("ambiguous Twin (a.hlsl:5): A (a.h:1) score=0.81, B (b.h:1) score=0.79"));
        assert!(text.ends_with("0 matched, 1 ambiguous, 1 unmatched, 0 conflicts"));
    }
}
