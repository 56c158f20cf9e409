// source.rs — Expanded source text and the line map back to original files
//
// The extractor never sees raw files: it sees an `ExpandedSource` produced by
// a `Preprocessor`. Every expanded line carries the `(file, line)` it was
// copied from, so reported locations always point into files users edit.
//
// Preconditions: input files are UTF-8 (invalid sequences are replaced).
// Postconditions: `ExpandedSource::locate` returns a location in an original
//                 file for every byte offset of the expanded text.
// Failure modes: an unreadable root file is a `PreprocessError`; missing or
//                recursive includes are diagnostics and expansion continues.
//                Object-like macros are substituted within a line, so the
//                line map stays one expanded line per original line.
// Side effects: reads files from disk (`IncludeExpander` only).

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::diag::{codes, DiagKind, Diagnostic};

// ── Locations ───────────────────────────────────────────────────────────────

/// A 1-based line in an original, un-expanded file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Location {
    pub file: PathBuf,
    pub line: u32,
}

impl Location {
    pub fn new(file: impl Into<PathBuf>, line: u32) -> Self {
        Location {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// Byte-offset span in expanded text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn join(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

// ── Line map ────────────────────────────────────────────────────────────────

/// Origin of one expanded line: index into the file table plus 1-based line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Origin {
    file: u32,
    line: u32,
}

/// Maps each expanded-text line (0-based) to its original file and line.
/// Lines without an entry (e.g. `#line` markers) fall back to the nearest
/// mapped line above them.
#[derive(Debug, Clone, Default)]
pub struct LineMap {
    files: Vec<PathBuf>,
    lines: Vec<Option<Origin>>,
}

impl LineMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-to-one map for text that was not expanded at all.
    pub fn identity(file: &Path, text: &str) -> Self {
        let mut map = LineMap::new();
        let id = map.intern(file);
        let count = text.lines().count().max(1);
        for line in 0..count {
            map.lines.push(Some(Origin {
                file: id,
                line: line as u32 + 1,
            }));
        }
        map
    }

    fn intern(&mut self, file: &Path) -> u32 {
        if let Some(pos) = self.files.iter().position(|f| f == file) {
            return pos as u32;
        }
        self.files.push(file.to_path_buf());
        (self.files.len() - 1) as u32
    }

    /// Record the origin of the next expanded line.
    pub fn push(&mut self, file: &Path, line: u32) {
        let id = self.intern(file);
        self.lines.push(Some(Origin { file: id, line }));
    }

    /// Record an expanded line that has no original counterpart.
    pub fn push_unmapped(&mut self) {
        self.lines.push(None);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Original location of an expanded line, if one exists at or above it.
    pub fn origin(&self, expanded_line: usize) -> Option<Location> {
        let upto = expanded_line.min(self.lines.len().checked_sub(1)?);
        self.lines[..=upto]
            .iter()
            .rev()
            .find_map(|o| *o)
            .map(|o| Location::new(self.files[o.file as usize].clone(), o.line))
    }

    /// Every original file referenced by the map.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

// ── Expanded source ─────────────────────────────────────────────────────────

/// Preprocessed text of one translation unit plus its line map.
#[derive(Debug, Clone)]
pub struct ExpandedSource {
    /// The file that was expanded (the translation unit).
    pub unit: PathBuf,
    pub text: String,
    pub line_map: LineMap,
    /// Non-fatal expansion problems (missing includes, include cycles).
    pub diagnostics: Vec<Diagnostic>,
    line_starts: Vec<usize>,
}

impl ExpandedSource {
    pub fn new(
        unit: impl Into<PathBuf>,
        text: String,
        line_map: LineMap,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| i + 1),
        );
        ExpandedSource {
            unit: unit.into(),
            text,
            line_map,
            diagnostics,
            line_starts,
        }
    }

    /// Unexpanded text; every line maps to itself.
    pub fn identity(unit: &Path, text: String) -> Self {
        let map = LineMap::identity(unit, &text);
        Self::new(unit, text, map, Vec::new())
    }

    /// Rebuild a line map from `#line N "file"` markers left by an external
    /// preprocessor. Lines before the first marker belong to `unit`. Marker
    /// lines themselves are unmapped; the lexer skips them.
    pub fn from_line_directives(unit: &Path, text: String) -> Self {
        let mut map = LineMap::new();
        let mut file = unit.to_path_buf();
        let mut next_line: u32 = 1;
        for line in text.lines() {
            if let Some((n, f)) = parse_line_directive(line) {
                map.push_unmapped();
                next_line = n;
                if let Some(f) = f {
                    file = PathBuf::from(f.replace('\\', "/"));
                }
                continue;
            }
            map.push(&file, next_line);
            next_line += 1;
        }
        Self::new(unit, text, map, Vec::new())
    }

    /// 0-based expanded line containing a byte offset.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        }
    }

    /// Original location of a byte offset in the expanded text.
    pub fn locate(&self, offset: usize) -> Location {
        self.line_map
            .origin(self.line_of(offset))
            .unwrap_or_else(|| Location::new(self.unit.clone(), 1))
    }
}

/// Parse `#line 288 "features/Grass/Shaders/RunGrass.hlsl"`.
fn parse_line_directive(line: &str) -> Option<(u32, Option<&str>)> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start();
    let rest = rest.strip_prefix("line")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let mut parts = rest.trim().splitn(2, char::is_whitespace);
    let n: u32 = parts.next()?.parse().ok()?;
    let file = parts
        .next()
        .map(|f| f.trim().trim_matches('"'))
        .filter(|f| !f.is_empty());
    Some((n, file))
}

// ── Preprocessor collaborator ───────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The expansion service consumed by the scanner: `expand(file)` yields the
/// expanded text and its line map. Implementations must report missing
/// includes as diagnostics on the returned source rather than failing.
pub trait Preprocessor: Send + Sync {
    fn expand(&self, file: &Path) -> Result<ExpandedSource, PreprocessError>;

    /// Expand with extra `NAME` / `NAME=VALUE` defines for one stage pass.
    /// Preprocessors without a define set ignore them.
    fn expand_with_defines(
        &self,
        file: &Path,
        defines: &[String],
    ) -> Result<ExpandedSource, PreprocessError> {
        let _ = defines;
        self.expand(file)
    }
}

fn read_file(path: &Path) -> Result<String, PreprocessError> {
    std::fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|e| PreprocessError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Reads files as-is. Host-side sources are scanned without expansion.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Preprocessor for Passthrough {
    fn expand(&self, file: &Path) -> Result<ExpandedSource, PreprocessError> {
        Ok(ExpandedSource::identity(file, read_file(file)?))
    }
}

/// Minimal include/conditional expander for shader sources.
///
/// Handles `#include`, `#pragma once`, `#define`/`#undef` of names and the
/// `#if`/`#ifdef`/`#ifndef`/`#elif`/`#else`/`#endif` family. Object-like
/// macros are substituted in emitted lines; function-like ones are only
/// tracked for `#ifdef`.
#[derive(Debug, Default, Clone)]
pub struct IncludeExpander {
    include_dirs: Vec<PathBuf>,
    defines: BTreeMap<String, String>,
}

impl IncludeExpander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    pub fn define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.insert(name.into(), value.into());
        self
    }

    /// Parse `NAME` or `NAME=VALUE` (the `-D` spelling).
    pub fn define_spec(self, spec: &str) -> Self {
        match spec.split_once('=') {
            Some((name, value)) => self.define(name.trim(), value.trim()),
            None => self.define(spec.trim(), "1"),
        }
    }

    fn resolve_include(&self, from: &Path, target: &str, quoted: bool) -> Option<PathBuf> {
        let local = from.parent().map(|dir| dir.join(target));
        let search = self.include_dirs.iter().map(|dir| dir.join(target));
        let candidates: Vec<PathBuf> = if quoted {
            local.into_iter().chain(search).collect()
        } else {
            search.chain(local).collect()
        };
        candidates.into_iter().find(|p| p.is_file())
    }
}

impl Preprocessor for IncludeExpander {
    fn expand(&self, file: &Path) -> Result<ExpandedSource, PreprocessError> {
        let text = read_file(file)?;
        let mut state = ExpandState {
            expander: self,
            out: String::with_capacity(text.len()),
            map: LineMap::new(),
            diagnostics: Vec::new(),
            stack: Vec::new(),
            once: HashSet::new(),
            defines: self.defines.clone(),
            function_like: HashSet::new(),
            conds: Vec::new(),
        };
        state.expand_file(file, &text);
        debug!(
            "expanded {} into {} lines ({} diagnostics)",
            file.display(),
            state.map.len(),
            state.diagnostics.len()
        );
        Ok(ExpandedSource::new(
            file,
            state.out,
            state.map,
            state.diagnostics,
        ))
    }

    fn expand_with_defines(
        &self,
        file: &Path,
        defines: &[String],
    ) -> Result<ExpandedSource, PreprocessError> {
        defines
            .iter()
            .fold(self.clone(), |e, d| e.define_spec(d))
            .expand(file)
    }
}

/// Nested substitution depth after which a macro body is left as written.
const MAX_MACRO_DEPTH: usize = 32;

/// One open `#if` group.
#[derive(Debug, Clone, Copy)]
struct CondFrame {
    /// Whether the enclosing groups are active.
    parent_active: bool,
    /// Whether some branch of this group has already been taken.
    taken: bool,
    active: bool,
}

struct ExpandState<'a> {
    expander: &'a IncludeExpander,
    out: String,
    map: LineMap,
    diagnostics: Vec<Diagnostic>,
    stack: Vec<PathBuf>,
    once: HashSet<PathBuf>,
    defines: BTreeMap<String, String>,
    function_like: HashSet<String>,
    conds: Vec<CondFrame>,
}

fn identity_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl ExpandState<'_> {
    fn active(&self) -> bool {
        self.conds.last().map_or(true, |c| c.active)
    }

    fn expand_file(&mut self, file: &Path, text: &str) {
        let key = identity_key(file);
        if self.once.contains(&key) {
            trace!("skipping {} (#pragma once)", file.display());
            return;
        }
        self.stack.push(key);
        let depth = self.conds.len();

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx as u32 + 1;
            let trimmed = line.trim_start();
            match trimmed.strip_prefix('#') {
                Some(directive) => self.directive(file, line_no, directive.trim()),
                None => {
                    if self.active() {
                        let line = self.substitute(line);
                        self.out.push_str(&line);
                        self.out.push('\n');
                        self.map.push(file, line_no);
                    }
                }
            }
        }

        // Unbalanced conditionals do not leak into the includer.
        self.conds.truncate(depth);
        self.stack.pop();
    }

    fn directive(&mut self, file: &Path, line_no: u32, directive: &str) {
        let (word, rest) = match directive.find(|c: char| c.is_whitespace() || c == '(') {
            Some(pos) => (&directive[..pos], directive[pos..].trim()),
            None => (directive, ""),
        };
        match word {
            "ifdef" | "ifndef" => {
                let name = rest.split_whitespace().next().unwrap_or("");
                let defined = self.defines.contains_key(name);
                self.open_group(if word == "ifdef" { defined } else { !defined });
            }
            "if" => {
                let value = eval_condition(rest, &self.defines);
                self.open_group(value);
            }
            "elif" => {
                let value = eval_condition(rest, &self.defines);
                if let Some(frame) = self.conds.last_mut() {
                    frame.active = frame.parent_active && !frame.taken && value;
                    frame.taken |= frame.active;
                }
            }
            "else" => {
                if let Some(frame) = self.conds.last_mut() {
                    frame.active = frame.parent_active && !frame.taken;
                    frame.taken = true;
                }
            }
            "endif" => {
                self.conds.pop();
            }
            _ if !self.active() => {}
            "define" => {
                let mut parts = rest.splitn(2, char::is_whitespace);
                if let Some(head) = parts.next().filter(|n| !n.is_empty()) {
                    let value = parts.next().unwrap_or("").trim().to_string();
                    match head.split_once('(') {
                        Some((name, _)) => {
                            self.function_like.insert(name.to_string());
                            self.defines.insert(name.to_string(), value);
                        }
                        None => {
                            self.function_like.remove(head);
                            self.defines.insert(head.to_string(), value);
                        }
                    }
                }
            }
            "undef" => {
                if let Some(name) = rest.split_whitespace().next() {
                    self.defines.remove(name);
                    self.function_like.remove(name);
                }
            }
            "pragma" => {
                if rest.starts_with("once") {
                    self.once.insert(identity_key(file));
                }
            }
            "include" => self.include(file, line_no, rest),
            _ => {}
        }
    }

    // ── Macro substitution ──

    fn substitute(&self, line: &str) -> String {
        if self.defines.is_empty() {
            return line.to_string();
        }
        self.substitute_in(line, &mut Vec::new())
    }

    /// Replace every object-like macro name in `text` by its body, expanding
    /// bodies recursively. Names being expanded are hidden from their own
    /// bodies, which ends self-referential chains.
    fn substitute_in(&self, text: &str, hidden: &mut Vec<String>) -> String {
        let mut out = String::with_capacity(text.len());
        let mut word_start: Option<usize> = None;
        let sentinel = std::iter::once((text.len(), ' '));
        for (i, c) in text.char_indices().chain(sentinel) {
            if c.is_ascii_alphanumeric() || c == '_' {
                word_start.get_or_insert(i);
                continue;
            }
            if let Some(start) = word_start.take() {
                let word = &text[start..i];
                match self.object_macro(word, hidden) {
                    Some(body) => {
                        hidden.push(word.to_string());
                        let expanded = self.substitute_in(body, hidden);
                        hidden.pop();
                        out.push_str(&expanded);
                    }
                    None => out.push_str(word),
                }
            }
            if i < text.len() {
                out.push(c);
            }
        }
        out
    }

    fn object_macro(&self, word: &str, hidden: &[String]) -> Option<&str> {
        if word.starts_with(|c: char| c.is_ascii_digit())
            || hidden.len() >= MAX_MACRO_DEPTH
            || self.function_like.contains(word)
            || hidden.iter().any(|h| h == word)
        {
            return None;
        }
        self.defines.get(word).map(String::as_str)
    }

    fn open_group(&mut self, value: bool) {
        let parent_active = self.active();
        let active = parent_active && value;
        self.conds.push(CondFrame {
            parent_active,
            taken: active,
            active,
        });
    }

    fn include(&mut self, file: &Path, line_no: u32, rest: &str) {
        let (target, quoted) = if let Some(inner) = rest.strip_prefix('"') {
            (inner.split('"').next().unwrap_or(""), true)
        } else if let Some(inner) = rest.strip_prefix('<') {
            (inner.split('>').next().unwrap_or(""), false)
        } else {
            (rest, true)
        };
        let here = Location::new(file, line_no);

        let Some(path) = self.expander.resolve_include(file, target, quoted) else {
            self.diagnostics.push(
                Diagnostic::warning(
                    DiagKind::MissingInclude,
                    format!("include '{}' not found; continuing without it", target),
                )
                .with_code(codes::MISSING_INCLUDE)
                .at(here),
            );
            return;
        };

        if self.stack.contains(&identity_key(&path)) {
            self.diagnostics.push(
                Diagnostic::warning(
                    DiagKind::MissingInclude,
                    format!("recursive include of '{}' ignored", target),
                )
                .with_code(codes::INCLUDE_CYCLE)
                .at(here),
            );
            return;
        }

        match read_file(&path) {
            Ok(text) => self.expand_file(&path, &text),
            Err(e) => self.diagnostics.push(
                Diagnostic::warning(DiagKind::MissingInclude, e.to_string())
                    .with_code(codes::MISSING_INCLUDE)
                    .at(here),
            ),
        }
    }
}

/// Evaluate the subset of `#if` expressions that matter for define sweeps:
/// `defined(X)`, `!defined X`, integer literals, bare names, `&&` and `||`.
/// Anything else counts as true so that code is scanned rather than lost.
fn eval_condition(expr: &str, defines: &BTreeMap<String, String>) -> bool {
    expr.split("||").any(|conj| {
        conj.split("&&").all(|atom| {
            let atom = atom.trim();
            let (negated, atom) = match atom.strip_prefix('!') {
                Some(rest) => (true, rest.trim()),
                None => (false, atom),
            };
            let value = if let Some(rest) = atom.strip_prefix("defined") {
                let name = rest.trim().trim_start_matches('(').trim_end_matches(')');
                defines.contains_key(name.trim())
            } else if let Ok(n) = atom.parse::<i64>() {
                n != 0
            } else if atom.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') && !atom.is_empty() {
                defines.get(atom).is_some_and(|v| v.trim() != "0")
            } else {
                true
            };
            value != negated
        })
    })
}
