// similarity.rs — Field-name similarity metrics
//
// Pure functions over two identifiers returning a score in [0, 1]. The
// aligner only sees the `NameSimilarity` trait, so metrics can be swapped
// through `Aligner::with_similarity`.
//
// Preconditions: none.
// Postconditions: `similarity(a, a) == 1.0`; results are symmetric and
//                 within [0, 1].
// Failure modes: none.
// Side effects: none.

pub trait NameSimilarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Drop naming-convention noise: case, `g_`/`m_` prefixes, underscores and
/// array suffixes. `m_LightDir[2]` and `lightdir` normalize equal.
pub fn normalize_field_name(name: &str) -> String {
    let base = name.split('[').next().unwrap_or(name).trim();
    let lower = base.to_ascii_lowercase();
    let stripped = lower
        .strip_prefix("g_")
        .or_else(|| lower.strip_prefix("m_"))
        .unwrap_or(&lower);
    stripped.chars().filter(|c| *c != '_').collect()
}

// ── Longest-common-subsequence ratio ────────────────────────────────────────

/// `2 * lcs / (len(a) + len(b))` on normalized names, raised to 0.9 when one
/// name contains the other and covers at least 70% of it, and to 0.85 when
/// one is a prefix or suffix of the other.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceRatio;

const SUBSTRING_SCORE: f64 = 0.9;
const SUBSTRING_COVERAGE: f64 = 0.7;
const AFFIX_SCORE: f64 = 0.85;

impl NameSimilarity for SequenceRatio {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let a = normalize_field_name(a);
        let b = normalize_field_name(b);
        if a == b {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let ac: Vec<char> = a.chars().collect();
        let bc: Vec<char> = b.chars().collect();
        let mut score = 2.0 * lcs_len(&ac, &bc) as f64 / (ac.len() + bc.len()) as f64;

        let (short, long) = if ac.len() <= bc.len() { (&a, &b) } else { (&b, &a) };
        let coverage = short.chars().count() as f64 / long.chars().count() as f64;
        if long.contains(short.as_str()) && coverage >= SUBSTRING_COVERAGE {
            score = score.max(SUBSTRING_SCORE);
        } else if long.starts_with(short.as_str()) || long.ends_with(short.as_str()) {
            score = score.max(AFFIX_SCORE);
        }
        score.clamp(0.0, 1.0)
    }
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            cur[j + 1] = if x == y {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

// ── Jaro-Winkler ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct JaroWinkler {
    pub prefix_scale: f64,
    pub max_prefix: usize,
}

impl Default for JaroWinkler {
    fn default() -> Self {
        JaroWinkler {
            prefix_scale: 0.1,
            max_prefix: 4,
        }
    }
}

impl NameSimilarity for JaroWinkler {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = normalize_field_name(a).chars().collect();
        let b: Vec<char> = normalize_field_name(b).chars().collect();
        let j = jaro(&a, &b);
        let prefix = a
            .iter()
            .zip(&b)
            .take(self.max_prefix)
            .take_while(|(x, y)| x == y)
            .count();
        (j + prefix as f64 * self.prefix_scale * (1.0 - j)).clamp(0.0, 1.0)
    }
}

fn jaro(a: &[char], b: &[char]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let window = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut a_hit = vec![false; a.len()];
    let mut b_hit = vec![false; b.len()];
    let mut matches = 0usize;
    for (i, x) in a.iter().enumerate() {
        let lo = i.saturating_sub(window);
        let hi = (i + window + 1).min(b.len());
        for j in lo..hi {
            if !b_hit[j] && b[j] == *x {
                a_hit[i] = true;
                b_hit[j] = true;
                matches += 1;
                break;
            }
        }
    }
    if matches == 0 {
        return 0.0;
    }
    let a_seq = a.iter().zip(&a_hit).filter(|(_, h)| **h).map(|(c, _)| c);
    let b_seq = b.iter().zip(&b_hit).filter(|(_, h)| **h).map(|(c, _)| c);
    let transpositions = a_seq.zip(b_seq).filter(|(x, y)| x != y).count() / 2;
    let m = matches as f64;
    (m / a.len() as f64 + m / b.len() as f64 + (m - transpositions as f64) / m) / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_conventions() {
        assert_eq!(normalize_field_name("m_LightDir[2]"), "lightdir");
        assert_eq!(normalize_field_name("g_view_proj"), "viewproj");
        assert_eq!(normalize_field_name("Pos"), "pos");
    }

    #[test]
    fn ratio_identical_after_normalization() {
        let m = SequenceRatio;
        assert_eq!(m.similarity("m_ViewProj", "viewProj"), 1.0);
        assert_eq!(m.similarity("pos", "pos"), 1.0);
    }

    #[test]
    fn ratio_substring_boost() {
        let m = SequenceRatio;
        // "tint" in "tints": coverage 4/5, raw ratio 8/9
        assert_eq!(m.similarity("tint", "tints"), SUBSTRING_SCORE);
    }

    #[test]
    fn ratio_affix_boost() {
        let m = SequenceRatio;
        // "dir" is a prefix of "direction", coverage 3/9
        assert_eq!(m.similarity("dir", "direction"), AFFIX_SCORE);
    }

    #[test]
    fn ratio_unrelated_names_score_low() {
        let m = SequenceRatio;
        assert!(m.similarity("pos", "time") < 0.5);
        assert_eq!(m.similarity("abc", "xyz"), 0.0);
        assert_eq!(m.similarity("", "xyz"), 0.0);
    }

    #[test]
    fn ratio_is_symmetric() {
        let m = SequenceRatio;
        for (a, b) in [("uv", "texcoord"), ("worldPos", "position"), ("tint", "tintColor")] {
            assert_eq!(m.similarity(a, b), m.similarity(b, a), "{a} {b}");
        }
    }

    #[test]
    fn jaro_winkler_known_value() {
        let m = JaroWinkler::default();
        // Classic MARTHA / MARHTA pair: jaro 0.9444, winkler 0.9611.
        let s = m.similarity("martha", "marhta");
        assert!((s - 0.9611).abs() < 1e-3, "{s}");
        assert_eq!(m.similarity("same", "same"), 1.0);
        assert_eq!(m.similarity("abc", ""), 0.0);
    }
}
