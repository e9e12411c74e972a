// src/services/fuzzy.rs
//! Weighted string similarity for matching free-text fund names.
//!
//! Scores are in `0.0..=100.0`. The weighted ratio mixes a plain similarity
//! with token-sorted, token-set and sliding-window (partial) comparisons so a
//! query survives word reordering and matches a substring of a longer name.

use std::collections::BTreeSet;

const UNBASE_SCALE: f64 = 0.95;

/// Lowercase, turn every non-alphanumeric character into a space and collapse runs.
pub fn normalize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// A string prepared for repeated LCS queries.
struct Pattern {
    chars: Vec<char>,
    // Bit masks per ASCII char; only when the pattern fits in one word.
    masks: Option<[u64; 128]>,
}

impl Pattern {
    fn new(chars: &[char]) -> Self {
        let masks = if chars.len() <= 64 && chars.iter().all(|c| c.is_ascii()) {
            let mut masks = [0u64; 128];
            for (i, &c) in chars.iter().enumerate() {
                masks[c as usize] |= 1u64 << i;
            }
            Some(masks)
        } else {
            None
        };
        Pattern { chars: chars.to_vec(), masks }
    }

    fn lcs_len(&self, other: &[char]) -> usize {
        match &self.masks {
            Some(masks) => bit_parallel_lcs(masks, self.chars.len(), other),
            None => lcs_len(&self.chars, other),
        }
    }

    fn ratio(&self, other: &[char]) -> f64 {
        ratio_from_lcs(self.chars.len(), other.len(), self.lcs_len(other))
    }
}

// Hyyrö's bit-vector LCS; the pattern is at most 64 chars.
fn bit_parallel_lcs(masks: &[u64; 128], pattern_len: usize, text: &[char]) -> usize {
    if pattern_len == 0 {
        return 0;
    }
    let mut s: u64 = !0;
    for &c in text {
        let m = if c.is_ascii() { masks[c as usize] } else { 0 };
        let u = s & m;
        s = s.wrapping_add(u) | s.wrapping_sub(u);
    }
    let window = if pattern_len == 64 { !0 } else { (1u64 << pattern_len) - 1 };
    (!s & window).count_ones() as usize
}

/// Longest common subsequence length, two-row dynamic programming.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut prev_row = vec![0usize; b.len() + 1];
    let mut curr_row = vec![0usize; b.len() + 1];

    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr_row[j + 1] = if ca == cb {
                prev_row[j] + 1
            } else {
                prev_row[j + 1].max(curr_row[j])
            };
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b.len()]
}

fn ratio_from_lcs(len_a: usize, len_b: usize, lcs: usize) -> f64 {
    let total = len_a + len_b;
    if total == 0 {
        return 100.0;
    }
    100.0 * (2 * lcs) as f64 / total as f64
}

fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

/// Normalized indel similarity of two already-normalized strings.
pub fn ratio(a: &str, b: &str) -> f64 {
    let (a, b) = (chars(a), chars(b));
    ratio_from_lcs(a.len(), b.len(), lcs_len(&a, &b))
}

/// Best `ratio` of the shorter string against every same-length window of the longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let (a, b) = (chars(a), chars(b));
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    if short.is_empty() {
        return 0.0;
    }

    let pattern = Pattern::new(&short);
    if short.len() == long.len() {
        return pattern.ratio(&long);
    }

    let last_start = long.len() - short.len();
    let mut best = 0.0f64;
    for start in 0..=last_start {
        // a window opening on a char absent from `short` is dominated by the next window
        if start < last_start && !short.contains(&long[start]) {
            continue;
        }
        let score = pattern.ratio(&long[start..start + short.len()]);
        if score > best {
            best = score;
            if best >= 100.0 {
                break;
            }
        }
    }
    best
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

struct TokenSets {
    intersection: String,
    only_a: String,
    only_b: String,
    shares_tokens: bool,
    one_is_subset: bool,
}

fn token_sets(a: &str, b: &str) -> TokenSets {
    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();

    let intersection: Vec<&str> = set_a.intersection(&set_b).copied().collect();
    let only_a: Vec<&str> = set_a.difference(&set_b).copied().collect();
    let only_b: Vec<&str> = set_b.difference(&set_a).copied().collect();

    TokenSets {
        shares_tokens: !intersection.is_empty(),
        one_is_subset: !intersection.is_empty() && (only_a.is_empty() || only_b.is_empty()),
        intersection: intersection.join(" "),
        only_a: only_a.join(" "),
        only_b: only_b.join(" "),
    }
}

fn join_nonempty(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{} {}", head, tail),
    }
}

pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let sets = token_sets(a, b);
    if sets.one_is_subset {
        return 100.0;
    }

    let combined_a = join_nonempty(&sets.intersection, &sets.only_a);
    let combined_b = join_nonempty(&sets.intersection, &sets.only_b);

    let mut best = ratio(&combined_a, &combined_b);
    if !sets.intersection.is_empty() {
        best = best
            .max(ratio(&sets.intersection, &combined_a))
            .max(ratio(&sets.intersection, &combined_b));
    }
    best
}

/// Any shared token is a perfect partial token match.
fn partial_token_ratio(a: &str, b: &str) -> f64 {
    if token_sets(a, b).shares_tokens {
        return 100.0;
    }
    partial_ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Weighted similarity of two raw strings, 0 when either is empty after normalization.
pub fn weighted_ratio(query: &str, choice: &str) -> f64 {
    let a = normalize(query);
    let b = normalize(choice);
    weighted_ratio_normalized(&a, &b)
}

/// Same as [`weighted_ratio`] for inputs that went through [`normalize`] already.
pub fn weighted_ratio_normalized(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let len_a = a.chars().count() as f64;
    let len_b = b.chars().count() as f64;
    let len_ratio = len_a.max(len_b) / len_a.min(len_b);

    let mut score = ratio(a, b);

    if len_ratio < 1.5 {
        let token_score = token_sort_ratio(a, b).max(token_set_ratio(a, b));
        return score.max(token_score * UNBASE_SCALE);
    }

    let partial_scale = if len_ratio <= 8.0 { 0.9 } else { 0.6 };
    score = score.max(partial_ratio(a, b) * partial_scale);
    score.max(partial_token_ratio(a, b) * UNBASE_SCALE * partial_scale)
}
