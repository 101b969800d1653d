//! Ratcliff/Obershelp string similarity and close-match selection.
//!
//! `ratio` is `2 * M / T` where `M` is the number of characters in matching blocks
//! and `T` the combined length of both strings. Matching blocks are found by taking
//! the longest common substring and recursing on both sides of it.

use std::collections::{HashMap, HashSet};

/// Sequences at least this long get their very common characters dropped from the
/// index, which keeps long queries cheap.
const AUTOJUNK_MIN_LEN: usize = 200;

/// Similarity matcher with a fixed second sequence (the query).
///
/// The query is indexed once; each candidate is compared against it.
pub struct SequenceMatcher {
    b: Vec<char>,
    b2j: HashMap<char, Vec<usize>>,
    full_b_count: HashMap<char, usize>,
}

impl SequenceMatcher {
    pub fn new(b: &str) -> Self {
        let b: Vec<char> = b.chars().collect();

        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (i, c) in b.iter().enumerate() {
            b2j.entry(*c).or_default().push(i);
        }

        let n = b.len();
        if n >= AUTOJUNK_MIN_LEN {
            let ntest = n / 100 + 1;
            let popular: HashSet<char> = b2j
                .iter()
                .filter(|(_, idxs)| idxs.len() > ntest)
                .map(|(c, _)| *c)
                .collect();
            for c in popular {
                b2j.remove(&c);
            }
        }

        let mut full_b_count: HashMap<char, usize> = HashMap::new();
        for c in &b {
            *full_b_count.entry(*c).or_insert(0) += 1;
        }

        Self { b, b2j, full_b_count }
    }

    /// Longest block `(i, j, size)` with `a[i..i+size] == b[j..j+size]` inside the
    /// given ranges. Ties go to the block starting earliest in `a`, then in `b`.
    fn find_longest_match(
        &self,
        a: &[char],
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
    ) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0usize);
        // j2len[j] = length of the match ending at a[i-1], b[j]
        let mut j2len: HashMap<usize, usize> = HashMap::new();

        for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
            let mut new_j2len: HashMap<usize, usize> = HashMap::new();
            if let Some(indices) = self.b2j.get(c) {
                for &j in indices {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    new_j2len.insert(j, k);
                    if k > best_size {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_size = k;
                    }
                }
            }
            j2len = new_j2len;
        }

        // Popular characters are missing from the index; grow the block over them.
        while best_i > alo && best_j > blo && a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < ahi
            && best_j + best_size < bhi
            && a[best_i + best_size] == self.b[best_j + best_size]
        {
            best_size += 1;
        }

        (best_i, best_j, best_size)
    }

    fn matching_chars(&self, a: &[char]) -> usize {
        let mut queue = vec![(0usize, a.len(), 0usize, self.b.len())];
        let mut blocks: Vec<(usize, usize, usize)> = vec![];

        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, k) = self.find_longest_match(a, alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }
            blocks.push((i, j, k));
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                queue.push((i + k, ahi, j + k, bhi));
            }
        }

        blocks.iter().map(|(_, _, k)| k).sum()
    }

    /// Similarity of `a` against the indexed query, in `0.0..=1.0`.
    pub fn ratio(&self, a: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        calculate_ratio(self.matching_chars(&a), a.len() + self.b.len())
    }

    /// Upper bound on [`Self::ratio`] from character multisets alone.
    pub fn quick_ratio(&self, a: &str) -> f64 {
        let mut avail: HashMap<char, isize> = HashMap::new();
        let mut matches = 0usize;
        let mut len_a = 0usize;
        for c in a.chars() {
            len_a += 1;
            let left = avail
                .entry(c)
                .or_insert_with(|| self.full_b_count.get(&c).copied().unwrap_or(0) as isize);
            if *left > 0 {
                matches += 1;
            }
            *left -= 1;
        }
        calculate_ratio(matches, len_a + self.b.len())
    }

    /// Upper bound on [`Self::ratio`] from lengths alone.
    pub fn real_quick_ratio(&self, a: &str) -> f64 {
        let la = a.chars().count();
        let lb = self.b.len();
        calculate_ratio(la.min(lb), la + lb)
    }
}

fn calculate_ratio(matches: usize, length: usize) -> f64 {
    if length == 0 {
        return 1.0;
    }
    2.0 * matches as f64 / length as f64
}

/// Similarity between two strings.
pub fn ratio(a: &str, b: &str) -> f64 {
    SequenceMatcher::new(b).ratio(a)
}

/// Best `limit` entries of `possibilities` whose similarity to `word` is at least
/// `cutoff`, best first. Equal scores are ordered by descending text.
pub fn close_matches<'a, I>(word: &str, possibilities: I, limit: usize, cutoff: f64) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    if limit == 0 {
        return vec![];
    }

    let matcher = SequenceMatcher::new(word);
    let mut scored: Vec<(f64, &'a str)> = possibilities
        .into_iter()
        .filter(|x| matcher.real_quick_ratio(x) >= cutoff && matcher.quick_ratio(x) >= cutoff)
        .filter_map(|x| {
            let score = matcher.ratio(x);
            (score >= cutoff).then_some((score, x))
        })
        .collect();

    scored.sort_by(|(sa, xa), (sb, xb)| sb.total_cmp(sa).then_with(|| xb.cmp(xa)));
    scored.truncate(limit);
    scored.into_iter().map(|(_, x)| x).collect()
}
