//! Approximate string matching.
//!
//! `ratio` follows the Ratcliff/Obershelp measure used by Python's difflib:
//! twice the number of matched characters over the combined length, where
//! matches are found by recursively taking the longest common block.

/// Similarity in `[0.0, 1.0]`.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (start_a, start_b, size) = longest_block(a, b);
    if size == 0 {
        return 0;
    }
    size + matching_chars(&a[..start_a], &b[..start_b])
        + matching_chars(&a[start_a + size..], &b[start_b + size..])
}

/// Longest common contiguous block; earliest in `a`, then in `b`, on ties.
fn longest_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut previous = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut current = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                current[j + 1] = previous[j] + 1;
                let size = current[j + 1];
                if size > best.2 {
                    best = (i + 1 - size, j + 1 - size, size);
                }
            }
        }
        previous = current;
    }
    best
}

/// Candidates scoring at or above `cutoff`, best first. Ties keep input order.
pub fn close_matches<'a>(word: &str, candidates: &[&'a str], cutoff: f64) -> Vec<(&'a str, f64)> {
    let mut scored: Vec<(&'a str, f64)> = candidates
        .iter()
        .map(|candidate| (*candidate, ratio(word, candidate)))
        .filter(|(_, score)| *score >= cutoff)
        .collect();
    scored.sort_by(|x, y| y.1.partial_cmp(&x.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

/// Levenshtein edit distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for i in 1..=a_chars.len() {
        curr[0] = i;
        for j in 1..=b_chars.len() {
            let cost = if a_chars[i - 1] == b_chars[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_matches_difflib_values() {
        assert!((ratio("abcd", "bcde") - 0.75).abs() < 1e-9);
        assert!((ratio("po files", "files") - 10.0 / 13.0).abs() < 1e-9);
        assert_eq!(ratio("stats", "stats"), 1.0);
        assert_eq!(ratio("", ""), 1.0);
        assert_eq!(ratio("abc", "xyz"), 0.0);
    }

    #[test]
    fn close_matches_orders_and_cuts() {
        let matches = close_matches("stat", &["diff", "stats"], 0.6);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].0, "stats");
    }

    #[test]
    fn levenshtein_counts_edits() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("clone", "clone"), 0);
    }
}
