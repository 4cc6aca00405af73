//! Sequence similarity ratio (Ratcliff/Obershelp "gestalt" matching).
//!
//! # Algorithm
//!
//! Find the longest contiguous block common to both sequences, then recurse
//! on the pieces to its left and to its right. With `M` the total length of
//! all blocks found this way:
//!
//! ```text
//! ratio = 2 * M / (len(a) + len(b))
//! ```
//!
//! Two empty sequences are identical (`1.0`). When `b` has 200 or more
//! elements, elements occurring in more than `1 + len(b) / 100` positions are
//! treated as "popular" and cannot seed a match, though a match may still be
//! extended across them. Sequences are compared as Unicode scalar values.
//!
//! # Example
//!
//! ```rust
//! use kbchat_runtime::similarity::ratio;
//!
//! assert_eq!(ratio("pricing", "pricing"), 1.0);
//! assert_eq!(ratio("abcd", "bcde"), 0.75);
//! assert_eq!(ratio("", ""), 1.0);
//! ```

use std::collections::{HashMap, HashSet};

/// Minimum length of `b` before popular elements are ignored.
const AUTOJUNK_MIN_LEN: usize = 200;

/// Similarity of `a` and `b` in `[0.0, 1.0]`.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = SequenceMatcher::new(&a, &b).matched_len();
    2.0 * matched as f64 / total as f64
}

/// A longest common block: `a[i..i+size] == b[j..j+size]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    i: usize,
    j: usize,
    size: usize,
}

struct SequenceMatcher<'a> {
    a: &'a [char],
    b: &'a [char],
    /// Positions of every non-popular element of `b`, ascending.
    b2j: HashMap<char, Vec<usize>>,
    popular: HashSet<char>,
}

impl<'a> SequenceMatcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, &c) in b.iter().enumerate() {
            b2j.entry(c).or_default().push(j);
        }

        let mut popular = HashSet::new();
        if b.len() >= AUTOJUNK_MIN_LEN {
            let limit = b.len() / 100 + 1;
            b2j.retain(|&c, positions| {
                let keep = positions.len() <= limit;
                if !keep {
                    popular.insert(c);
                }
                keep
            });
        }

        Self { a, b, b2j, popular }
    }

    /// Sum of the sizes of all matching blocks.
    fn matched_len(&self) -> usize {
        let mut total = 0;
        let mut pending = vec![(0, self.a.len(), 0, self.b.len())];
        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let block = self.find_longest_match(alo, ahi, blo, bhi);
            if block.size == 0 {
                continue;
            }
            total += block.size;
            if alo < block.i && blo < block.j {
                pending.push((alo, block.i, blo, block.j));
            }
            let (i_end, j_end) = (block.i + block.size, block.j + block.size);
            if i_end < ahi && j_end < bhi {
                pending.push((i_end, ahi, j_end, bhi));
            }
        }
        total
    }

    /// Longest block within `a[alo..ahi]` and `b[blo..bhi]`.
    ///
    /// Among equally long blocks the one starting earliest in `a` wins, and
    /// among those the one starting earliest in `b`.
    fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Block {
        let mut best = Block { i: alo, j: blo, size: 0 };

        // j2len[j] = length of the longest block ending at a[i-1], b[j].
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j.checked_sub(1).and_then(|p| j2len.get(&p)).copied().unwrap_or(0) + 1;
                    next.insert(j, k);
                    if k > best.size {
                        best = Block { i: i + 1 - k, j: j + 1 - k, size: k };
                    }
                }
            }
            j2len = next;
        }

        // Popular elements never seed a block but may extend one.
        if !self.popular.is_empty() {
            while best.i > alo && best.j > blo && self.a[best.i - 1] == self.b[best.j - 1] {
                best.i -= 1;
                best.j -= 1;
                best.size += 1;
            }
            while best.i + best.size < ahi
                && best.j + best.size < bhi
                && self.a[best.i + best.size] == self.b[best.j + best.size]
            {
                best.size += 1;
            }
        }

        best
    }
}
