//! Line-based unified diff over canonical renderings.
//!
//! The comparator re-serializes both result sets through the canonical
//! formatter and diffs the renderings here; the output is the
//! `failure_details` payload shown to the test author. Deterministic LCS,
//! no timestamps, no color.

use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Equal,
    Delete,
    Insert,
}

/// Edit script between two line slices, as (tag, source index) pairs where
/// the index points into `a` for Equal/Delete and into `b` for Insert.
fn diff_ops(a: &[&str], b: &[&str]) -> Vec<(Tag, usize)> {
    let n = a.len();
    let m = b.len();
    // dp[i][j] = LCS length of a[i..] and b[j..].
    let mut dp = vec![vec![0_u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i][j] = if a[i] == b[j] {
                dp[i + 1][j + 1] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            ops.push((Tag::Equal, i));
            i += 1;
            j += 1;
        } else if dp[i + 1][j] >= dp[i][j + 1] {
            ops.push((Tag::Delete, i));
            i += 1;
        } else {
            ops.push((Tag::Insert, j));
            j += 1;
        }
    }
    while i < n {
        ops.push((Tag::Delete, i));
        i += 1;
    }
    while j < m {
        ops.push((Tag::Insert, j));
        j += 1;
    }
    ops
}

/// Unified diff between `want` and `got` with `context` lines of context.
/// Returns an empty string when the inputs are line-identical.
#[must_use]
pub fn unified_diff(want: &str, got: &str, context: usize) -> String {
    let a: Vec<&str> = want.lines().collect();
    let b: Vec<&str> = got.lines().collect();
    let ops = diff_ops(&a, &b);
    if ops.iter().all(|(tag, _)| *tag == Tag::Equal) {
        return String::new();
    }

    // Group change runs into hunks: two changes belong to the same hunk
    // when separated by at most 2*context equal lines.
    let change_positions: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, (tag, _))| *tag != Tag::Equal)
        .map(|(pos, _)| pos)
        .collect();

    let mut hunk_ranges: Vec<(usize, usize)> = Vec::new();
    for &pos in &change_positions {
        let start = pos.saturating_sub(context);
        let end = (pos + context + 1).min(ops.len());
        match hunk_ranges.last_mut() {
            Some((_, last_end)) if start <= *last_end => {
                *last_end = (*last_end).max(end);
            }
            _ => hunk_ranges.push((start, end)),
        }
    }

    // Line numbers (1-based) at each op position.
    let mut a_line_at = Vec::with_capacity(ops.len() + 1);
    let mut b_line_at = Vec::with_capacity(ops.len() + 1);
    let (mut a_line, mut b_line) = (1_usize, 1_usize);
    for (tag, _) in &ops {
        a_line_at.push(a_line);
        b_line_at.push(b_line);
        match tag {
            Tag::Equal => {
                a_line += 1;
                b_line += 1;
            }
            Tag::Delete => a_line += 1,
            Tag::Insert => b_line += 1,
        }
    }
    a_line_at.push(a_line);
    b_line_at.push(b_line);

    let mut out = String::new();
    out.push_str("--- want\n");
    out.push_str("+++ got\n");
    for (start, end) in hunk_ranges {
        let a_len = a_line_at[end] - a_line_at[start];
        let b_len = b_line_at[end] - b_line_at[start];
        let a_start = if a_len == 0 {
            a_line_at[start] - 1
        } else {
            a_line_at[start]
        };
        let b_start = if b_len == 0 {
            b_line_at[start] - 1
        } else {
            b_line_at[start]
        };
        let _ = writeln!(out, "@@ -{a_start},{a_len} +{b_start},{b_len} @@");
        for &(tag, index) in &ops[start..end] {
            match tag {
                Tag::Equal => {
                    out.push(' ');
                    out.push_str(a[index]);
                }
                Tag::Delete => {
                    out.push('-');
                    out.push_str(a[index]);
                }
                Tag::Insert => {
                    out.push('+');
                    out.push_str(b[index]);
                }
            }
            out.push('\n');
        }
    }
    out
}
