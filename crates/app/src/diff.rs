use std::fmt::Write;

const CONTEXT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op<'a> {
    Equal(&'a str),
    Delete(&'a str),
    Insert(&'a str),
}

impl Op<'_> {
    fn is_change(&self) -> bool {
        !matches!(self, Op::Equal(_))
    }
}

/// Line diff via longest common subsequence. The common prefix and suffix
/// are matched directly, so the table only covers the changed middle.
pub fn diff_lines<'a>(old: &'a str, new: &'a str) -> Vec<Op<'a>> {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let (a_mid, b_mid) = (&a[prefix..a.len() - suffix], &b[prefix..b.len() - suffix]);

    let mut ops = Vec::with_capacity(a.len().max(b.len()));
    ops.extend(a[..prefix].iter().map(|&l| Op::Equal(l)));
    lcs_ops(a_mid, b_mid, &mut ops);
    ops.extend(a[a.len() - suffix..].iter().map(|&l| Op::Equal(l)));
    ops
}

fn lcs_ops<'a>(a: &[&'a str], b: &[&'a str], ops: &mut Vec<Op<'a>>) {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 {
        ops.extend(a.iter().map(|&l| Op::Delete(l)));
        ops.extend(b.iter().map(|&l| Op::Insert(l)));
        return;
    }

    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            ops.push(Op::Equal(a[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            ops.push(Op::Delete(a[i]));
            i += 1;
        } else {
            ops.push(Op::Insert(b[j]));
            j += 1;
        }
    }
    ops.extend(a[i..].iter().map(|&l| Op::Delete(l)));
    ops.extend(b[j..].iter().map(|&l| Op::Insert(l)));
}

/// Unified diff with three lines of context. Empty when the texts match line
/// for line.
pub fn unified(old: &str, new: &str, old_name: &str, new_name: &str) -> String {
    if old == new {
        return String::new();
    }
    let ops = diff_lines(old, new);
    let changes: Vec<usize> = (0..ops.len()).filter(|&i| ops[i].is_change()).collect();
    if changes.is_empty() {
        return String::new();
    }

    // Line numbers (0-based) in each text before each op.
    let mut positions = Vec::with_capacity(ops.len());
    let (mut old_pos, mut new_pos) = (0usize, 0usize);
    for op in &ops {
        positions.push((old_pos, new_pos));
        match op {
            Op::Equal(_) => {
                old_pos += 1;
                new_pos += 1;
            }
            Op::Delete(_) => old_pos += 1,
            Op::Insert(_) => new_pos += 1,
        }
    }

    let mut hunks: Vec<(usize, usize)> = Vec::new();
    for &c in &changes {
        let start = c.saturating_sub(CONTEXT);
        let end = (c + 1 + CONTEXT).min(ops.len());
        match hunks.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => hunks.push((start, end)),
        }
    }

    let mut out = format!("--- {old_name}\n+++ {new_name}\n");
    for (start, end) in hunks {
        let slice = &ops[start..end];
        let old_count = slice.iter().filter(|o| !matches!(o, Op::Insert(_))).count();
        let new_count = slice.iter().filter(|o| !matches!(o, Op::Delete(_))).count();
        let (old_start, new_start) = positions[start];
        let _ = writeln!(
            out,
            "@@ -{},{old_count} +{},{new_count} @@",
            old_start + 1,
            new_start + 1
        );
        for op in slice {
            let _ = match op {
                Op::Equal(l) => writeln!(out, " {l}"),
                Op::Delete(l) => writeln!(out, "-{l}"),
                Op::Insert(l) => writeln!(out, "+{l}"),
            };
        }
    }
    out
}
