// triplet.rs - Random walk, p-value and breakpoints for one (child, dad, mum) triplet

use std::fmt;
use std::sync::Arc;

use super::ptable::PValueTable;
use super::stats::{siegmund_discrete_approx, Correction};
use crate::data::{RecombinantType, Sequence};

/// Cumulative walk over the active columns of a triplet.
///
/// A column is an up-step when only the dad matches the child, a down-step
/// when only the mum does, and neutral otherwise (including any gap).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RandomWalk {
    heights: Vec<i64>,
    running_max: Vec<i64>,
    up: usize,
    down: usize,
    max_descent: usize,
}

impl RandomWalk {
    pub fn new(child: &Sequence, dad: &Sequence, mum: &Sequence) -> Self {
        let mut walk = Self::default();
        walk.rebuild(child, dad, mum);
        walk
    }

    /// Recompute in place, reusing the height buffers.
    pub fn rebuild(&mut self, child: &Sequence, dad: &Sequence, mum: &Sequence) {
        let len = child.active_len();
        self.up = 0;
        self.down = 0;
        self.max_descent = 0;
        self.heights.clear();
        self.running_max.clear();
        self.heights.reserve(len + 1);
        self.running_max.reserve(len + 1);
        self.heights.push(0);
        self.running_max.push(0);

        let mut height = 0i64;
        let mut max = 0i64;
        for i in 0..len {
            let c = child.active_nucleotide(i);
            let d = dad.active_nucleotide(i);
            let m = mum.active_nucleotide(i);
            if !(c.is_gap() || d.is_gap() || m.is_gap()) {
                if d == c && m != c {
                    self.up += 1;
                    height += 1;
                } else if d != c && m == c {
                    self.down += 1;
                    height -= 1;
                }
            }
            max = max.max(height);
            self.heights.push(height);
            self.running_max.push(max);
            self.max_descent = self.max_descent.max((max - height) as usize);
        }
    }

    /// Build a walk directly from steps: `1` up, `-1` down, `0` neutral.
    pub fn from_steps(steps: &[i8]) -> Self {
        let mut walk = Self {
            heights: vec![0],
            running_max: vec![0],
            ..Default::default()
        };
        let (mut height, mut max) = (0i64, 0i64);
        for &step in steps {
            match step.signum() {
                1 => walk.up += 1,
                -1 => walk.down += 1,
                _ => {}
            }
            height += i64::from(step.signum());
            max = max.max(height);
            walk.heights.push(height);
            walk.running_max.push(max);
            walk.max_descent = walk.max_descent.max((max - height) as usize);
        }
        walk
    }

    pub fn up(&self) -> usize {
        self.up
    }

    pub fn down(&self) -> usize {
        self.down
    }

    pub fn max_descent(&self) -> usize {
        self.max_descent
    }

    /// Heights at positions 0..=L (position 0 is before the first column).
    pub fn heights(&self) -> &[i64] {
        &self.heights
    }

    pub fn running_max(&self) -> &[i64] {
        &self.running_max
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PValue {
    Exact(f64),
    Approximate(f64),
}

impl PValue {
    pub fn value(self) -> f64 {
        match self {
            PValue::Exact(p) | PValue::Approximate(p) => p,
        }
    }

    pub fn is_exact(self) -> bool {
        matches!(self, PValue::Exact(p) if (0.0..=1.0).contains(&p))
    }
}

/// Exact value when the table can answer, else the approximation if accepted.
pub fn compute_p_value(walk: &RandomWalk, table: &PValueTable, accept_approximate: bool) -> Option<PValue> {
    let (m, n, k) = (walk.up, walk.down, walk.max_descent);
    if let Some(p) = table.exact(m, n, k) {
        Some(PValue::Exact(p))
    } else if accept_approximate {
        Some(PValue::Approximate(siegmund_discrete_approx(m, n, k)))
    } else {
        None
    }
}

/// Span in original alignment coordinates where the walk sits at `height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakPoint {
    pub left_bound: usize,
    pub right_bound: usize,
    pub height: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakPointPair {
    pub left: BreakPoint,
    pub right: BreakPoint,
}

impl fmt::Display for BreakPointPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} & {}-{}",
            self.left.left_bound, self.left.right_bound, self.right.left_bound, self.right.right_bound
        )
    }
}

/// Column headers of the results table.
pub fn result_header(simplified: bool) -> Vec<&'static str> {
    if simplified {
        vec![
            "Parent1",
            "Parent2",
            "Child",
            "log10(p)",
            "Dunn_Sidak_Corr(p)",
            "Min_Rec_Length",
            "Breakpoints",
        ]
    } else {
        vec![
            "Parent1",
            "Parent2",
            "Child",
            "m",
            "n",
            "k",
            "p",
            "HS?",
            "log10(p)",
            "Dunn_Sidak_Corr(p)",
            "DS(p)",
            "Min_Rec_Length",
            "Breakpoints",
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Triplet {
    child: Arc<Sequence>,
    dad: Arc<Sequence>,
    mum: Arc<Sequence>,
    walk: RandomWalk,
    p_value: Option<PValue>,
    min_recombinant_length: Option<usize>,
    left_breakpoints: Vec<BreakPoint>,
    right_breakpoints: Vec<BreakPoint>,
    breakpoint_pairs: Vec<BreakPointPair>,
    localized: bool,
}

impl Triplet {
    pub fn new(
        child: Arc<Sequence>,
        dad: Arc<Sequence>,
        mum: Arc<Sequence>,
        table: &PValueTable,
        accept_approximate: bool,
    ) -> Self {
        let walk = RandomWalk::new(&child, &dad, &mum);
        let p_value = compute_p_value(&walk, table, accept_approximate);
        Self {
            child,
            dad,
            mum,
            walk,
            p_value,
            min_recombinant_length: None,
            left_breakpoints: Vec::new(),
            right_breakpoints: Vec::new(),
            breakpoint_pairs: Vec::new(),
            localized: false,
        }
    }

    /// Point a recycled triplet at new sequences and recompute its walk and p-value.
    pub fn reassign(
        &mut self,
        child: Arc<Sequence>,
        dad: Arc<Sequence>,
        mum: Arc<Sequence>,
        table: &PValueTable,
        accept_approximate: bool,
    ) {
        self.child = child;
        self.dad = dad;
        self.mum = mum;
        self.min_recombinant_length = None;
        self.left_breakpoints.clear();
        self.right_breakpoints.clear();
        self.breakpoint_pairs.clear();
        self.localized = false;
        self.walk.rebuild(&self.child, &self.dad, &self.mum);
        self.p_value = compute_p_value(&self.walk, table, accept_approximate);
    }

    pub fn child(&self) -> &Arc<Sequence> {
        &self.child
    }

    pub fn dad(&self) -> &Arc<Sequence> {
        &self.dad
    }

    pub fn mum(&self) -> &Arc<Sequence> {
        &self.mum
    }

    pub fn walk(&self) -> &RandomWalk {
        &self.walk
    }

    pub fn p_value(&self) -> Option<PValue> {
        self.p_value
    }

    pub fn has_p_value(&self) -> bool {
        self.p_value.is_some()
    }

    pub fn has_exact_p_value(&self) -> bool {
        self.p_value.is_some_and(PValue::is_exact)
    }

    pub fn min_recombinant_length(&self) -> Option<usize> {
        self.min_recombinant_length
    }

    pub fn breakpoint_pairs(&self) -> &[BreakPointPair] {
        &self.breakpoint_pairs
    }

    pub fn breakpoints_computed(&self) -> bool {
        !self.breakpoint_pairs.is_empty()
    }

    /// Better evidence: has a p-value when `other` doesn't, a smaller one,
    /// or an equal one with a longer minimal recombinant segment.
    pub fn statistically_better(&self, other: &Triplet) -> bool {
        match (self.p_value, other.p_value) {
            (Some(_), None) => true,
            (Some(mine), Some(theirs)) => {
                let (mine, theirs) = (mine.value(), theirs.value());
                mine < theirs
                    || (mine == theirs
                        && self.min_recombinant_length.unwrap_or(0) > other.min_recombinant_length.unwrap_or(0))
            }
            _ => false,
        }
    }

    /// Tab-separated names and step counts, as written for skipped triplets.
    pub fn info(&self) -> Vec<String> {
        vec![
            self.dad.name().to_string(),
            self.mum.name().to_string(),
            self.child.name().to_string(),
            self.walk.up.to_string(),
            self.walk.down.to_string(),
            self.walk.max_descent.to_string(),
        ]
    }

    /// Find breakpoint pairs and the minimal recombinant length, upgrading
    /// the child to Long when that length reaches `long_threshold`.
    pub fn localize_breakpoints(&mut self, long_threshold: usize) {
        if self.localized {
            return;
        }
        self.localized = true;

        if self.walk.max_descent == 0 || self.child.active_len() == 0 {
            return;
        }
        self.seek_breakpoints();

        let k = self.walk.max_descent as i64;
        let mut min_length: Option<usize> = None;

        // leftmost breakpoints sit at the end of both lists
        for left in self.left_breakpoints.iter().rev() {
            for right in self.right_breakpoints.iter().rev() {
                if left.right_bound >= right.left_bound {
                    continue;
                }
                if left.height - right.height != k {
                    break;
                }
                self.breakpoint_pairs.push(BreakPointPair {
                    left: *left,
                    right: *right,
                });

                let mum_segment = self.count_non_gapped_sites(left.right_bound, right.left_bound);
                let dad_segment = self.count_non_gapped_sites(0, left.left_bound)
                    + self.count_non_gapped_sites(right.right_bound, self.child.full_len());
                let shortest = mum_segment.min(dad_segment);
                min_length = Some(min_length.map_or(shortest, |m| m.min(shortest)));
            }
        }

        self.min_recombinant_length = min_length;
        if let Some(length) = min_length {
            if length >= long_threshold && self.child.recombinant_type() == RecombinantType::Short {
                self.child.upgrade_recombinant_type(RecombinantType::Long);
            }
        }
    }

    fn seek_breakpoints(&mut self) {
        let heights = &self.walk.heights;
        let running_max = &self.walk.running_max;
        let k = self.walk.max_descent as i64;

        let mut left_target: Option<i64> = None;
        let mut pos = heights.len();
        while pos > 0 {
            pos -= 1;
            if running_max[pos] == heights[pos] + k {
                let breakpoint = self.build_breakpoint(&mut pos, true);
                self.right_breakpoints.push(breakpoint);
                left_target = Some(running_max[pos]);
            } else if Some(heights[pos]) == left_target && !self.right_breakpoints.is_empty() {
                let breakpoint = self.build_breakpoint(&mut pos, false);
                self.left_breakpoints.push(breakpoint);
            }
        }
    }

    /// Collapse the equal-height run ending at `pos` into one breakpoint.
    /// `pos` is left at the start of the run.
    fn build_breakpoint(&self, pos: &mut usize, is_right: bool) -> BreakPoint {
        let heights = &self.walk.heights;
        let mut right_index = *pos;
        while *pos > 0 && heights[*pos - 1] == heights[*pos] {
            *pos -= 1;
        }
        let mut left_index = *pos;

        if is_right {
            // point at the end of the mum segment
            left_index = left_index.saturating_sub(1);
            right_index = right_index.saturating_sub(1);
        }

        let active_len = self.child.active_len();
        let mut left_bound = if left_index > 0 {
            self.child.original_position(left_index - 1) + 1
        } else {
            0
        };
        let mut right_bound = if right_index + 1 < active_len {
            self.child.original_position(right_index + 1) - 1
        } else {
            self.child.full_len() - 1
        };

        if is_right {
            left_bound += 1;
            right_bound += 1;
        }

        BreakPoint {
            left_bound,
            right_bound,
            height: heights[*pos],
        }
    }

    /// Sites in `[from, to)` where none of the three sequences has a gap.
    fn count_non_gapped_sites(&self, from: usize, to: usize) -> usize {
        let (child, dad, mum) = (self.child.nucleotides(), self.dad.nucleotides(), self.mum.nucleotides());
        (from..to.min(child.len()))
            .filter(|&i| !child[i].is_gap() && !dad[i].is_gap() && !mum[i].is_gap())
            .count()
    }

    /// One results-table row.
    pub fn to_record(&self, correction: &Correction, simplified: bool) -> Vec<String> {
        let p = self.p_value.map_or(f64::NAN, PValue::value);
        let dunn_sidak = correction.dunn_sidak(p);

        let mut record = vec![
            self.dad.name().to_string(),
            self.mum.name().to_string(),
            self.child.name().to_string(),
        ];
        if simplified {
            record.push(format!("{:.4}", p.log10()));
            record.push(format!("{:.6e}", dunn_sidak));
        } else {
            record.push(self.walk.up.to_string());
            record.push(self.walk.down.to_string());
            record.push(self.walk.max_descent.to_string());
            record.push(format!("{:.12}", p));
            record.push(u8::from(!self.has_exact_p_value()).to_string());
            record.push(format!("{:.4}", p.log10()));
            record.push(format!("{:.5}", dunn_sidak));
            record.push(format!("{:.6e}", dunn_sidak));
        }

        if self.breakpoints_computed() {
            if let Some(length) = self.min_recombinant_length {
                record.push(length.to_string());
            }
            record.extend(self.breakpoint_pairs.iter().map(BreakPointPair::to_string));
        }
        record
    }
}
