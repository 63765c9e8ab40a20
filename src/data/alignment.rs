// alignment.rs - Parent/child sequence pools over a fixed-width alignment

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};

use super::sequence::{Nucleotide, Sequence};
use crate::error::RecError;

/// Alleles and gaps seen in one alignment column, plus its polymorphism class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllelicMask(u8);

impl AllelicMask {
    pub const EMPTY: AllelicMask = AllelicMask(0);
    pub const GAP: AllelicMask = AllelicMask(0b0000_0001);
    pub const MONO: AllelicMask = AllelicMask(0b0010_0000);
    pub const BI: AllelicMask = AllelicMask(0b0100_0000);
    pub const TRI: AllelicMask = AllelicMask(0b1000_0000);
    pub const TETRA: AllelicMask = AllelicMask(0b0001_1110);
    const ALL_ALLELES_AND_GAP: u8 = 0b0001_1111;

    fn with_nucleotide(self, nucleotide: Nucleotide) -> Self {
        match nucleotide {
            Nucleotide::Gap => AllelicMask(self.0 | Self::GAP.0),
            other => AllelicMask(self.0 | (other.allele_bit() << 1)),
        }
    }

    /// True when every bit of `other` is set in `self`.
    pub fn contains(self, other: AllelicMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn allele_count(self) -> u32 {
        (self.0 & Self::TETRA.0).count_ones()
    }

    pub fn is_polymorphic(self) -> bool {
        self.contains(Self::BI) || self.contains(Self::TRI) || self.contains(Self::TETRA)
    }

    /// Mask of one column over the given sequences.
    pub fn of_column<'a>(sequences: impl IntoIterator<Item = &'a Sequence>, column: usize) -> Self {
        let mut mask = Self::EMPTY;
        for sequence in sequences {
            mask = mask.with_nucleotide(sequence.nucleotide(column));
            if mask.0 & Self::ALL_ALLELES_AND_GAP == Self::ALL_ALLELES_AND_GAP {
                break;
            }
        }
        let class = match mask.allele_count() {
            1 => Self::MONO.0,
            2 => Self::BI.0,
            3 => Self::TRI.0,
            _ => 0,
        };
        AllelicMask(mask.0 | class)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStatus {
    Excluded,
    Inactive,
    Active,
}

/// Ordered sequence collection with a per-sequence status.
#[derive(Debug, Default, Clone)]
pub struct SequencePool {
    sequences: Vec<Arc<Sequence>>,
    statuses: Vec<SequenceStatus>,
}

impl SequencePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sequence as Active. Names must be unique and lengths equal.
    pub fn add(&mut self, sequence: Arc<Sequence>) -> Result<(), RecError> {
        if let Some(first) = self.sequences.first() {
            if first.active_len() != sequence.active_len() {
                return Err(RecError::Alignment(format!(
                    "unmatched sequence length in '{}' (expected: {}, received: {})",
                    sequence.name(),
                    first.active_len(),
                    sequence.active_len()
                )));
            }
        }
        if self.find_by_name(sequence.name()).is_some() {
            return Err(RecError::Alignment(format!(
                "duplicate sequence name detected: {}",
                sequence.name()
            )));
        }
        self.sequences.push(sequence);
        self.statuses.push(SequenceStatus::Active);
        Ok(())
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Arc<Sequence>> {
        self.sequences.iter().find(|s| s.name() == name)
    }

    pub fn all(&self) -> &[Arc<Sequence>] {
        &self.sequences
    }

    pub fn status(&self, index: usize) -> SequenceStatus {
        self.statuses[index]
    }

    /// Active and inactive sequences.
    pub fn used(&self) -> Vec<Arc<Sequence>> {
        self.with_status(|s| s != SequenceStatus::Excluded)
    }

    pub fn active(&self) -> Vec<Arc<Sequence>> {
        self.with_status(|s| s == SequenceStatus::Active)
    }

    fn with_status(&self, keep: impl Fn(SequenceStatus) -> bool) -> Vec<Arc<Sequence>> {
        self.sequences
            .iter()
            .zip(&self.statuses)
            .filter(|(_, status)| keep(**status))
            .map(|(sequence, _)| Arc::clone(sequence))
            .collect()
    }

    pub fn all_count(&self) -> usize {
        self.sequences.len()
    }

    pub fn used_count(&self) -> usize {
        self.statuses.iter().filter(|s| **s != SequenceStatus::Excluded).count()
    }

    pub fn active_count(&self) -> usize {
        self.statuses.iter().filter(|s| **s == SequenceStatus::Active).count()
    }

    /// Number of non-excluded sequences not gap-similar to any other.
    pub fn distinct_count(&self) -> usize {
        let live: Vec<usize> = (0..self.sequences.len())
            .filter(|&i| self.statuses[i] != SequenceStatus::Excluded)
            .collect();
        live.iter()
            .filter(|&&i| {
                !live
                    .iter()
                    .any(|&j| j != i && self.sequences[i].is_similar_with_gaps(&self.sequences[j]))
            })
            .count()
    }

    /// Exclude every sequence that is gap-similar to an earlier kept one.
    pub fn exclude_non_distinct_sequences(&mut self) {
        let count = self.sequences.len();
        for i in 0..count {
            if self.statuses[i] == SequenceStatus::Excluded {
                continue;
            }
            for j in 0..count {
                if j == i || self.statuses[j] == SequenceStatus::Excluded {
                    continue;
                }
                if self.sequences[j].is_similar_with_gaps(&self.sequences[i]) {
                    self.statuses[j] = SequenceStatus::Excluded;
                }
            }
        }
    }

    /// For each pair within `max_distance` (gap-ignoring), exclude the one with more gaps.
    pub fn exclude_neighboring_sequences(&mut self, max_distance: usize) {
        if max_distance == 0 {
            return self.exclude_non_distinct_sequences();
        }

        let count = self.sequences.len();
        let gap_counts: Vec<usize> = self.sequences.iter().map(|s| s.count_gaps()).collect();

        for i in 0..count {
            if self.statuses[i] == SequenceStatus::Excluded {
                continue;
            }
            for j in (i + 1)..count {
                if self.statuses[j] == SequenceStatus::Excluded {
                    continue;
                }
                if self.sequences[i].distance(&self.sequences[j], true) <= max_distance {
                    if gap_counts[i] <= gap_counts[j] {
                        self.statuses[j] = SequenceStatus::Excluded;
                    } else {
                        self.statuses[i] = SequenceStatus::Excluded;
                        break;
                    }
                }
            }
        }
    }
}

/// Triplets that can be formed from all, used, and active sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TripletCounts {
    pub all: u64,
    pub used: u64,
    pub active: u64,
}

impl TripletCounts {
    fn count(children: usize, parents: usize) -> u64 {
        if parents >= 2 && children >= 1 {
            children as u64 * parents as u64 * (parents as u64 - 1)
        } else {
            0
        }
    }
}

/// Column statistics over the active columns of an alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllelicStats {
    pub monoallelic: usize,
    pub biallelic: usize,
    pub triallelic: usize,
    pub tetrallelic: usize,
    pub only_gaps: usize,
    pub no_gap: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PairwiseDistanceStats {
    pub comparisons: usize,
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub mean_per_site: f64,
}

#[derive(Debug)]
pub struct Alignment {
    parents: SequencePool,
    children: SequencePool,
    single_pool: bool,
    full_len: usize,
    active_positions: Arc<[usize]>,
    masks: Vec<AllelicMask>,
}

impl Alignment {
    /// Build an alignment. Without `children`, every sequence is both parent and child.
    ///
    /// Unless `use_all_sites` is set, monomorphic columns are dropped from the
    /// active positions shared by all sequences.
    pub fn new(
        parents: Vec<Sequence>,
        children: Option<Vec<Sequence>>,
        use_all_sites: bool,
    ) -> Result<Self, RecError> {
        let full_len = parents
            .first()
            .or_else(|| children.as_ref().and_then(|c| c.first()))
            .map(Sequence::full_len)
            .ok_or_else(|| {
                RecError::Alignment("the alignment does not contain any sequences".to_string())
            })?;

        for sequence in parents.iter().chain(children.iter().flatten()) {
            if sequence.full_len() != full_len {
                return Err(RecError::Alignment(format!(
                    "unmatched sequence length in '{}' (expected: {}, received: {})",
                    sequence.name(),
                    full_len,
                    sequence.full_len()
                )));
            }
        }

        let masks: Vec<AllelicMask> = (0..full_len)
            .map(|column| AllelicMask::of_column(parents.iter().chain(children.iter().flatten()), column))
            .collect();

        let positions: Vec<usize> = if use_all_sites {
            (0..full_len).collect()
        } else {
            info!("Sequence length: {}", full_len);
            let polymorphic: Vec<usize> = (0..full_len).filter(|&c| masks[c].is_polymorphic()).collect();
            if polymorphic.is_empty() {
                return Err(RecError::Alignment(
                    "the alignment does not contain any polymorphic columns".to_string(),
                ));
            }
            info!("Number of polymorphic sites: {}", polymorphic.len());
            polymorphic
        };
        let active_positions: Arc<[usize]> = Arc::from(positions);

        let wrap = |sequences: Vec<Sequence>| -> Vec<Arc<Sequence>> {
            sequences
                .into_iter()
                .map(|mut s| {
                    s.set_active_positions(Arc::clone(&active_positions));
                    Arc::new(s)
                })
                .collect()
        };

        let single_pool = children.is_none();
        let parent_sequences = wrap(parents);
        let child_sequences = match children {
            Some(children) => wrap(children),
            None => parent_sequences.clone(),
        };

        let mut parent_pool = SequencePool::new();
        for sequence in parent_sequences {
            parent_pool.add(sequence)?;
        }
        let mut child_pool = SequencePool::new();
        for sequence in child_sequences {
            child_pool.add(sequence)?;
        }

        Ok(Self {
            parents: parent_pool,
            children: child_pool,
            single_pool,
            full_len,
            active_positions,
            masks,
        })
    }

    pub fn full_len(&self) -> usize {
        self.full_len
    }

    pub fn active_len(&self) -> usize {
        self.active_positions.len()
    }

    pub fn is_single_pool(&self) -> bool {
        self.single_pool
    }

    pub fn parent_pool(&self) -> &SequencePool {
        &self.parents
    }

    pub fn parent_pool_mut(&mut self) -> &mut SequencePool {
        &mut self.parents
    }

    pub fn child_pool(&self) -> &SequencePool {
        &self.children
    }

    pub fn active_parents(&self) -> Vec<Arc<Sequence>> {
        self.parents.active()
    }

    pub fn active_children(&self) -> Vec<Arc<Sequence>> {
        self.children.active()
    }

    /// Parent and child sequences that are not excluded, each listed once.
    pub fn used_sequences(&self) -> Vec<Arc<Sequence>> {
        let mut seen = HashSet::new();
        let mut used = self.parents.used();
        if !self.single_pool {
            used.extend(self.children.used());
        }
        used.retain(|s| seen.insert(Arc::as_ptr(s)));
        used
    }

    pub fn triplet_counts(&self) -> TripletCounts {
        let shared = usize::from(self.single_pool);
        let parents = |n: usize| n.saturating_sub(shared);
        TripletCounts {
            all: TripletCounts::count(self.children.all_count(), parents(self.parents.all_count())),
            used: TripletCounts::count(self.children.used_count(), parents(self.parents.used_count())),
            active: TripletCounts::count(self.children.active_count(), parents(self.parents.active_count())),
        }
    }

    pub fn allelic_stats(&self) -> AllelicStats {
        let mut stats = AllelicStats::default();
        for &column in self.active_positions.iter() {
            let mask = self.masks[column];
            if mask == AllelicMask::GAP {
                stats.only_gaps += 1;
                continue;
            }
            if !mask.contains(AllelicMask::GAP) {
                stats.no_gap += 1;
            }
            if mask.contains(AllelicMask::MONO) {
                stats.monoallelic += 1;
            } else if mask.contains(AllelicMask::BI) {
                stats.biallelic += 1;
            } else if mask.contains(AllelicMask::TRI) {
                stats.triallelic += 1;
            } else if mask.contains(AllelicMask::TETRA) {
                stats.tetrallelic += 1;
            }
        }
        stats
    }

    /// Gap-ignoring distances between every active parent and active child.
    pub fn pairwise_distance_stats(&self) -> PairwiseDistanceStats {
        let mut stats = PairwiseDistanceStats {
            min: usize::MAX,
            ..Default::default()
        };
        let mut total = 0.0;
        let children = self.active_children();
        for parent in self.active_parents() {
            for child in &children {
                if Arc::ptr_eq(&parent, child) {
                    continue;
                }
                let distance = child.distance(&parent, true);
                stats.comparisons += 1;
                total += distance as f64;
                stats.min = stats.min.min(distance);
                stats.max = stats.max.max(distance);
            }
        }
        if stats.comparisons == 0 {
            stats.min = 0;
            return stats;
        }
        stats.mean = total / stats.comparisons as f64;
        if self.active_len() > 0 {
            stats.mean_per_site = stats.mean / self.active_len() as f64;
        }
        stats
    }

    /// Log allelic and distance summaries at debug level.
    pub fn log_summary(&self) {
        let allelic = self.allelic_stats();
        debug!(
            "Active columns: {} mono, {} bi, {} tri, {} tetra-allelic, {} gap-only, {} without gaps",
            allelic.monoallelic,
            allelic.biallelic,
            allelic.triallelic,
            allelic.tetrallelic,
            allelic.only_gaps,
            allelic.no_gap
        );
        if log::log_enabled!(log::Level::Debug) {
            let distances = self.pairwise_distance_stats();
            debug!(
                "Pairwise distances over {} comparisons: min {}, max {}, mean {:.3} ({:.5} per site)",
                distances.comparisons, distances.min, distances.max, distances.mean, distances.mean_per_site
            );
        }
    }
}
