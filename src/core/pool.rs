// pool.rs - Triplet recycling and per-child retention

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ptable::PValueTable;
use super::stats::Correction;
use super::triplet::{result_header, Triplet};
use crate::data::Sequence;
use crate::error::RecError;

/// How many significant triplets are kept per child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageMode {
    /// Keep only the statistically best triplet.
    #[default]
    BestTriplet,
    /// Keep every significant triplet.
    AllTriplets,
}

/// Free list of reusable triplets plus the triplets retained for each child.
///
/// Children are keyed by their index in the active child list, so iteration
/// order (and therefore output order) follows the alignment.
#[derive(Debug, Default)]
pub struct TripletPool {
    mode: StorageMode,
    free: Vec<Triplet>,
    retained: BTreeMap<usize, Vec<Triplet>>,
    longest_min_length: usize,
}

impl TripletPool {
    pub fn new(mode: StorageMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    /// A triplet for (child, dad, mum), recycled from the free list when possible.
    pub fn acquire(
        &mut self,
        child: &Arc<Sequence>,
        dad: &Arc<Sequence>,
        mum: &Arc<Sequence>,
        table: &PValueTable,
        accept_approximate: bool,
    ) -> Triplet {
        match self.free.pop() {
            Some(mut triplet) => {
                triplet.reassign(Arc::clone(child), Arc::clone(dad), Arc::clone(mum), table, accept_approximate);
                triplet
            }
            None => Triplet::new(Arc::clone(child), Arc::clone(dad), Arc::clone(mum), table, accept_approximate),
        }
    }

    /// Hand a triplet back for reuse.
    pub fn release(&mut self, triplet: Triplet) {
        self.free.push(triplet);
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Keep `triplet` for the child at `child_index` according to the storage mode.
    pub fn retain(&mut self, child_index: usize, triplet: Triplet) {
        let kept = self.retained.entry(child_index).or_default();
        match (self.mode, kept.first_mut()) {
            (_, None) | (StorageMode::AllTriplets, Some(_)) => kept.push(triplet),
            (StorageMode::BestTriplet, Some(best)) => {
                let loser = if triplet.statistically_better(best) {
                    std::mem::replace(best, triplet)
                } else {
                    triplet
                };
                self.free.push(loser);
            }
        }
    }

    /// Move everything retained by `other` into this pool, keeping its free list too.
    pub fn absorb(&mut self, other: TripletPool) {
        for (child_index, triplets) in other.retained {
            for triplet in triplets {
                self.retain(child_index, triplet);
            }
        }
        self.free.extend(other.free);
        self.longest_min_length = self.longest_min_length.max(other.longest_min_length);
    }

    /// Move the retained triplets into a new pool; the free list stays here.
    pub fn take_retained(&mut self) -> TripletPool {
        TripletPool {
            mode: self.mode,
            free: Vec::new(),
            retained: std::mem::take(&mut self.retained),
            longest_min_length: std::mem::take(&mut self.longest_min_length),
        }
    }

    /// Indices of children with at least one retained triplet.
    pub fn children(&self) -> impl Iterator<Item = usize> + '_ {
        self.retained.keys().copied()
    }

    pub fn retained_for(&self, child_index: usize) -> &[Triplet] {
        self.retained.get(&child_index).map_or(&[], Vec::as_slice)
    }

    pub fn retained_count(&self) -> usize {
        self.retained.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triplet> {
        self.retained.values().flatten()
    }

    /// Localize breakpoints for every triplet kept for one child.
    pub fn seek_breakpoint_pairs(&mut self, child_index: usize, long_threshold: usize) {
        let Some(triplets) = self.retained.get_mut(&child_index) else {
            return;
        };
        for triplet in triplets.iter_mut() {
            triplet.localize_breakpoints(long_threshold);
            if let Some(length) = triplet.min_recombinant_length() {
                self.longest_min_length = self.longest_min_length.max(length);
            }
        }
    }

    /// Longest minimal recombinant length seen by `seek_breakpoint_pairs`.
    pub fn longest_min_length(&self) -> usize {
        self.longest_min_length
    }

    /// Header row followed by one row per retained triplet.
    pub fn write_all<W: Write>(
        &self,
        writer: &mut csv::Writer<W>,
        correction: &Correction,
        simplified: bool,
    ) -> Result<(), RecError> {
        writer.write_record(result_header(simplified))?;
        for triplet in self.iter() {
            writer.write_record(triplet.to_record(correction, simplified))?;
        }
        writer
            .flush()
            .map_err(|e| RecError::Output(format!("cannot flush results: {}", e)))?;
        Ok(())
    }
}
