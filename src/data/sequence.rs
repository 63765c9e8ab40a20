// sequence.rs - Aligned DNA sequences with recombination status

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::NaiveDate;
use regex::Regex;

/// One aligned site. Anything that is not A/C/G/T (after U -> T) is a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nucleotide {
    A,
    C,
    G,
    T,
    Gap,
}

impl Nucleotide {
    pub fn from_byte(byte: u8) -> Self {
        match byte.to_ascii_uppercase() {
            b'A' => Nucleotide::A,
            b'C' => Nucleotide::C,
            b'G' => Nucleotide::G,
            b'T' | b'U' => Nucleotide::T,
            _ => Nucleotide::Gap,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Nucleotide::A => 'A',
            Nucleotide::C => 'C',
            Nucleotide::G => 'G',
            Nucleotide::T => 'T',
            Nucleotide::Gap => '-',
        }
    }

    pub fn is_gap(self) -> bool {
        self == Nucleotide::Gap
    }

    /// Bit used in allelic column masks; gaps have no bit.
    pub(crate) fn allele_bit(self) -> u8 {
        match self {
            Nucleotide::A => 0b0001,
            Nucleotide::C => 0b0010,
            Nucleotide::G => 0b0100,
            Nucleotide::T => 0b1000,
            Nucleotide::Gap => 0,
        }
    }
}

/// Verdict accumulated for a child sequence. Ordered so that upgrades are `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum RecombinantType {
    NotRecombinant = 0,
    Short = 1,
    Long = 2,
}

impl RecombinantType {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RecombinantType::NotRecombinant,
            1 => RecombinantType::Short,
            _ => RecombinantType::Long,
        }
    }
}

impl fmt::Display for RecombinantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecombinantType::NotRecombinant => "not recombinant",
            RecombinantType::Short => "short",
            RecombinantType::Long => "long",
        };
        f.write_str(label)
    }
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{4})([^0-9])(\d{2})([^0-9])(\d{2})").expect("date pattern is valid")
    })
}

/// First `YYYY?MM?DD` date (any non-digit separators) found in `text`.
pub fn parse_header_date(text: &str) -> Option<NaiveDate> {
    let captures = date_pattern().captures(text)?;
    let year = captures.get(1)?.as_str().parse().ok()?;
    let month = captures.get(3)?.as_str().parse().ok()?;
    let day = captures.get(5)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[derive(Debug)]
pub struct Sequence {
    name: String,
    nucleotides: Vec<Nucleotide>,
    date: Option<NaiveDate>,
    active_positions: Option<Arc<[usize]>>,
    recombinant_type: AtomicU8,
}

impl Sequence {
    /// Build a sequence from raw residues; the collection date is read from the name.
    pub fn new(name: impl Into<String>, residues: &[u8]) -> Self {
        let name = name.into();
        let date = parse_header_date(&name);
        let nucleotides = residues
            .iter()
            .filter(|b| !b.is_ascii_whitespace())
            .map(|&b| Nucleotide::from_byte(b))
            .collect();
        Self {
            name,
            nucleotides,
            date,
            active_positions: None,
            recombinant_type: AtomicU8::new(RecombinantType::NotRecombinant as u8),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_len(&self) -> usize {
        self.nucleotides.len()
    }

    pub fn nucleotides(&self) -> &[Nucleotide] {
        &self.nucleotides
    }

    pub fn nucleotide(&self, position: usize) -> Nucleotide {
        self.nucleotides[position]
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    /// Restrict the sequence to the given alignment columns.
    pub fn set_active_positions(&mut self, positions: Arc<[usize]>) {
        self.active_positions = Some(positions);
    }

    pub fn active_len(&self) -> usize {
        match &self.active_positions {
            Some(positions) => positions.len(),
            None => self.nucleotides.len(),
        }
    }

    /// Alignment column of the `index`-th active site.
    pub fn original_position(&self, index: usize) -> usize {
        match &self.active_positions {
            Some(positions) => positions[index],
            None => index,
        }
    }

    pub fn active_nucleotide(&self, index: usize) -> Nucleotide {
        self.nucleotides[self.original_position(index)]
    }

    pub fn active_nucleotides(&self) -> impl Iterator<Item = Nucleotide> + '_ {
        (0..self.active_len()).map(move |i| self.active_nucleotide(i))
    }

    pub fn count_gaps(&self) -> usize {
        self.active_nucleotides().filter(|n| n.is_gap()).count()
    }

    /// Hamming distance over active sites, optionally skipping sites where either is a gap.
    pub fn distance(&self, other: &Sequence, ignore_gaps: bool) -> usize {
        self.active_nucleotides()
            .zip(other.active_nucleotides())
            .filter(|(a, b)| !(ignore_gaps && (a.is_gap() || b.is_gap())) && a != b)
            .count()
    }

    /// True when every non-gap site of `self` matches `other`.
    pub fn is_similar_with_gaps(&self, other: &Sequence) -> bool {
        self.active_nucleotides()
            .zip(other.active_nucleotides())
            .all(|(a, b)| a.is_gap() || a == b)
    }

    /// True when both dates are known and `other` was collected more than
    /// `threshold_secs` after `self`.
    pub fn is_older_than(&self, other: &Sequence, threshold_secs: i64) -> bool {
        match (self.date, other.date) {
            (Some(mine), Some(theirs)) => (theirs - mine).num_seconds() > threshold_secs,
            _ => false,
        }
    }

    pub fn recombinant_type(&self) -> RecombinantType {
        RecombinantType::from_u8(self.recombinant_type.load(Ordering::Relaxed))
    }

    /// Raise the classification to at least `kind`; never downgrades.
    pub fn upgrade_recombinant_type(&self, kind: RecombinantType) {
        self.recombinant_type.fetch_max(kind as u8, Ordering::Relaxed);
    }

    pub fn to_active_string(&self) -> String {
        self.active_nucleotides().map(Nucleotide::as_char).collect()
    }
}
