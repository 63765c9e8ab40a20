// file.rs - Binary p-value table format
//
// Layout (little-endian):
//   8 bytes  marker "P-table\0"
//   i32      size of an int on the producing system (4)
//   i32      mSize, nSize, kSize
//   f32 * N  stored values in offset-index order

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::info;

use super::{PValueTable, TableSize};
use crate::error::RecError;

pub const FILE_MARKER: &[u8; 8] = b"P-table\0";
pub const INT_SIZE: i32 = std::mem::size_of::<i32>() as i32;

const HEADER_LEN: u64 = FILE_MARKER.len() as u64 + 4 * 4;

/// Reasons a table file cannot be loaded.
#[derive(Debug, thiserror::Error)]
pub enum PTableLoadError {
    #[error("not a p-value table file: {0}")]
    InvalidFile(String),

    #[error("table was written on an incompatible architecture (int size {found}, expected {})", INT_SIZE)]
    WrongArchitecture { found: i32 },

    #[error("table file is corrupt: {0}")]
    Corrupt(String),
}

pub(super) fn save(table: &PValueTable, path: &Path) -> Result<(), RecError> {
    let size = table.size();
    let to_i32 = |v: usize| {
        i32::try_from(v).map_err(|_| RecError::Config(format!("table dimension {} does not fit the file format", v)))
    };
    let (m, n, k) = (to_i32(size.m)?, to_i32(size.n)?, to_i32(size.k)?);

    let file = File::create(path).map_err(|e| RecError::io(e, path))?;
    let mut writer = BufWriter::new(file);

    let write_all = |writer: &mut BufWriter<File>| -> std::io::Result<()> {
        writer.write_all(FILE_MARKER)?;
        writer.write_i32::<LittleEndian>(INT_SIZE)?;
        writer.write_i32::<LittleEndian>(m)?;
        writer.write_i32::<LittleEndian>(n)?;
        writer.write_i32::<LittleEndian>(k)?;
        for value in table.values() {
            writer.write_f32::<LittleEndian>(*value)?;
        }
        writer.flush()
    };
    write_all(&mut writer).map_err(|e| RecError::io(e, path))?;

    info!("Saved {} p-value table to {}", size, path.display());
    Ok(())
}

pub(super) fn load(path: &Path) -> Result<PValueTable, PTableLoadError> {
    let file = File::open(path)
        .map_err(|e| PTableLoadError::InvalidFile(format!("{}: {}", path.display(), e)))?;
    let file_len = file
        .metadata()
        .map_err(|e| PTableLoadError::InvalidFile(format!("{}: {}", path.display(), e)))?
        .len();
    let mut reader = BufReader::new(file);

    let mut marker = [0u8; 8];
    reader
        .read_exact(&mut marker)
        .map_err(|_| PTableLoadError::InvalidFile("missing file marker".to_string()))?;
    if &marker != FILE_MARKER {
        return Err(PTableLoadError::InvalidFile("file marker mismatch".to_string()));
    }

    let truncated_header = |_: std::io::Error| PTableLoadError::Corrupt("truncated header".to_string());
    let int_size = reader
        .read_i32::<LittleEndian>()
        .map_err(|_| PTableLoadError::InvalidFile("missing int size field".to_string()))?;
    if int_size != INT_SIZE {
        return Err(PTableLoadError::WrongArchitecture { found: int_size });
    }
    let m = reader.read_i32::<LittleEndian>().map_err(truncated_header)?;
    let n = reader.read_i32::<LittleEndian>().map_err(truncated_header)?;
    let k = reader.read_i32::<LittleEndian>().map_err(truncated_header)?;

    // below 2 in any dimension nothing is stored and the size guard below is void
    if m < 2 || n < 2 || k < 2 {
        return Err(PTableLoadError::Corrupt(format!(
            "invalid table dimensions {} * {} * {}",
            m, n, k
        )));
    }
    let size = TableSize::new(m as usize, n as usize, k as usize);
    info!("Loading p-value table from {} (table size: {})", path.display(), size);

    // Each m contributes at least one stored value per n in 2..=min(n, k)
    let min_values = size.m as u64 * (size.n.min(size.k) as u64).saturating_sub(1);
    let available = (file_len.saturating_sub(HEADER_LEN)) / 4;
    if available < min_values {
        return Err(PTableLoadError::Corrupt(format!(
            "file holds {} values, a {} table needs at least {}",
            available, size, min_values
        )));
    }

    let mut table = PValueTable::initialize(size)
        .map_err(|e| PTableLoadError::Corrupt(e.to_string()))?;
    let expected = table.len();
    reader
        .read_f32_into::<LittleEndian>(table.values_mut())
        .map_err(|_| {
            PTableLoadError::Corrupt(format!(
                "expected {} values, file holds {}",
                expected, available
            ))
        })?;

    Ok(table)
}
