pub mod config;
pub mod pool;

pub use config::StreamConfig;
pub use pool::{BufferPool, Endpoints, TransferBudget};

/// Bytes per complex SC16 sample on the wire
pub const BYTES_PER_SAMPLE: usize = 4;

/// Decode little-endian `i16` components from wire bytes.
pub fn read_samples(src: &[u8], dst: &mut [i16]) {
    for (chunk, out) in src.chunks_exact(2).zip(dst.iter_mut()) {
        *out = i16::from_le_bytes([chunk[0], chunk[1]]);
    }
}

/// Encode `i16` components as little-endian wire bytes.
pub fn write_samples(src: &[i16], dst: &mut [u8]) {
    for (value, chunk) in src.iter().zip(dst.chunks_exact_mut(2)) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
}
