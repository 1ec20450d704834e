//! Conversion between per-channel (planar) sample blocks and the round-robin
//! order multi-channel layouts use on the wire.

use crate::error::{Error, Result};
use crate::hal::types::{ChannelLayout, SampleFormat};

/// Planar to wire order, in place.
///
/// `samples` holds whole blocks of `buffer_size` samples; within each block
/// channel `c` occupies samples `c * buffer_size / n ..` before the call and
/// every `n`-th sample starting at `c` after it.
pub fn interleave(
    layout: ChannelLayout,
    format: SampleFormat,
    buffer_size: usize,
    samples: &mut [i16],
) -> Result<()> {
    convert(layout, format, buffer_size, samples, planar_index)
}

/// Wire order back to planar, in place. Inverse of [`interleave`].
pub fn deinterleave(
    layout: ChannelLayout,
    format: SampleFormat,
    buffer_size: usize,
    samples: &mut [i16],
) -> Result<()> {
    convert(layout, format, buffer_size, samples, wire_index)
}

/// Planar position of wire sample `wire`
fn planar_index(wire: usize, n: usize, per_channel: usize) -> usize {
    (wire % n) * per_channel + wire / n
}

/// Wire position of planar sample `planar`
fn wire_index(planar: usize, n: usize, per_channel: usize) -> usize {
    (planar % per_channel) * n + planar / per_channel
}

/// Permute every block: destination slot `i` is filled from
/// `source(i, n, per_channel)`.
fn convert(
    layout: ChannelLayout,
    format: SampleFormat,
    buffer_size: usize,
    samples: &mut [i16],
    source: fn(usize, usize, usize) -> usize,
) -> Result<()> {
    let n = layout.num_channels();
    let components = format.bytes_per_sample() / 2;
    let block = check_geometry(n, components, buffer_size, samples.len())?;
    if n == 1 {
        return Ok(());
    }

    let per_channel = buffer_size / n;
    let mut scratch = vec![0i16; block];

    for chunk in samples.chunks_exact_mut(block) {
        scratch.copy_from_slice(chunk);
        for slot in 0..buffer_size {
            let src = source(slot, n, per_channel) * components;
            let dst = slot * components;
            chunk[dst..dst + components].copy_from_slice(&scratch[src..src + components]);
        }
    }
    Ok(())
}

/// Size of one block in `i16` components
fn check_geometry(n: usize, components: usize, buffer_size: usize, len: usize) -> Result<usize> {
    if buffer_size == 0 || buffer_size % n != 0 {
        return Err(Error::InvalidParameter(format!(
            "buffer size {} is not a multiple of {} channels",
            buffer_size, n
        )));
    }
    let block = buffer_size * components;
    if len < block || len % block != 0 {
        return Err(Error::InvalidParameter(format!(
            "{} components do not form whole blocks of {} samples",
            len, buffer_size
        )));
    }
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planar(n: usize, per_channel: usize) -> Vec<i16> {
        // I = channel * 100 + index, Q = -I
        (0..n)
            .flat_map(|ch| (0..per_channel).map(move |i| (ch * 100 + i) as i16))
            .flat_map(|v| [v, -v])
            .collect()
    }

    #[test]
    fn test_two_channel_wire_order() {
        let mut samples = planar(2, 2);
        interleave(ChannelLayout::RxX2, SampleFormat::Sc16Q11, 4, &mut samples).unwrap();
        assert_eq!(samples, vec![0, 0, 100, -100, 1, -1, 101, -101]);

        deinterleave(ChannelLayout::RxX2, SampleFormat::Sc16Q11, 4, &mut samples).unwrap();
        assert_eq!(samples, planar(2, 2));
    }

    #[test]
    fn test_single_channel_untouched() {
        let mut samples = planar(1, 4);
        interleave(ChannelLayout::TxX1, SampleFormat::Sc16Q11, 4, &mut samples).unwrap();
        assert_eq!(samples, planar(1, 4));
    }

    #[test]
    fn test_index_maps_are_inverse() {
        for n in [1, 2, 4] {
            let per_channel = 8;
            for planar in 0..n * per_channel {
                let wire = wire_index(planar, n, per_channel);
                assert_eq!(planar_index(wire, n, per_channel), planar);
            }
        }
    }

    #[test]
    fn test_rejects_partial_block() {
        let mut samples = vec![0i16; 10];
        assert!(matches!(
            interleave(ChannelLayout::RxX2, SampleFormat::Sc16Q11, 4, &mut samples),
            Err(Error::InvalidParameter(_))
        ));
        let mut samples = vec![0i16; 12];
        assert!(matches!(
            interleave(ChannelLayout::RxX4, SampleFormat::Sc16Q11, 6, &mut samples),
            Err(Error::InvalidParameter(_))
        ));
    }
}
