use sdrcore::hal::interleave::{deinterleave, interleave};
use sdrcore::{ChannelLayout, Error, SampleFormat};

/// I component tagging block, channel and sample index; Q is its negation
fn tag(block: usize, channel: usize, index: usize) -> i16 {
    (block * 1000 + channel * 100 + index) as i16
}

/// `blocks` planar blocks: each holds every channel's run of samples in turn
fn planar(blocks: usize, channels: usize, buffer_size: usize) -> Vec<i16> {
    let per_channel = buffer_size / channels;
    let mut samples = Vec::with_capacity(blocks * buffer_size * 2);
    for block in 0..blocks {
        for channel in 0..channels {
            for index in 0..per_channel {
                let i = tag(block, channel, index);
                samples.extend_from_slice(&[i, -i]);
            }
        }
    }
    samples
}

/// The same samples in wire order: one sample per channel, round robin
fn wire(blocks: usize, channels: usize, buffer_size: usize) -> Vec<i16> {
    let per_channel = buffer_size / channels;
    let mut samples = Vec::with_capacity(blocks * buffer_size * 2);
    for block in 0..blocks {
        for index in 0..per_channel {
            for channel in 0..channels {
                let i = tag(block, channel, index);
                samples.extend_from_slice(&[i, -i]);
            }
        }
    }
    samples
}

#[test]
fn test_layouts_in_both_directions() {
    let layouts = [
        (ChannelLayout::RxX1, 1),
        (ChannelLayout::TxX1, 1),
        (ChannelLayout::RxX2, 2),
        (ChannelLayout::TxX2, 2),
        (ChannelLayout::RxX4, 4),
        (ChannelLayout::TxX4, 4),
    ];
    let buffer_size = 16;
    let blocks = 3;

    for (layout, channels) in layouts {
        let mut samples = planar(blocks, channels, buffer_size);
        interleave(layout, SampleFormat::Sc16Q11, buffer_size, &mut samples).unwrap();
        assert_eq!(samples, wire(blocks, channels, buffer_size), "{:?}", layout);

        deinterleave(layout, SampleFormat::Sc16Q11, buffer_size, &mut samples).unwrap();
        assert_eq!(samples, planar(blocks, channels, buffer_size), "{:?}", layout);
    }
}

#[test]
fn test_blocks_are_permuted_independently() {
    // Samples never move across a block boundary
    let buffer_size = 8;
    let mut samples = planar(2, 4, buffer_size);
    interleave(ChannelLayout::TxX4, SampleFormat::Sc16Q11Meta, buffer_size, &mut samples).unwrap();

    let (first, second) = samples.split_at(buffer_size * 2);
    assert!(first.iter().step_by(2).all(|&i| i < 1000));
    assert!(second.iter().step_by(2).all(|&i| i >= 1000));
    assert_eq!(&second[..8], &[1000, -1000, 1100, -1100, 1200, -1200, 1300, -1300]);
}

#[test]
fn test_four_channel_wire_order() {
    let mut samples = planar(1, 4, 8);
    deinterleave(ChannelLayout::RxX4, SampleFormat::Sc16Q11, 8, &mut samples).unwrap();
    // Planar data read as wire order: sample k belongs to channel k % 4
    let i: Vec<i16> = samples.iter().step_by(2).copied().collect();
    assert_eq!(i, vec![0, 200, 1, 201, 100, 300, 101, 301]);
}

#[test]
fn test_block_geometry_is_checked() {
    let mut samples = vec![0i16; 48];
    assert!(matches!(
        interleave(ChannelLayout::RxX4, SampleFormat::Sc16Q11, 0, &mut samples),
        Err(Error::InvalidParameter(_))
    ));
    assert!(matches!(
        deinterleave(ChannelLayout::TxX4, SampleFormat::Sc16Q11, 10, &mut samples),
        Err(Error::InvalidParameter(_))
    ));
    // 48 components are one and a half blocks of 16 samples
    assert!(matches!(
        interleave(ChannelLayout::RxX2, SampleFormat::Sc16Q11, 16, &mut samples),
        Err(Error::InvalidParameter(_))
    ));
    // Shorter than one block
    assert!(matches!(
        deinterleave(ChannelLayout::TxX2, SampleFormat::Sc16Q11, 32, &mut samples),
        Err(Error::InvalidParameter(_))
    ));
}
