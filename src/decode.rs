// src/decode.rs
//! Binary frame decoder.
//!
//! Pure per-call functions: given a [`WireLayout`] and a byte buffer that
//! may hold zero, one or many complete frames plus a trailing partial
//! frame, [`decode`] extracts every complete frame and reports how many
//! bytes it consumed (always a multiple of `frame_length`). The caller
//! keeps the unconsumed tail.
//!
//! Raw samples are sign-extended to the layout's declared bit width and
//! scaled to millivolts with a single multiplication. Biosignal and
//! auxiliary slots carry separate scale factors even within one frame.

use crate::error::DecodeError;
use crate::types::{ByteOrder, WireLayout};

/// Status-byte bit the device sets when its FIFO overran and samples were
/// dropped. A frame carrying it is discarded as corrupt.
pub const FRAME_STATUS_OVERRUN: u8 = 0x01;

/// Outcome of one [`decode`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    /// Bytes consumed from the buffer; always a multiple of the frame
    /// length, never larger than the buffer.
    pub consumed: usize,
    /// Decoded sample vectors, one per valid frame, in receive order.
    pub frames: Vec<Vec<f32>>,
    /// Total corrupt frames discarded within the consumed region.
    pub corrupt_frames: u32,
    /// Length of the corrupt run at the end of the consumed region, i.e.
    /// corrupt frames not followed by any valid frame in this call. Lets
    /// the session track consecutive corruption across calls.
    pub trailing_corrupt_run: u32,
}

/// Decode every complete frame in `buffer`.
///
/// Corrupt frames are skipped at frame granularity: the frame length is
/// fixed and known, so resynchronization never scans byte-by-byte. An
/// incomplete trailing frame is simply left unconsumed.
pub fn decode(layout: &WireLayout, buffer: &[u8]) -> Decoded {
    let mut out = Decoded::default();
    let frame_length = layout.frame_length;
    debug_assert!(frame_length > 0);

    let mut offset = 0;
    while buffer.len() - offset >= frame_length {
        let frame = &buffer[offset..offset + frame_length];
        match decode_frame(layout, frame) {
            Ok(samples) => {
                out.frames.push(samples);
                out.trailing_corrupt_run = 0;
            }
            Err(DecodeError::CorruptFrame { .. }) => {
                out.corrupt_frames += 1;
                out.trailing_corrupt_run += 1;
            }
            // Unreachable with a full-length slice; keep the partial
            // frame in the buffer regardless.
            Err(DecodeError::IncompleteFrame { .. }) => break,
        }
        offset += frame_length;
    }

    out.consumed = offset;
    out
}

/// Decode exactly one frame into a sample vector: enabled biosignal
/// channels in ascending index order, then all auxiliary channels.
pub fn decode_frame(layout: &WireLayout, frame: &[u8]) -> Result<Vec<f32>, DecodeError> {
    if frame.len() < layout.frame_length {
        return Err(DecodeError::IncompleteFrame {
            needed: layout.frame_length,
            available: frame.len(),
        });
    }

    if let Some(offset) = layout.status_offset {
        let status = frame[offset];
        if status & FRAME_STATUS_OVERRUN != 0 {
            return Err(DecodeError::CorruptFrame { status });
        }
    }

    let mut samples = Vec::with_capacity(layout.samples_per_frame());

    for &channel in &layout.enabled_biosignal {
        let raw = raw_sample(layout, frame, channel as usize);
        samples.push(raw as f32 * layout.scale_biosignal);
    }
    for slot in layout.biosignal_slots..layout.biosignal_slots + layout.auxiliary_slots {
        let raw = raw_sample(layout, frame, slot);
        samples.push(raw as f32 * layout.scale_auxiliary);
    }

    Ok(samples)
}

/// Read the raw integer at wire slot `slot`, sign-extended to i32.
fn raw_sample(layout: &WireLayout, frame: &[u8], slot: usize) -> i32 {
    let start = slot * layout.bytes_per_sample;
    let bytes = &frame[start..start + layout.bytes_per_sample];
    match (layout.bytes_per_sample, layout.byte_order) {
        (2, ByteOrder::BigEndian) => i16::from_be_bytes([bytes[0], bytes[1]]) as i32,
        (2, ByteOrder::LittleEndian) => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
        (3, ByteOrder::BigEndian) => sign_extend_24(
            ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32,
        ),
        (3, ByteOrder::LittleEndian) => sign_extend_24(
            ((bytes[2] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[0] as u32,
        ),
        // The resolver only produces 2- and 3-byte layouts.
        _ => unreachable!("unsupported sample width {}", layout.bytes_per_sample),
    }
}

/// Two's-complement sign extension of a 24-bit value.
fn sign_extend_24(value: u32) -> i32 {
    if value & 0x0080_0000 != 0 {
        (value | 0xFF00_0000) as i32
    } else {
        value as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// 32 biosignal + 32 auxiliary channels of 2 bytes each: 128-byte
    /// frames, no status byte.
    fn layout_128() -> WireLayout {
        WireLayout {
            bytes_per_sample: 2,
            byte_order: ByteOrder::BigEndian,
            biosignal_slots: 32,
            auxiliary_slots: 32,
            enabled_biosignal: (0..32).collect(),
            frame_length: 128,
            status_offset: None,
            scale_biosignal: 1.0,
            scale_auxiliary: 1.0,
        }
    }

    /// Muovi-shaped layout: 4 biosignal + 2 auxiliary slots, trailing
    /// status byte.
    fn layout_with_status() -> WireLayout {
        WireLayout {
            bytes_per_sample: 2,
            byte_order: ByteOrder::BigEndian,
            biosignal_slots: 4,
            auxiliary_slots: 2,
            enabled_biosignal: (0..4).collect(),
            frame_length: 6 * 2 + 1,
            status_offset: Some(12),
            scale_biosignal: 0.5,
            scale_auxiliary: 0.25,
        }
    }

    fn encode_frame(layout: &WireLayout, values: &[i16], status: u8) -> Vec<u8> {
        let mut frame = Vec::with_capacity(layout.frame_length);
        for v in values {
            match layout.byte_order {
                ByteOrder::BigEndian => frame.extend_from_slice(&v.to_be_bytes()),
                ByteOrder::LittleEndian => frame.extend_from_slice(&v.to_le_bytes()),
            }
        }
        if layout.status_offset.is_some() {
            frame.push(status);
        }
        assert_eq!(frame.len(), layout.frame_length);
        frame
    }

    #[test]
    fn three_and_a_half_frames() {
        let layout = layout_128();
        let mut buffer = Vec::new();
        for f in 0..3i16 {
            buffer.extend(encode_frame(&layout, &vec![f; 64], 0));
        }
        buffer.extend(std::iter::repeat(0u8).take(64)); // half a frame

        assert_eq!(buffer.len(), 448);
        let out = decode(&layout, &buffer);
        assert_eq!(out.consumed, 384);
        assert_eq!(out.frames.len(), 3);
        assert_eq!(out.corrupt_frames, 0);
        assert_eq!(out.frames[2][0], 2.0);
    }

    #[test]
    fn empty_and_short_buffers_consume_nothing() {
        let layout = layout_128();
        let out = decode(&layout, &[]);
        assert_eq!(out, Decoded::default());

        let out = decode(&layout, &[0u8; 127]);
        assert_eq!(out.consumed, 0);
        assert!(out.frames.is_empty());
    }

    #[test]
    fn incomplete_frame_error_from_single_frame_decode() {
        let layout = layout_128();
        let err = decode_frame(&layout, &[0u8; 100]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::IncompleteFrame {
                needed: 128,
                available: 100
            }
        );
    }

    #[test]
    fn sign_extension_16_bit_both_endians() {
        let mut layout = layout_with_status();
        layout.scale_biosignal = 1.0;
        layout.scale_auxiliary = 1.0;

        let frame = encode_frame(&layout, &[-1, i16::MIN, i16::MAX, 0, -2, 2], 0);
        let samples = decode_frame(&layout, &frame).unwrap();
        assert_eq!(samples, vec![-1.0, -32768.0, 32767.0, 0.0, -2.0, 2.0]);

        layout.byte_order = ByteOrder::LittleEndian;
        let frame = encode_frame(&layout, &[-1, i16::MIN, i16::MAX, 0, -2, 2], 0);
        let samples = decode_frame(&layout, &frame).unwrap();
        assert_eq!(samples, vec![-1.0, -32768.0, 32767.0, 0.0, -2.0, 2.0]);
    }

    #[test]
    fn sign_extension_24_bit() {
        let layout = WireLayout {
            bytes_per_sample: 3,
            byte_order: ByteOrder::BigEndian,
            biosignal_slots: 2,
            auxiliary_slots: 0,
            enabled_biosignal: vec![0, 1],
            frame_length: 6,
            status_offset: None,
            scale_biosignal: 1.0,
            scale_auxiliary: 1.0,
        };
        // 0xFFFFFF = -1, 0x800000 = -8388608
        let frame = [0xFF, 0xFF, 0xFF, 0x80, 0x00, 0x00];
        let samples = decode_frame(&layout, &frame).unwrap();
        assert_eq!(samples, vec![-1.0, -8_388_608.0]);

        let mut le = layout.clone();
        le.byte_order = ByteOrder::LittleEndian;
        let frame = [0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x80];
        let samples = decode_frame(&le, &frame).unwrap();
        assert_eq!(samples, vec![-1.0, -8_388_608.0]);
    }

    #[test]
    fn separate_scale_factors_for_auxiliary() {
        let layout = layout_with_status();
        let frame = encode_frame(&layout, &[100, 100, 100, 100, 100, 100], 0);
        let samples = decode_frame(&layout, &frame).unwrap();
        assert_eq!(&samples[..4], &[50.0; 4]);
        assert_eq!(&samples[4..], &[25.0; 2]);
    }

    #[test]
    fn channel_subset_preserves_ascending_order() {
        let mut layout = layout_with_status();
        layout.enabled_biosignal = vec![1, 3];
        let frame = encode_frame(&layout, &[10, 20, 30, 40, 50, 60], 0);
        let samples = decode_frame(&layout, &frame).unwrap();
        // channels 1 and 3 at scale 0.5, aux at 0.25
        assert_eq!(samples, vec![10.0, 20.0, 12.5, 15.0]);
    }

    #[test]
    fn corrupt_frame_in_the_middle_is_isolated() {
        let layout = layout_with_status();
        let mut buffer = Vec::new();
        buffer.extend(encode_frame(&layout, &[1; 6], 0));
        buffer.extend(encode_frame(&layout, &[2; 6], FRAME_STATUS_OVERRUN));
        buffer.extend(encode_frame(&layout, &[3; 6], 0));

        let out = decode(&layout, &buffer);
        assert_eq!(out.consumed, buffer.len());
        assert_eq!(out.frames.len(), 2);
        assert_eq!(out.corrupt_frames, 1);
        assert_eq!(out.trailing_corrupt_run, 0);
        assert_eq!(out.frames[0][0], 0.5);
        assert_eq!(out.frames[1][0], 1.5);
    }

    #[test]
    fn trailing_corrupt_run_is_reported() {
        let layout = layout_with_status();
        let mut buffer = Vec::new();
        buffer.extend(encode_frame(&layout, &[1; 6], 0));
        buffer.extend(encode_frame(&layout, &[2; 6], FRAME_STATUS_OVERRUN));
        buffer.extend(encode_frame(&layout, &[3; 6], FRAME_STATUS_OVERRUN));

        let out = decode(&layout, &buffer);
        assert_eq!(out.corrupt_frames, 2);
        assert_eq!(out.trailing_corrupt_run, 2);
        assert_eq!(out.frames.len(), 1);
    }

    #[test]
    fn round_trip_reproduces_physical_values() {
        let layout = WireLayout {
            scale_biosignal: 5.0 / 65_536.0 / 4.0 * 1000.0,
            ..layout_with_status()
        };
        let physical_mv = [1.25f32, -0.5, 0.0, 2.0];
        let raw: Vec<i16> = physical_mv
            .iter()
            .map(|mv| (mv / layout.scale_biosignal).round() as i16)
            .collect();
        let mut values = raw.clone();
        values.extend_from_slice(&[0, 0]);

        let frame = encode_frame(&layout, &values, 0);
        let samples = decode_frame(&layout, &frame).unwrap();
        for (decoded, expected) in samples.iter().zip(physical_mv.iter()) {
            assert!(
                (decoded - expected).abs() <= layout.scale_biosignal,
                "decoded {decoded} vs expected {expected}"
            );
        }
    }

    proptest! {
        /// Decoding a buffer in one call yields the same samples as
        /// decoding any prefix/suffix split of it, with the prefix
        /// remainder carried over, for buffers of whole frames.
        #[test]
        fn concatenation_property(
            frames in prop::collection::vec(
                prop::collection::vec(any::<i16>(), 6), 0..12),
            split in any::<prop::sample::Index>(),
        ) {
            let layout = layout_with_status();
            let mut buffer = Vec::new();
            for values in &frames {
                buffer.extend(encode_frame(&layout, values, 0));
            }

            let whole = decode(&layout, &buffer);
            prop_assert_eq!(whole.consumed, buffer.len());
            prop_assert_eq!(whole.frames.len(), frames.len());

            let n = if buffer.is_empty() { 0 } else { split.index(buffer.len() + 1) };
            let first = decode(&layout, &buffer[..n]);
            let mut carry = buffer[first.consumed..n].to_vec();
            carry.extend_from_slice(&buffer[n..]);
            let second = decode(&layout, &carry);

            let mut recombined = first.frames;
            recombined.extend(second.frames);
            prop_assert_eq!(recombined, whole.frames);
            prop_assert_eq!(first.consumed + second.consumed, whole.consumed);
        }
    }
}
