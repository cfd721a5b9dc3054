//! Property-based tests for the bit buffer.
//!
//! Verifies the structural invariants that hold for any mix of pushes:
//! - `len()` equals bits pushed minus bits popped
//! - `padded_bytes` output is `ceil(len / 8)` bytes
//! - unused low bits of the final byte equal the pad bit

use proptest::prelude::*;

use agares_core::BitBuffer;

/// One operation against the buffer.
#[derive(Debug, Clone)]
enum Op {
    PushFront(u8),
    PushBack(u8),
    PopFront,
    PopBack,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<bool>().prop_map(|b| Op::PushFront(u8::from(b))),
        any::<bool>().prop_map(|b| Op::PushBack(u8::from(b))),
        Just(Op::PopFront),
        Just(Op::PopBack),
    ]
}

proptest! {
    #[test]
    fn prop_len_tracks_push_pop(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let mut bits = BitBuffer::new();
        // Shadow model: the full bit sequence in stream order.
        let mut model: Vec<u8> = Vec::new();

        for op in ops {
            match op {
                Op::PushFront(b) => {
                    bits.push_front(b);
                    model.insert(0, b);
                }
                Op::PushBack(b) => {
                    bits.push_back(b);
                    model.push(b);
                }
                Op::PopFront => {
                    let expected = if model.is_empty() { None } else { Some(model.remove(0)) };
                    prop_assert_eq!(bits.pop_front(), expected);
                }
                Op::PopBack => {
                    prop_assert_eq!(bits.pop_back(), model.pop());
                }
            }
            prop_assert_eq!(bits.len(), model.len());
        }
    }

    #[test]
    fn prop_padded_bytes_shape(
        front in prop::collection::vec(any::<bool>(), 0..40),
        back in prop::collection::vec(any::<bool>(), 0..40),
        pad in any::<bool>(),
    ) {
        let mut bits = BitBuffer::new();
        let mut model: Vec<u8> = Vec::new();
        for b in front {
            bits.push_front(u8::from(b));
            model.insert(0, u8::from(b));
        }
        for b in back {
            bits.push_back(u8::from(b));
            model.push(u8::from(b));
        }

        let pad = u8::from(pad);
        let bytes = bits.padded_bytes(pad);
        prop_assert_eq!(bytes.len(), model.len().div_ceil(8));

        // Reconstruct the bit stream MSB-first and compare with the model
        // plus pad bits.
        let mut stream = Vec::new();
        for byte in &bytes {
            for shift in (0..8).rev() {
                stream.push((byte >> shift) & 1);
            }
        }
        let mut expected = model.clone();
        while expected.len() < stream.len() {
            expected.push(pad);
        }
        prop_assert_eq!(stream, expected);
    }
}
