//! Property-based tests for indication serialization.
//!
//! For any sequence of `(key, value)` byte pairs, writing them into an
//! indication and reading them back yields the same pairs, and
//! re-serializing the read entries reproduces the buffer byte for byte.

#[cfg(test)]
mod tests {
    use crate::indication::Indication;
    use proptest::prelude::*;

    fn arb_entries() -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
        prop::collection::vec(
            (
                prop::collection::vec(any::<u8>(), 0..64),
                prop::collection::vec(any::<u8>(), 0..256),
            ),
            0..16,
        )
    }

    proptest! {
        #[test]
        fn read_back_equals_written(entries in arb_entries()) {
            let mut ind = Indication::new();
            for (key, value) in &entries {
                ind.write(key, value);
            }
            let read: Vec<(Vec<u8>, Vec<u8>)> = ind
                .reader()
                .map(|entry| {
                    let (k, v) = entry.unwrap();
                    (k.to_vec(), v.to_vec())
                })
                .collect();
            prop_assert_eq!(read, entries);
        }

        #[test]
        fn reserializing_entries_reproduces_buffer(entries in arb_entries()) {
            let mut ind = Indication::new();
            for (key, value) in &entries {
                ind.write(key, value);
            }
            let mut rebuilt = Indication::new();
            ind.each(|key, value| {
                rebuilt.write(key, value);
                Ok(())
            })
            .unwrap();
            prop_assert_eq!(rebuilt.bytes(), ind.bytes());
        }
    }
}
