//! Greedy bin-packing of items into emails (batch mode).

use crate::item::Item;

/// Group items into email-sized bins, preserving arrival order.
///
/// A single pass over the items, bounded by two limits per bin: attachment
/// count and total bytes. A bin is closed only when adding the next item
/// would exceed a limit *and* the bin already holds at least one item, so an
/// item larger than `max_total_bytes` still ships solo — items are never
/// dropped, and that one email may exceed the nominal size limit.
pub fn pack(items: Vec<Item>, max_attachments: u32, max_total_bytes: u64) -> Vec<Vec<Item>> {
    let mut bins: Vec<Vec<Item>> = Vec::new();
    let mut bin: Vec<Item> = Vec::new();
    let mut bin_bytes: u64 = 0;

    for item in items {
        let over_count = bin.len() as u32 >= max_attachments;
        let over_bytes = bin_bytes.saturating_add(item.size_bytes) > max_total_bytes;

        if (over_count || over_bytes) && !bin.is_empty() {
            bins.push(std::mem::take(&mut bin));
            bin_bytes = 0;
        }

        bin_bytes += item.size_bytes;
        bin.push(item);
    }

    if !bin.is_empty() {
        bins.push(bin);
    }

    bins
}

#[cfg(test)]
mod tests {
    use mailroom_core::{DocumentId, JobId};

    use super::*;
    use crate::ports::DocumentMeta;

    const MB: u64 = 1024 * 1024;

    fn items(sizes: &[u64]) -> Vec<Item> {
        let job_id = JobId::new();
        sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                Item::new(
                    job_id,
                    DocumentId::new(),
                    &DocumentMeta {
                        locator: format!("store/doc-{i}.pdf"),
                        filename: format!("doc-{i}.pdf"),
                        size_bytes: size,
                        collection: "outbox".to_string(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn splits_on_attachment_count() {
        // 3 items, max 2 per email, plenty of byte headroom.
        let bins = pack(items(&[10 * MB, 10 * MB, 10 * MB]), 2, 100 * MB);
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].len(), 2);
        assert_eq!(bins[1].len(), 1);
    }

    #[test]
    fn splits_on_total_bytes() {
        let bins = pack(items(&[6 * MB, 6 * MB, 6 * MB]), 10, 10 * MB);
        assert_eq!(bins.len(), 3);
    }

    #[test]
    fn oversized_item_ships_solo() {
        let bins = pack(items(&[2 * MB, 50 * MB, 2 * MB]), 10, 10 * MB);
        assert_eq!(bins.len(), 3);
        assert_eq!(bins[1].len(), 1);
        assert_eq!(bins[1][0].size_bytes, 50 * MB);
    }

    #[test]
    fn empty_input_yields_no_bins() {
        assert!(pack(Vec::new(), 5, 10 * MB).is_empty());
    }

    #[test]
    fn single_bin_when_everything_fits() {
        let bins = pack(items(&[MB, MB, MB]), 10, 10 * MB);
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].len(), 3);
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn no_item_is_dropped_and_order_is_stable(
                sizes in proptest::collection::vec(0u64..64 * MB, 0..40),
                max_attachments in 1u32..8,
                max_total_bytes in (1 * MB)..(32 * MB),
            ) {
                let input = items(&sizes);
                let expected: Vec<_> = input.iter().map(|i| i.id).collect();

                let bins = pack(input, max_attachments, max_total_bytes);

                let flattened: Vec<_> = bins.iter().flatten().map(|i| i.id).collect();
                prop_assert_eq!(flattened, expected);
            }

            #[test]
            fn bins_respect_limits_except_solo_oversized(
                sizes in proptest::collection::vec(0u64..64 * MB, 0..40),
                max_attachments in 1u32..8,
                max_total_bytes in (1 * MB)..(32 * MB),
            ) {
                let bins = pack(items(&sizes), max_attachments, max_total_bytes);

                for bin in &bins {
                    prop_assert!(!bin.is_empty());
                    prop_assert!(bin.len() as u32 <= max_attachments);

                    let total: u64 = bin.iter().map(|i| i.size_bytes).sum();
                    if bin.len() > 1 {
                        prop_assert!(total <= max_total_bytes);
                    }
                }
            }
        }
    }
}
