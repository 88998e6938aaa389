use crate::models::Condition;

use Condition::{Audio, Text, Video};

/// Every permutation of the three conditions, in assignment order.
pub const LATIN_SQUARE_ORDERS: [[Condition; 3]; 6] = [
    [Video, Audio, Text],
    [Video, Text, Audio],
    [Audio, Video, Text],
    [Audio, Text, Video],
    [Text, Video, Audio],
    [Text, Audio, Video],
];

fn slot(participant_counter: u64) -> usize {
    (participant_counter.saturating_sub(1) % LATIN_SQUARE_ORDERS.len() as u64) as usize
}

/// Order for the n-th participant (1-based). Counter 0 is treated like 1.
pub fn order_for_counter(participant_counter: u64) -> [Condition; 3] {
    LATIN_SQUARE_ORDERS[slot(participant_counter)]
}

/// Human-readable order number in 1..=6.
pub fn order_number(participant_counter: u64) -> u8 {
    slot(participant_counter) as u8 + 1
}

pub fn all_orders() -> Vec<Vec<Condition>> {
    LATIN_SQUARE_ORDERS.iter().map(|order| order.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::condition::is_complete_permutation;
    use std::collections::HashSet;

    #[test]
    fn table_holds_six_distinct_permutations() {
        let distinct: HashSet<_> = LATIN_SQUARE_ORDERS.iter().collect();
        assert_eq!(distinct.len(), 6);
        assert!(LATIN_SQUARE_ORDERS
            .iter()
            .all(|order| is_complete_permutation(order)));
    }

    #[test]
    fn any_six_consecutive_counters_cover_every_order() {
        for start in 1..=20u64 {
            let seen: HashSet<_> = (start..start + 6).map(order_for_counter).collect();
            assert_eq!(seen.len(), 6, "window starting at {start}");
        }
    }

    #[test]
    fn fourth_participant_gets_fourth_order() {
        assert_eq!(order_for_counter(4), [Audio, Text, Video]);
        assert_eq!(order_number(4), 4);
        assert_eq!(order_number(7), 1);
        assert_eq!(order_for_counter(12), LATIN_SQUARE_ORDERS[5]);
    }
}
