//! Property-based tests for bookmark store reconciliation.
//!
//! Covers ordering after the initial fetch, prepend-on-insert regardless of
//! timestamp, and idempotent deletes, for arbitrary lists.

use chrono::{TimeZone, Utc};
use markboard::managers::bookmark_store::BookmarkStore;
use markboard::types::bookmark::Bookmark;
use markboard::types::change::ChangeEvent;
use proptest::prelude::*;

fn bookmark(id: usize, secs: i64) -> Bookmark {
    Bookmark {
        id: format!("b{}", id),
        title: format!("Bookmark {}", id),
        url: format!("https://site{}.example", id),
        created_at: Utc.timestamp_opt(secs, 0).single().unwrap(),
        user_id: Some("user-1".to_string()),
    }
}

/// A fetch result: unique ids, sorted by created_at descending as the backend returns it.
fn arb_fetch() -> impl Strategy<Value = Vec<Bookmark>> {
    proptest::collection::vec(0i64..2_000_000_000, 0..20).prop_map(|mut times| {
        times.sort_unstable_by(|a, b| b.cmp(a));
        times
            .into_iter()
            .enumerate()
            .map(|(i, t)| bookmark(i, t))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// After the initial fetch and before any event, the list is the fetch result in
    /// created_at descending order.
    #[test]
    fn fetch_result_is_shown_newest_first(fetched in arb_fetch()) {
        let store = BookmarkStore::new();
        store.replace_all(fetched.clone());
        let shown = store.snapshot();

        prop_assert_eq!(&shown, &fetched);
        prop_assert!(shown.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    /// An insert lands at index 0 whatever its timestamp, and nothing else moves.
    #[test]
    fn insert_always_prepends(fetched in arb_fetch(), secs in 0i64..2_000_000_000) {
        let store = BookmarkStore::new();
        store.replace_all(fetched.clone());
        let inserted = bookmark(999, secs);

        store.apply(&ChangeEvent::Insert(inserted.clone()));
        let shown = store.snapshot();

        prop_assert_eq!(shown.len(), fetched.len() + 1);
        prop_assert_eq!(&shown[0], &inserted);
        prop_assert_eq!(&shown[1..], &fetched[..]);
    }

    /// Applying the same delete twice equals applying it once.
    #[test]
    fn delete_is_idempotent(fetched in arb_fetch(), pick in any::<prop::sample::Index>()) {
        let store = BookmarkStore::new();
        store.replace_all(fetched.clone());
        let id = if fetched.is_empty() {
            "absent".to_string()
        } else {
            fetched[pick.index(fetched.len())].id.clone()
        };

        store.apply(&ChangeEvent::Delete(id.clone()));
        let once = store.snapshot();
        store.apply(&ChangeEvent::Delete(id.clone()));
        let twice = store.snapshot();

        prop_assert_eq!(&once, &twice);
        prop_assert!(once.iter().all(|b| b.id != id));
        prop_assert_eq!(once.len(), fetched.len().saturating_sub(usize::from(!fetched.is_empty())));
    }
}
