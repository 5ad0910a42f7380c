//! Per-request pagination state.

use serde::Serialize;
use serde_json::Value;

/// Page size used when a single-shot fetch has no explicit pager.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// One page request: 1-based page index, page size, and the equivalent
/// row offset for APIs that paginate by `skip` instead of `page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pager {
    /// 1-based page index.
    pub page: usize,
    /// Records per page.
    pub size: usize,
    /// Row offset: `size * (page - 1)`.
    pub skip: usize,
}

impl Pager {
    /// The first page at the given size.
    #[must_use]
    pub fn first(size: usize) -> Self {
        Self {
            page: 1,
            size,
            skip: 0,
        }
    }

    /// The implicit pager for single-shot fetches: `{1, 100, 0}`.
    #[must_use]
    pub fn single_shot() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }

    /// The pager for a given page index.
    #[must_use]
    pub fn at(page: usize, size: usize) -> Self {
        Self {
            page,
            size,
            skip: size * (page.saturating_sub(1)),
        }
    }

    /// Starting pager for stripe `index` (0-based): worker `i` begins at
    /// page `i + 1`.
    #[must_use]
    pub fn stripe_start(index: usize, size: usize) -> Self {
        Self::at(index + 1, size)
    }

    /// The next page on the same stripe, `stride` pages ahead. `skip` is
    /// recomputed from the new page index so the two stay consistent.
    #[must_use]
    pub fn next_on_stripe(&self, stride: usize) -> Self {
        Self::at(self.page + stride, self.size)
    }
}

/// Everything a single fetch needs: the page being requested, the run-wide
/// parameters, and the driving input record when the run is input-driven.
///
/// Snapshotted per dispatch; handlers never share mutable request state.
#[derive(Debug, Clone, Serialize)]
pub struct RequestContext {
    /// The page being requested; `None` until dispatch applies the
    /// single-shot default.
    pub pager: Option<Pager>,
    /// Run-wide parameters.
    pub params: Value,
    /// The current driving input record, if any.
    pub input: Option<Value>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_single_shot_default() {
        assert_eq!(
            Pager::single_shot(),
            Pager {
                page: 1,
                size: 100,
                skip: 0
            }
        );
    }

    #[test]
    fn test_stripe_starts() {
        // Three stripes at size 10 start at pages 1, 2, 3.
        assert_eq!(Pager::stripe_start(0, 10), Pager { page: 1, size: 10, skip: 0 });
        assert_eq!(Pager::stripe_start(1, 10), Pager { page: 2, size: 10, skip: 10 });
        assert_eq!(Pager::stripe_start(2, 10), Pager { page: 3, size: 10, skip: 20 });
    }

    #[test]
    fn test_stripe_advance_keeps_skip_consistent() {
        let start = Pager::stripe_start(1, 10); // page 2
        let next = start.next_on_stripe(3); // page 5
        assert_eq!(next, Pager { page: 5, size: 10, skip: 40 });
        let after = next.next_on_stripe(3); // page 8
        assert_eq!(after, Pager { page: 8, size: 10, skip: 70 });
    }

    #[test]
    fn test_stripes_cover_each_page_once() {
        // With stride 3, the three stripes enumerate 1..=30 exactly once.
        let mut seen = Vec::new();
        for stripe in 0..3 {
            let mut pager = Pager::stripe_start(stripe, 10);
            while pager.page <= 30 {
                seen.push(pager.page);
                pager = pager.next_on_stripe(3);
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=30).collect::<Vec<_>>());
    }

    #[test]
    fn test_context_serializes_with_lowercase_slots() {
        let context = RequestContext {
            pager: Some(Pager::at(2, 50)),
            params: serde_json::json!({"source": 7}),
            input: None,
        };
        let value = serde_json::to_value(&context).unwrap();
        assert_eq!(value["pager"]["page"], 2);
        assert_eq!(value["pager"]["skip"], 50);
        assert_eq!(value["params"]["source"], 7);
        assert!(value["input"].is_null());
    }
}
