//! Pagination window for list queries.

/// Default number of rows returned when the caller gives no usable limit.
pub const DEFAULT_LIMIT: i64 = 10;

/// Upper bound on the number of rows a single list call may return.
pub const MAX_LIMIT: i64 = 100;

/// A normalized `LIMIT` / `OFFSET` pair.
///
/// Construction never fails: out-of-range input is clamped so that stores
/// can bind the values directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    limit: i64,
    offset: i64,
}

impl Page {
    /// Builds a page from raw caller input.
    ///
    /// - missing or non-positive `limit` falls back to [`DEFAULT_LIMIT`]
    /// - `limit` above [`MAX_LIMIT`] is clamped to it
    /// - missing or negative `offset` becomes 0
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        let limit = match limit {
            Some(l) if l > MAX_LIMIT => MAX_LIMIT,
            Some(l) if l > 0 => l,
            _ => DEFAULT_LIMIT,
        };
        let offset = offset.filter(|o| *o > 0).unwrap_or(0);
        Self { limit, offset }
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_absent() {
        let page = Page::default();
        assert_eq!(page.limit(), 10);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn limit_is_clamped_to_max() {
        assert_eq!(Page::new(Some(500), None).limit(), 100);
        assert_eq!(Page::new(Some(100), None).limit(), 100);
    }

    #[test]
    fn non_positive_limit_falls_back_to_default() {
        assert_eq!(Page::new(Some(0), None).limit(), 10);
        assert_eq!(Page::new(Some(-5), None).limit(), 10);
        assert_eq!(Page::new(Some(25), None).limit(), 25);
    }

    #[test]
    fn negative_offset_is_clamped_to_zero() {
        assert_eq!(Page::new(None, Some(-1)).offset(), 0);
        assert_eq!(Page::new(None, Some(20)).offset(), 20);
    }
}
