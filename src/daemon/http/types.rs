//! Request types for the HTTP API.

use serde::Deserialize;

use crate::daemon::services::queue::clamp_pop_count;

/// Query string shared by the queue endpoints.
///
/// Unknown parameters, including `token`, are ignored.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct QueryParams {
    pub app: Option<String>,
    pub item: Option<String>,
    pub channel: Option<String>,
    /// Kept as text so a malformed count falls back to 1 instead of
    /// failing extraction.
    pub count: Option<String>,
    /// Value for `crud/set`.
    pub v: Option<String>,
}

impl QueryParams {
    /// Pop count clamped to `1..=10`.
    pub fn pop_count(&self) -> usize {
        self.count
            .as_deref()
            .and_then(|c| c.trim().parse::<i64>().ok())
            .map_or(1, clamp_pop_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_count(count: &str) -> QueryParams {
        QueryParams {
            count: Some(count.to_string()),
            ..QueryParams::default()
        }
    }

    #[test]
    fn test_pop_count() {
        assert_eq!(QueryParams::default().pop_count(), 1);
        assert_eq!(with_count("3").pop_count(), 3);
        assert_eq!(with_count("-4").pop_count(), 1);
        assert_eq!(with_count("500").pop_count(), 10);
        assert_eq!(with_count("lots").pop_count(), 1);
    }
}
