use mongodb::bson::Document;
use mongodb::options::FindOptions;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;
/// Deepest page a client may ask for.
pub const MAX_PAGE: i64 = 100_000;

/// Page/limit pair normalised from optional query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Pagination {
            page: page.unwrap_or(1).clamp(1, MAX_PAGE),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit).max(0) as u64
    }

    pub fn find_options(&self, sort: Document) -> FindOptions {
        FindOptions::builder()
            .skip(self.skip())
            .limit(self.limit)
            .sort(sort)
            .build()
    }

    pub fn summary(&self, total: u64) -> serde_json::Value {
        serde_json::json!({
            "page": self.page,
            "limit": self.limit,
            "total": total,
            "pages": (total as f64 / self.limit as f64).ceil() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        assert_eq!(Pagination::new(None, None), Pagination { page: 1, limit: 20 });
        assert_eq!(Pagination::new(Some(0), Some(500)), Pagination { page: 1, limit: 100 });
        assert_eq!(Pagination::new(Some(-3), Some(0)), Pagination { page: 1, limit: 1 });
    }

    #[test]
    fn skip_and_page_count() {
        let p = Pagination::new(Some(3), Some(10));
        assert_eq!(p.skip(), 20);
        assert_eq!(p.summary(41)["pages"], 5);
        assert_eq!(p.summary(0)["pages"], 0);
    }

    #[test]
    fn huge_page_numbers_are_capped() {
        let p = Pagination::new(Some(i64::MAX), Some(100));
        assert_eq!(p.page, MAX_PAGE);
        assert_eq!(p.skip(), ((MAX_PAGE - 1) * 100) as u64);

        let p = Pagination { page: i64::MAX, limit: MAX_LIMIT };
        assert_eq!(p.skip(), i64::MAX as u64);
    }
}
