//! Order priority ranking

/// Categorical order priority, ranked Low < Medium < High < Critical.
/// Unrecognized codes rank below all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Parse a priority code; surrounding whitespace and case are ignored
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "L" => Priority::Low,
            "M" => Priority::Medium,
            "H" => Priority::High,
            "C" => Priority::Critical,
            _ => Priority::Unknown,
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Priority::Unknown => 0,
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
            Priority::Critical => 4,
        }
    }
}

/// Rank of an optional priority field; a missing field ranks as unknown
pub fn rank_of(code: Option<&str>) -> u8 {
    code.map(Priority::from_code).unwrap_or(Priority::Unknown).rank()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranks() {
        assert_eq!(rank_of(Some("L")), 1);
        assert_eq!(rank_of(Some(" m ")), 2);
        assert_eq!(rank_of(Some("h")), 3);
        assert_eq!(rank_of(Some("C")), 4);
        assert_eq!(rank_of(Some("Urgent")), 0);
        assert_eq!(rank_of(Some("")), 0);
        assert_eq!(rank_of(None), 0);
    }
}
