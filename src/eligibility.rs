//! Archival eligibility policy: name pattern plus creation age.

use chrono::{DateTime, Utc};

use crate::clock::days_before;
use crate::image::ImageRecord;

/// Default maximum image age, in days, for archival candidates.
pub const DEFAULT_MAX_AGE_DAYS: u32 = 180;

/// Name substrings and age limit deciding which images are archived.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EligibilityPolicy {
    patterns: Vec<String>,
    max_age_days: u32,
}

impl EligibilityPolicy {
    /// Builds a policy. Patterns are trimmed and upper-cased once; blank
    /// patterns are dropped so they can never match every name.
    #[must_use]
    pub fn new<I, S>(patterns: I, max_age_days: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized = patterns
            .into_iter()
            .map(|pattern| pattern.as_ref().trim().to_uppercase())
            .filter(|pattern| !pattern.is_empty())
            .collect();
        Self {
            patterns: normalized,
            max_age_days,
        }
    }

    /// Normalized patterns.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Maximum age in days.
    #[must_use]
    pub const fn max_age_days(&self) -> u32 {
        self.max_age_days
    }

    /// Returns whether `name` contains any pattern, ignoring case.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        let upper = name.to_uppercase();
        self.patterns
            .iter()
            .any(|pattern| upper.contains(pattern.as_str()))
    }

    /// Returns whether `image` should be archived at `now`.
    ///
    /// Images without a usable name or creation instant are never eligible.
    #[must_use]
    pub fn is_eligible(&self, image: &ImageRecord, now: DateTime<Utc>) -> bool {
        let Some(name) = image.display_name() else {
            return false;
        };
        let Some(created_at) = image.created_at else {
            return false;
        };
        self.matches_name(name) && created_at > days_before(now, self.max_age_days)
    }
}
