//! Retention sweep over archive storage.
//!
//! A sweep covers one [`SweepScope`]: archive objects written by exports, or
//! the metadata documents describing them. Objects of the bucket that do not
//! have the scope's key shape are never touched, even when the scope's prefix
//! is empty. Every object in scope whose last modification is older than the
//! retention window is deleted. Deletions are independent: a failed delete is
//! logged and counted, and the sweep carries on.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::backend::ArchiveStorage;
use crate::clock::days_before;
use crate::error::ArchiveError;

/// Default retention window in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 180;

/// Maximum age of archive objects.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetentionPolicy {
    /// Maximum age in days.
    pub max_age_days: u32,
}

impl RetentionPolicy {
    /// Creates a policy keeping objects for `max_age_days`.
    #[must_use]
    pub const fn new(max_age_days: u32) -> Self {
        Self { max_age_days }
    }

    /// Objects last modified strictly before this instant are expired.
    #[must_use]
    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        days_before(now, self.max_age_days)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_DAYS)
    }
}

/// Suffix of archive objects written by export tasks.
pub const ARCHIVE_SUFFIX: &str = ".bin";

const METADATA_SUFFIX: &str = ".json";

/// Key shape of the objects a sweep may delete: a prefix, a suffix, and the
/// number of `/` separators allowed between them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SweepScope {
    prefix: String,
    suffix: &'static str,
    depth: usize,
}

impl SweepScope {
    /// Archive objects `<prefix><image id>.bin`.
    #[must_use]
    pub fn archives(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_owned(),
            suffix: ARCHIVE_SUFFIX,
            depth: 0,
        }
    }

    /// Metadata documents `<prefix>/<image id>/<timestamp>.json`.
    #[must_use]
    pub fn metadata_documents(prefix: &str) -> Self {
        let trimmed = prefix.trim_end_matches('/');
        Self {
            prefix: if trimmed.is_empty() {
                String::new()
            } else {
                format!("{trimmed}/")
            },
            suffix: METADATA_SUFFIX,
            depth: 1,
        }
    }

    /// Returns whether `key` has this scope's shape.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        key.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_suffix(self.suffix))
            .is_some_and(|stem| {
                !stem.is_empty()
                    && !stem.starts_with('/')
                    && !stem.ends_with('/')
                    && stem.matches('/').count() == self.depth
            })
    }
}

/// Outcome of a sweep.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SweepSummary {
    /// Objects in scope that were examined.
    pub scanned: usize,
    /// Keys deleted.
    pub deleted: Vec<String>,
    /// Keys whose deletion failed.
    pub failed: Vec<String>,
}

impl SweepSummary {
    /// Adds the counts and keys of `other`.
    pub fn absorb(&mut self, other: Self) {
        self.scanned = self.scanned.saturating_add(other.scanned);
        self.deleted.extend(other.deleted);
        self.failed.extend(other.failed);
    }
}

/// Deletes expired archive objects.
#[derive(Debug)]
pub struct RetentionSweeper<'a, S> {
    storage: &'a S,
    scope: SweepScope,
}

impl<'a, S> RetentionSweeper<'a, S>
where
    S: ArchiveStorage,
{
    /// Creates a sweeper over the objects in `scope`.
    #[must_use]
    pub const fn new(storage: &'a S, scope: SweepScope) -> Self {
        Self { storage, scope }
    }

    /// Deletes every object older than `policy` allows at `now`.
    ///
    /// Objects without a modification instant are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Provider`] only when the listing fails;
    /// individual delete failures are recorded in the summary.
    pub async fn sweep(
        &self,
        policy: RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<SweepSummary, ArchiveError<S::Error>> {
        let cutoff = policy.cutoff(now);
        info!(prefix = %self.scope.prefix, %cutoff, retention_days = policy.max_age_days, "starting retention sweep");

        let listed = self
            .storage
            .list_objects(&self.scope.prefix)
            .await
            .map_err(ArchiveError::Provider)?;
        let total = listed.len();
        let objects: Vec<_> = listed
            .into_iter()
            .filter(|object| self.scope.contains(&object.key))
            .collect();
        debug!(
            prefix = %self.scope.prefix,
            listed = total,
            in_scope = objects.len(),
            "objects outside the sweep scope skipped"
        );

        let mut summary = SweepSummary {
            scanned: objects.len(),
            ..SweepSummary::default()
        };

        for object in objects {
            let Some(last_modified) = object.last_modified else {
                continue;
            };
            if last_modified >= cutoff {
                continue;
            }
            info!(key = %object.key, %last_modified, "deleting expired archive object");
            match self.storage.delete_object(&object.key).await {
                Ok(()) => summary.deleted.push(object.key),
                Err(err) => {
                    warn!(key = %object.key, error = %err, "failed to delete expired archive object");
                    summary.failed.push(object.key);
                }
            }
        }

        info!(
            scanned = summary.scanned,
            deleted = summary.deleted.len(),
            failed = summary.failed.len(),
            "retention sweep finished"
        );
        Ok(summary)
    }
}
