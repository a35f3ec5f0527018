//! Retention policy model and validation

use crate::error::PolicyError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Option key for the optional age filter.
pub const MAX_AGE_KEY: &str = "max-age-hours";

/// Retention bucket with an independent keep count
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Bucket {
    pub const ALL: [Bucket; 5] = [
        Bucket::Hourly,
        Bucket::Daily,
        Bucket::Weekly,
        Bucket::Monthly,
        Bucket::Yearly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Hourly => "hourly",
            Bucket::Daily => "daily",
            Bucket::Weekly => "weekly",
            Bucket::Monthly => "monthly",
            Bucket::Yearly => "yearly",
        }
    }

    /// Key used in the persisted `options` table, e.g. `keep-hourly`.
    pub fn option_key(self) -> &'static str {
        match self {
            Bucket::Hourly => "keep-hourly",
            Bucket::Daily => "keep-daily",
            Bucket::Weekly => "keep-weekly",
            Bucket::Monthly => "keep-monthly",
            Bucket::Yearly => "keep-yearly",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn from_option_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.option_key() == key)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| format!("unknown bucket '{}'", s))
    }
}

/// Raw retention options exactly as persisted in a volume config.
///
/// Kept unvalidated so that a malformed entry only fails its own volume.
pub type PolicyOptions = BTreeMap<String, i64>;

/// Validated retention policy
///
/// A keep count of 0 disables the bucket: nothing of that type survives
/// pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionPolicy {
    keep: [u32; 5],
    max_age: Option<Duration>,
}

impl RetentionPolicy {
    /// Policy retaining nothing in any bucket.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keep(mut self, bucket: Bucket, count: u32) -> Self {
        self.keep[bucket.index()] = count;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn keep(&self, bucket: Bucket) -> usize {
        self.keep[bucket.index()] as usize
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Render back to the persisted option table.
    pub fn to_options(&self) -> PolicyOptions {
        let mut options: PolicyOptions = Bucket::ALL
            .into_iter()
            .map(|b| (b.option_key().to_string(), i64::from(self.keep[b.index()])))
            .collect();
        if let Some(max_age) = self.max_age {
            options.insert(MAX_AGE_KEY.to_string(), max_age.num_hours());
        }
        options
    }
}

/// Validate raw options into a [`RetentionPolicy`].
///
/// Missing bucket keys mean a keep count of 0. Fails on negative counts and
/// on any key outside `keep-<bucket>` / `max-age-hours`.
pub fn validate(options: &PolicyOptions) -> Result<RetentionPolicy, PolicyError> {
    let mut policy = RetentionPolicy::new();

    for (key, &value) in options {
        if key == MAX_AGE_KEY {
            if value <= 0 {
                return Err(PolicyError::InvalidMaxAge(value));
            }
            let max_age = Duration::try_hours(value).ok_or(PolicyError::InvalidMaxAge(value))?;
            policy = policy.with_max_age(max_age);
            continue;
        }

        let bucket =
            Bucket::from_option_key(key).ok_or_else(|| PolicyError::UnknownKey(key.clone()))?;
        if value < 0 {
            return Err(PolicyError::NegativeCount {
                bucket: bucket.to_string(),
                count: value,
            });
        }
        let count = u32::try_from(value).map_err(|_| PolicyError::CountOverflow {
            bucket: bucket.to_string(),
            count: value,
        })?;
        policy = policy.with_keep(bucket, count);
    }

    Ok(policy)
}
