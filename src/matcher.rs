//! Matcher
//!
//! Predicate evaluation over index records.
//!
//! ## Predicates (all optional, AND-combined)
//! - key: exact, set membership or regex (string keys only)
//! - not-key
//! - rowid range, inclusive; negative bounds count from the end
//! - `t` range and `tm` range, inclusive; bounds may be dates
//! - user flag: equal, not equal, mask all set, mask all clear
//!
//! ## End of range
//! Scans are ordered by rowid, so crossing the far bound of a range means
//! nothing further can match. Forward scans signal end when a record is
//! past a `to_*` bound, backward scans when a record is before a `from_*`
//! bound.

use regex::Regex;

use crate::error::{Result, TrangerError};
use crate::flags::{KeyType, SystemFlag};
use crate::index::{IndexRecord, Key};
use crate::time;

// =============================================================================
// Filter (caller side)
// =============================================================================

/// Key predicate of a filter
#[derive(Debug, Clone, PartialEq)]
pub enum KeyFilter {
    Exact(Key),
    Set(Vec<Key>),
    /// Regex over string keys
    Pattern(String),
}

/// Time bound given as a timestamp or a date string
#[derive(Debug, Clone, PartialEq)]
pub enum TimeBound {
    At(u64),
    Date(String),
}

impl From<u64> for TimeBound {
    fn from(v: u64) -> Self {
        TimeBound::At(v)
    }
}

impl From<&str> for TimeBound {
    fn from(s: &str) -> Self {
        TimeBound::Date(s.to_string())
    }
}

/// Filter over a topic's records
///
/// Rowid bounds of `0` are unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub key: Option<KeyFilter>,
    pub not_key: Option<Key>,
    pub from_rowid: i64,
    pub to_rowid: i64,
    pub from_t: Option<TimeBound>,
    pub to_t: Option<TimeBound>,
    pub from_tm: Option<TimeBound>,
    pub to_tm: Option<TimeBound>,
    pub user_flag: Option<u32>,
    pub not_user_flag: Option<u32>,
    pub user_flag_mask_set: Option<u32>,
    pub user_flag_mask_notset: Option<u32>,
    /// Iterate from the tail towards the head
    pub backward: bool,
    /// Never read payloads
    pub only_md: bool,
}

impl Filter {
    /// Match-all filter
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(KeyFilter::Exact(key.into()));
        self
    }

    pub fn keys<K: Into<Key>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.key = Some(KeyFilter::Set(keys.into_iter().map(Into::into).collect()));
        self
    }

    pub fn key_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.key = Some(KeyFilter::Pattern(pattern.into()));
        self
    }

    pub fn not_key(mut self, key: impl Into<Key>) -> Self {
        self.not_key = Some(key.into());
        self
    }

    pub fn from_rowid(mut self, rowid: i64) -> Self {
        self.from_rowid = rowid;
        self
    }

    pub fn to_rowid(mut self, rowid: i64) -> Self {
        self.to_rowid = rowid;
        self
    }

    pub fn from_t(mut self, t: impl Into<TimeBound>) -> Self {
        self.from_t = Some(t.into());
        self
    }

    pub fn to_t(mut self, t: impl Into<TimeBound>) -> Self {
        self.to_t = Some(t.into());
        self
    }

    pub fn from_tm(mut self, tm: impl Into<TimeBound>) -> Self {
        self.from_tm = Some(tm.into());
        self
    }

    pub fn to_tm(mut self, tm: impl Into<TimeBound>) -> Self {
        self.to_tm = Some(tm.into());
        self
    }

    pub fn user_flag(mut self, flag: u32) -> Self {
        self.user_flag = Some(flag);
        self
    }

    pub fn not_user_flag(mut self, flag: u32) -> Self {
        self.not_user_flag = Some(flag);
        self
    }

    pub fn user_flag_mask_set(mut self, mask: u32) -> Self {
        self.user_flag_mask_set = Some(mask);
        self
    }

    pub fn user_flag_mask_notset(mut self, mask: u32) -> Self {
        self.user_flag_mask_notset = Some(mask);
        self
    }

    pub fn backward(mut self, backward: bool) -> Self {
        self.backward = backward;
        self
    }

    pub fn only_md(mut self, only_md: bool) -> Self {
        self.only_md = only_md;
        self
    }
}

// =============================================================================
// Match Result
// =============================================================================

/// Outcome of matching one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    /// Nothing further in the scan direction can match
    pub end: bool,
}

impl MatchResult {
    pub const MATCH: MatchResult = MatchResult { matched: true, end: false };
    pub const MISS: MatchResult = MatchResult { matched: false, end: false };
    pub const END: MatchResult = MatchResult { matched: false, end: true };
}

// =============================================================================
// Compiled Matcher
// =============================================================================

#[derive(Debug, Clone)]
enum KeyPredicate {
    Exact(Key),
    Set(Vec<Key>),
    Pattern(Regex),
}

/// A filter type-checked against a topic and compiled for repeated use
#[derive(Debug, Clone)]
pub struct Matcher {
    key: Option<KeyPredicate>,
    not_key: Option<Key>,
    from_rowid: i64,
    to_rowid: i64,
    from_t: Option<u64>,
    to_t: Option<u64>,
    from_tm: Option<u64>,
    to_tm: Option<u64>,
    user_flag: Option<u32>,
    not_user_flag: Option<u32>,
    user_flag_mask_set: Option<u32>,
    user_flag_mask_notset: Option<u32>,
    backward: bool,
}

impl Matcher {
    /// Compile a filter for a topic with the given system flag
    pub fn compile(filter: &Filter, system_flag: SystemFlag) -> Result<Self> {
        let key_type = system_flag.key_type();

        let key = match &filter.key {
            None => None,
            Some(KeyFilter::Exact(k)) => {
                check_key(k, key_type)?;
                Some(KeyPredicate::Exact(k.clone()))
            }
            Some(KeyFilter::Set(keys)) => {
                for k in keys {
                    check_key(k, key_type)?;
                }
                Some(KeyPredicate::Set(keys.clone()))
            }
            Some(KeyFilter::Pattern(p)) => {
                if key_type.is_integer() {
                    return Err(TrangerError::Parameter(
                        "key pattern on a topic with integer keys".to_string(),
                    ));
                }
                Some(KeyPredicate::Pattern(Regex::new(p)?))
            }
        };

        if let Some(k) = &filter.not_key {
            check_key(k, key_type)?;
        }

        let t_ms = system_flag.contains(SystemFlag::T_MS);
        let tm_ms = system_flag.contains(SystemFlag::TM_MS);

        Ok(Self {
            key,
            not_key: filter.not_key.clone(),
            from_rowid: filter.from_rowid,
            to_rowid: filter.to_rowid,
            from_t: resolve_time(filter.from_t.as_ref(), t_ms)?,
            to_t: resolve_time(filter.to_t.as_ref(), t_ms)?,
            from_tm: resolve_time(filter.from_tm.as_ref(), tm_ms)?,
            to_tm: resolve_time(filter.to_tm.as_ref(), tm_ms)?,
            user_flag: filter.user_flag,
            not_user_flag: filter.not_user_flag,
            user_flag_mask_set: filter.user_flag_mask_set,
            user_flag_mask_notset: filter.user_flag_mask_notset,
            backward: filter.backward,
        })
    }

    pub fn is_backward(&self) -> bool {
        self.backward
    }

    /// Lower rowid bound against the current topic size
    pub fn from_rowid(&self, total_rows: u64) -> Option<u64> {
        match self.from_rowid {
            0 => None,
            v if v > 0 => Some(v as u64),
            v => Some((total_rows as i64 + v + 1).max(1) as u64),
        }
    }

    /// Upper rowid bound against the current topic size
    pub fn to_rowid(&self, total_rows: u64) -> Option<u64> {
        match self.to_rowid {
            0 => None,
            v if v > 0 => Some(v as u64),
            v => Some((total_rows as i64 + v).max(0) as u64),
        }
    }

    /// First rowid a scan should visit, if any
    pub fn start_rowid(&self, total_rows: u64) -> Option<u64> {
        if total_rows == 0 {
            return None;
        }
        let start = if self.backward {
            self.to_rowid(total_rows)
                .map_or(total_rows, |to| to.min(total_rows))
        } else {
            self.from_rowid(total_rows).unwrap_or(1)
        };
        (start >= 1 && start <= total_rows).then_some(start)
    }

    /// Evaluate one record
    pub fn matches(&self, record: &IndexRecord, total_rows: u64) -> MatchResult {
        let from_rowid = self.from_rowid(total_rows);
        let to_rowid = self.to_rowid(total_rows);

        let ranges = [
            (record.rowid, from_rowid, to_rowid),
            (record.t, self.from_t, self.to_t),
            (record.tm, self.from_tm, self.to_tm),
        ];
        for (value, from, to) in ranges {
            let below = from.is_some_and(|f| value < f);
            let above = to.is_some_and(|t| value > t);
            if self.backward && below || !self.backward && above {
                return MatchResult::END;
            }
            if below || above {
                return MatchResult::MISS;
            }
        }

        if let Some(predicate) = &self.key {
            let hit = match predicate {
                KeyPredicate::Exact(k) => &record.key == k,
                KeyPredicate::Set(keys) => keys.contains(&record.key),
                KeyPredicate::Pattern(re) => record.key.as_str().is_some_and(|s| re.is_match(s)),
            };
            if !hit {
                return MatchResult::MISS;
            }
        }

        if self.not_key.as_ref() == Some(&record.key) {
            return MatchResult::MISS;
        }

        let uf = record.user_flag;
        if self.user_flag.is_some_and(|f| uf != f)
            || self.not_user_flag.is_some_and(|f| uf == f)
            || self.user_flag_mask_set.is_some_and(|m| uf & m != m)
            || self.user_flag_mask_notset.is_some_and(|m| uf & m != 0)
        {
            return MatchResult::MISS;
        }

        MatchResult::MATCH
    }
}

/// Match one record against a filter without keeping the compiled form
pub fn match_record(
    filter: &Filter,
    system_flag: SystemFlag,
    total_rows: u64,
    record: &IndexRecord,
) -> Result<MatchResult> {
    Ok(Matcher::compile(filter, system_flag)?.matches(record, total_rows))
}

fn check_key(key: &Key, key_type: KeyType) -> Result<()> {
    match (key, key_type.is_integer()) {
        (Key::Int(_), true) | (Key::Str(_), false) => Ok(()),
        _ => Err(TrangerError::Parameter(format!(
            "key {} does not match topic key type {:?}",
            key, key_type
        ))),
    }
}

fn resolve_time(bound: Option<&TimeBound>, in_ms: bool) -> Result<Option<u64>> {
    match bound {
        None => Ok(None),
        Some(TimeBound::At(v)) => Ok(Some(*v)),
        Some(TimeBound::Date(s)) => {
            let secs = time::parse_date(s)
                .ok_or_else(|| TrangerError::Parameter(format!("unparseable date: {}", s)))?;
            if !in_ms {
                return Ok(Some(secs));
            }
            secs.checked_mul(1000)
                .map(Some)
                .ok_or_else(|| TrangerError::Parameter(format!("date out of range: {}", s)))
        }
    }
}
