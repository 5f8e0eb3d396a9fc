//! Filename mask
//!
//! Turns a record time into a bucket name. Masks containing `%` are
//! strftime patterns; others use the legacy token form
//! (`CCYY`, `YY`, `MM`, `DD`, `ZZZ`, `HH`).

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};

use crate::error::{Result, TrangerError};
use crate::time;

/// Legacy tokens and their strftime equivalents, longest first
const LEGACY_TOKENS: &[(&str, &str)] = &[
    ("CCYY", "%Y"),
    ("ZZZ", "%j"),
    ("YY", "%y"),
    ("MM", "%m"),
    ("DD", "%d"),
    ("HH", "%H"),
];

/// Compiled bucket naming pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameMask {
    /// Mask as configured
    mask: String,
    /// Equivalent strftime pattern
    pattern: String,
}

impl FilenameMask {
    /// Compile a mask, rejecting invalid strftime specifiers
    pub fn new(mask: &str) -> Result<Self> {
        if mask.is_empty() {
            return Err(TrangerError::Config("filename mask is empty".to_string()));
        }

        let pattern = if mask.contains('%') {
            mask.to_string()
        } else {
            translate_legacy(mask)
        };

        if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
            return Err(TrangerError::Config(format!(
                "invalid filename mask: {}",
                mask
            )));
        }

        Ok(Self {
            mask: mask.to_string(),
            pattern,
        })
    }

    /// Bucket name for a record time
    pub fn bucket(&self, t: u64, in_ms: bool) -> Result<String> {
        let dt = time::to_datetime(t, in_ms);
        let mut name = String::new();
        write!(name, "{}", dt.format(&self.pattern)).map_err(|_| {
            TrangerError::Config(format!("cannot format filename mask {}", self.mask))
        })?;
        Ok(name)
    }

    pub fn as_str(&self) -> &str {
        &self.mask
    }
}

fn translate_legacy(mask: &str) -> String {
    let mut out = String::with_capacity(mask.len() + 8);
    let mut rest = mask;

    'outer: while !rest.is_empty() {
        for (token, strftime) in LEGACY_TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(strftime);
                rest = tail;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }

    out
}
