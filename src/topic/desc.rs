//! Topic descriptor files
//!
//! `topic_desc` is written once at creation; `topic_var` and `topic_cols`
//! may be rewritten by the master.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TrangerError};
use crate::flags::SystemFlag;

pub const DESC_FILENAME: &str = "topic_desc";
pub const VAR_FILENAME: &str = "topic_var";
pub const COLS_FILENAME: &str = "topic_cols";
pub const INDEX_FILENAME: &str = "topic_idx";
pub const DATA_DIRNAME: &str = "data";

/// Immutable description of a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDesc {
    pub topic_name: String,
    pub pkey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tkey: Option<String>,
    pub system_flag: SystemFlag,
}

impl TopicDesc {
    /// Topic with rowid keys stored under `id`
    pub fn new(topic_name: impl Into<String>) -> Self {
        Self {
            topic_name: topic_name.into(),
            pkey: "id".to_string(),
            tkey: None,
            system_flag: SystemFlag::ROWID_KEY,
        }
    }

    pub fn pkey(mut self, pkey: impl Into<String>) -> Self {
        self.pkey = pkey.into();
        self
    }

    pub fn tkey(mut self, tkey: impl Into<String>) -> Self {
        self.tkey = Some(tkey.into());
        self
    }

    pub fn system_flag(mut self, flag: SystemFlag) -> Self {
        self.system_flag = flag;
        self
    }

    /// Reject descriptors the engine cannot serve
    pub fn validate(&self) -> Result<()> {
        validate_topic_name(&self.topic_name)?;

        if self.pkey.is_empty() {
            return Err(TrangerError::Parameter(format!(
                "topic {}: pkey is empty",
                self.topic_name
            )));
        }

        let key_bits = (self.system_flag & SystemFlag::KEY_TYPE_MASK).bits();
        if key_bits.count_ones() > 1 {
            return Err(TrangerError::Parameter(format!(
                "topic {}: more than one key type in system flag {}",
                self.topic_name, self.system_flag
            )));
        }

        if self
            .system_flag
            .intersects(SystemFlag::ZIP_RECORD | SystemFlag::CIPHER_RECORD)
        {
            return Err(TrangerError::Parameter(format!(
                "topic {}: compressed or encrypted records are not supported",
                self.topic_name
            )));
        }

        if self.system_flag.intersects(SystemFlag::NOT_INHERITED_MASK) {
            return Err(TrangerError::Parameter(format!(
                "topic {}: per-record bits in system flag {}",
                self.topic_name, self.system_flag
            )));
        }

        Ok(())
    }
}

/// Everything needed to create a topic
#[derive(Debug, Clone)]
pub struct TopicOptions {
    pub desc: TopicDesc,
    /// Column description, opaque to the engine
    pub cols: Value,
    /// Free-form variables
    pub var: Value,
}

impl TopicOptions {
    pub fn new(desc: TopicDesc) -> Self {
        Self {
            desc,
            cols: Value::Object(Default::default()),
            var: Value::Object(Default::default()),
        }
    }

    pub fn cols(mut self, cols: Value) -> Self {
        self.cols = cols;
        self
    }

    pub fn var(mut self, var: Value) -> Self {
        self.var = var;
        self
    }
}

pub fn validate_topic_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.starts_with("__")
        || name.contains(['/', '\\', '\0'])
    {
        return Err(TrangerError::Parameter(format!(
            "invalid topic name: {:?}",
            name
        )));
    }
    Ok(())
}

/// Merge `update` into `target`, both JSON objects
pub fn merge_var(target: &mut Value, update: &Value) {
    match (target, update) {
        (Value::Object(dst), Value::Object(src)) => {
            for (k, v) in src {
                dst.insert(k.clone(), v.clone());
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}
