//! Data Models Module
//!
//! This module defines the message model the queue delivers and the DKIM
//! canonicalization mode enum. Mail messages travel the queue as JSON documents
//! with their headers already split into ordered (key, value) pairs; header
//! order is preserved and keys may repeat.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Mail {
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Mail {
    /// Returns the value of the first header whose key matches exactly.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value of the first header whose key matches ignoring ASCII case.
    pub fn header_ignore_case(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// DKIM canonicalization mode, as declared by the `c=` signature tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Canonicalization {
    #[default]
    Simple,
    Relaxed,
}

impl fmt::Display for Canonicalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Canonicalization::Simple => write!(f, "simple"),
            Canonicalization::Relaxed => write!(f, "relaxed"),
        }
    }
}

impl FromStr for Canonicalization {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(Canonicalization::Simple),
            "relaxed" => Ok(Canonicalization::Relaxed),
            _ => Err(format!("Invalid canonicalization mode: {}", s)),
        }
    }
}
