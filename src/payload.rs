//! Wire format for flush requests
//!
//! `{"pairs":[{"key":"a","val":7}, ...]}`. Empty strings, zero values and
//! empty pair lists are left out of the JSON.

use serde::{Deserialize, Serialize};

/// One aggregated counter on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(rename = "val", default, skip_serializing_if = "is_zero")]
    pub value: i64,
}

impl Pair {
    pub fn new(key: impl Into<String>, value: i64) -> Self {
        Pair {
            key: key.into(),
            value,
        }
    }
}

/// Decoded request body, as seen by the collection endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FlushRequest {
    #[serde(default)]
    pub pairs: Vec<Pair>,
}

#[derive(Serialize)]
struct FlushBody<'a> {
    #[serde(skip_serializing_if = "no_pairs")]
    pairs: &'a [Pair],
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

fn no_pairs(pairs: &&[Pair]) -> bool {
    pairs.is_empty()
}

/// Serialize pairs into a request body
pub fn encode(pairs: &[Pair]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&FlushBody { pairs })
}

/// Parse a request body
pub fn decode(body: &[u8]) -> Result<FlushRequest, serde_json::Error> {
    serde_json::from_slice(body)
}
