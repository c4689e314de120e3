//! Stream control requests
//!
//! Sends: `{"method":"SUBSCRIBE","params":["btcusdt@trade"],"id":1}`

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamMethod {
    Subscribe,
    Unsubscribe,
}

/// Subscribe/unsubscribe request written to the feed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamRequest {
    pub method: StreamMethod,
    pub params: Vec<String>,
    pub id: u64,
}

impl StreamRequest {
    pub fn subscribe(params: Vec<String>, id: u64) -> Self {
        Self {
            method: StreamMethod::Subscribe,
            params,
            id,
        }
    }

    pub fn unsubscribe(params: Vec<String>, id: u64) -> Self {
        Self {
            method: StreamMethod::Unsubscribe,
            params,
            id,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
