use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Common wrapper around every broker message: publish timestamp,
/// publisher name, message kind (matches the channel suffix), and the
/// payload object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

impl Envelope {
    /// Wrap a payload, stamping the current UTC time and publisher name.
    pub fn wrap<T: Serialize>(
        agent: &str,
        kind: &str,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            kind: kind.to_string(),
            data: serde_json::to_value(payload)?,
        })
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Deserialize the payload into its typed shape.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}
