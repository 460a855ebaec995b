use serde::{Deserialize, Serialize};

/// Message kind the scraper uses when publishing a problem page.
pub const PROBLEM_KIND: &str = "problem";

/// Wire envelope the scraper and viewer agree on. The hub never sees or
/// validates this shape — it relays the serialized text as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: String,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    /// Envelope carrying scraped problem HTML.
    pub fn problem(html: impl Into<String>) -> Self {
        Self::new(PROBLEM_KIND, html)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_under_the_type_key() {
        let env = Envelope::problem("<div>A + B</div>");
        let json = env.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "problem");
        assert_eq!(value["payload"], "<div>A + B</div>");
    }

    #[test]
    fn roundtrips_through_json() {
        let env = Envelope::new("status", "connected");
        let parsed = Envelope::from_json(&env.to_json().unwrap()).unwrap();
        assert_eq!(parsed, env);
    }

    #[test]
    fn rejects_missing_payload() {
        assert!(Envelope::from_json(r#"{"type":"problem"}"#).is_err());
    }
}
