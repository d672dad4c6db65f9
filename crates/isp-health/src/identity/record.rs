use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sensor::Attributes;

/// Canonical public identity, whichever provider answered
///
/// Absent fields serialize as `null` so consumers always see the same keys.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub ip: String,
    pub hostname: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub organization: Option<String>,
    pub postal_code: Option<String>,
    pub timezone: Option<String>,

    /// Name of the provider that answered
    pub source: String,
}

impl IdentityRecord {
    pub fn new(ip: impl Into<String>, source: impl Into<String>) -> Self {
        Self { ip: ip.into(), source: source.into(), ..Self::default() }
    }

    pub fn to_attributes(&self) -> Attributes {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => Attributes::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_keep_absent_fields() {
        let record = IdentityRecord::new("203.0.113.7", "ipapi");
        let attributes = record.to_attributes();

        assert_eq!(attributes.len(), 11);
        assert_eq!(attributes["ip"], "203.0.113.7");
        assert_eq!(attributes["source"], "ipapi");
        assert_eq!(attributes["hostname"], Value::Null);
        assert_eq!(attributes["latitude"], Value::Null);
    }
}
