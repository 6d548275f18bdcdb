use serde::{Deserialize, Serialize};

/// Scalar attribute types a key attribute may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    /// String
    #[serde(rename = "S")]
    String,
    /// Number
    #[serde(rename = "N")]
    Number,
    /// Binary
    #[serde(rename = "B")]
    Binary,
}

impl AttributeType {
    /// Wire code used by the data store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "S",
            Self::Number => "N",
            Self::Binary => "B",
        }
    }
}

impl std::fmt::Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_type_codes() {
        assert_eq!(AttributeType::String.as_str(), "S");
        assert_eq!(AttributeType::Number.to_string(), "N");
    }

    #[test]
    fn test_attribute_type_deserializes_from_code() {
        #[derive(Deserialize)]
        struct Wrapper {
            r#type: AttributeType,
        }

        let w: Wrapper = toml::from_str(r#"type = "B""#).unwrap();
        assert_eq!(w.r#type, AttributeType::Binary);
    }
}
