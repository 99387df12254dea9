use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Server ids arrive as JSON strings or integers; both are kept as text.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Signed(n) => n.to_string(),
            RawId::Unsigned(n) => n.to_string(),
        }
    }
}

/// Reads an id out of a loosely-typed value: a string, a number, or a nested
/// object carrying `id`.
pub fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => obj.get("id").and_then(id_text),
        _ => None,
    }
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                RawId::deserialize(deserializer).map(|raw| Self(raw.into_string()))
            }
        }
    };
}

opaque_id!(
    /// Identifier of a master skill in the registry.
    SkillId
);
opaque_id!(
    /// Identifier of a job-skill association.
    AssociationId
);
opaque_id!(
    /// Identifier of a job posting.
    JobId
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_and_string_ids_deserialize() {
        let a: SkillId = serde_json::from_value(json!(42)).unwrap();
        let b: SkillId = serde_json::from_value(json!("42")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "42");
    }

    #[test]
    fn test_id_serializes_as_string() {
        assert_eq!(serde_json::to_value(JobId::from("job-7")).unwrap(), json!("job-7"));
    }

    #[test]
    fn test_id_text_reads_nested_object() {
        assert_eq!(id_text(&json!({"id": 9, "title": "Plumber"})), Some("9".to_string()));
        assert_eq!(id_text(&json!("")), None);
        assert_eq!(id_text(&Value::Null), None);
    }
}
