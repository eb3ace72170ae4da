//! Principal / security context (C6)
//!
//! Immutable once constructed. Accessors into `attributes` return defensive
//! copies for mutable aggregate types (sequences, mappings) so a caller
//! cannot mutate the stored principal through a returned reference.

use serde_json::Value;

/// The authenticated identity bound to a request for its lifetime.
#[derive(Debug, Clone)]
pub struct Principal {
    user_id: String,
    organization_unit_id: String,
    application_id: String,
    token: String,
    attributes: Value,
}

impl Principal {
    pub fn new(
        user_id: impl Into<String>,
        organization_unit_id: impl Into<String>,
        application_id: impl Into<String>,
        token: impl Into<String>,
        attributes: Value,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            organization_unit_id: organization_unit_id.into(),
            application_id: application_id.into(),
            token: token.into(),
            attributes,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn organization_unit_id(&self) -> &str {
        &self.organization_unit_id
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Look up a claim by key. Scalars are returned by value; arrays and
    /// objects are cloned so mutating the result cannot affect this
    /// principal's stored attributes.
    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.attributes.get(key).cloned()
    }

    pub fn attribute_str(&self, key: &str) -> Option<String> {
        self.attributes.get(key).and_then(Value::as_str).map(str::to_string)
    }

    /// Full attribute map, defensively cloned.
    pub fn attributes(&self) -> Value {
        self.attributes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attribute_lookup_returns_a_defensive_copy() {
        let principal = Principal::new(
            "u1",
            "ou1",
            "app1",
            "token",
            json!({"scopes": ["system", "users:read"]}),
        );

        let mut first = principal.attribute("scopes").unwrap();
        first.as_array_mut().unwrap().push(json!("extra"));

        let second = principal.attribute("scopes").unwrap();
        assert_eq!(second, json!(["system", "users:read"]));
    }

    #[test]
    fn missing_attribute_returns_none() {
        let principal = Principal::new("u1", "", "", "token", json!({}));
        assert!(principal.attribute("missing").is_none());
    }
}
