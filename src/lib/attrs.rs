//! Loosely-typed attribute records, the structured counterpart of a locator.

use std::collections::BTreeMap;

use crate::error::Error;

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum Attr {
    Int(u64),
    String(String),
}

/// An attribute record. A `BTreeMap` keeps the serialised form in key order.
pub type Attrs = BTreeMap<String, Attr>;

impl From<&str> for Attr {
    fn from(value: &str) -> Self {
        Attr::String(value.to_string())
    }
}

impl From<String> for Attr {
    fn from(value: String) -> Self {
        Attr::String(value)
    }
}

impl From<u64> for Attr {
    fn from(value: u64) -> Self {
        Attr::Int(value)
    }
}

impl std::fmt::Display for Attr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attr::Int(value) => write!(f, "{value}"),
            Attr::String(value) => write!(f, "{value}"),
        }
    }
}

/// Get a string attribute if present. Fails if the attribute has another type.
pub fn maybe_get_str<'a>(attrs: &'a Attrs, name: &str) -> Result<Option<&'a str>, Error> {
    match attrs.get(name) {
        None => Ok(None),
        Some(Attr::String(value)) => Ok(Some(value)),
        Some(Attr::Int(_)) => Err(Error::invalid_attribute(name, "expected a string")),
    }
}

/// Get a required string attribute.
pub fn get_str<'a>(attrs: &'a Attrs, name: &str) -> Result<&'a str, Error> {
    maybe_get_str(attrs, name)?.ok_or_else(|| Error::MissingAttribute {
        name: name.to_string(),
    })
}

/// Get an integer attribute if present. Fails if the attribute has another type.
pub fn maybe_get_int(attrs: &Attrs, name: &str) -> Result<Option<u64>, Error> {
    match attrs.get(name) {
        None => Ok(None),
        Some(Attr::Int(value)) => Ok(Some(*value)),
        Some(Attr::String(_)) => Err(Error::invalid_attribute(name, "expected an integer")),
    }
}

/// Build an [`Attrs`] record from `key => value` pairs.
#[macro_export]
macro_rules! attrs {
    ($($key:literal => $value:expr),* $(,)?) => {{
        let mut attrs = $crate::Attrs::new();
        $(attrs.insert($key.to_string(), $crate::Attr::from($value));)*
        attrs
    }};
}

#[cfg(test)]
mod test_attrs {
    use super::*;

    #[test]
    fn typed_getters_reject_wrong_types() {
        let attrs = crate::attrs! {
            "owner" => "acme",
            "lastModified" => 1_700_000_000u64,
        };
        assert_eq!(get_str(&attrs, "owner").unwrap(), "acme");
        assert_eq!(maybe_get_int(&attrs, "lastModified").unwrap(), Some(1_700_000_000));
        assert!(matches!(
            maybe_get_int(&attrs, "owner"),
            Err(Error::InvalidAttribute { name, .. }) if name == "owner"
        ));
        assert!(matches!(
            get_str(&attrs, "lastModified"),
            Err(Error::InvalidAttribute { name, .. }) if name == "lastModified"
        ));
    }

    #[test]
    fn missing_required_attribute_is_named() {
        let attrs = Attrs::new();
        assert!(matches!(
            get_str(&attrs, "repo"),
            Err(Error::MissingAttribute { name }) if name == "repo"
        ));
        assert_eq!(maybe_get_str(&attrs, "repo").unwrap(), None);
    }

    #[test]
    fn json_form_is_untagged() {
        let attrs = crate::attrs! { "type" => "github", "lastModified" => 12u64 };
        let json = serde_json::to_string(&attrs).unwrap();
        assert_eq!(json, r#"{"lastModified":12,"type":"github"}"#);
        let back: Attrs = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attrs);
    }
}
