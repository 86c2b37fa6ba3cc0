//! Multilingual package metadata.
//!
//! Most CKAN portals return `description`/`notes` as plain strings. Some
//! return a language-keyed object instead:
//!
//! ```json
//! { "en": "Resale flat prices", "zh": "转售组屋价格" }
//! ```
//!
//! [`LocalizedField`] accepts both shapes so [`PackageMetadata`](crate::PackageMetadata)
//! works unchanged against either kind of portal.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A field that may be either a plain string or a multilingual map.
///
/// # Examples
///
/// ```
/// use vesta_core::LocalizedField;
///
/// let plain: LocalizedField = serde_json::from_str(r#""Rainfall""#).unwrap();
/// assert_eq!(plain.resolve("zh"), "Rainfall");
///
/// let multi: LocalizedField =
///     serde_json::from_str(r#"{"en": "Rainfall", "ms": "Hujan"}"#).unwrap();
/// assert_eq!(multi.resolve("ms"), "Hujan");
/// assert_eq!(multi.resolve("ta"), "Rainfall"); // falls back to "en"
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalizedField {
    Plain(String),
    /// Language code to text. Ordered so the last-resort fallback is stable.
    Multilingual(BTreeMap<String, String>),
}

impl LocalizedField {
    /// Resolves to a single string: preferred language, then `"en"`, then the
    /// first translation by language code, then the empty string.
    pub fn resolve(&self, preferred_language: &str) -> String {
        match self {
            LocalizedField::Plain(s) => s.clone(),
            LocalizedField::Multilingual(map) => map
                .get(preferred_language)
                .or_else(|| map.get("en"))
                .or_else(|| map.values().next())
                .cloned()
                .unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            LocalizedField::Plain(s) => s.trim().is_empty(),
            LocalizedField::Multilingual(map) => map.values().all(|v| v.trim().is_empty()),
        }
    }
}

impl From<&str> for LocalizedField {
    fn from(value: &str) -> Self {
        LocalizedField::Plain(value.to_string())
    }
}

impl Serialize for LocalizedField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LocalizedField::Plain(s) => serializer.serialize_str(s),
            LocalizedField::Multilingual(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for LocalizedField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct LocalizedFieldVisitor;

        impl<'de> Visitor<'de> for LocalizedFieldVisitor {
            type Value = LocalizedField;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string or a map of language codes to strings")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<LocalizedField, E> {
                Ok(LocalizedField::Plain(value.to_string()))
            }

            fn visit_string<E: de::Error>(self, value: String) -> Result<LocalizedField, E> {
                Ok(LocalizedField::Plain(value))
            }

            fn visit_map<M>(self, map: M) -> Result<LocalizedField, M::Error>
            where
                M: MapAccess<'de>,
            {
                let translations: BTreeMap<String, String> =
                    Deserialize::deserialize(de::value::MapAccessDeserializer::new(map))?;
                Ok(LocalizedField::Multilingual(translations))
            }
        }

        deserializer.deserialize_any(LocalizedFieldVisitor)
    }
}
