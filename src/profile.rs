use std::collections::HashMap;

use serde::Deserialize;

use crate::error::Result;
use crate::model::FieldType;

/// Values to type into forms, keyed by semantic type. Loaded once per run
/// and shared read-only between workers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileData {
    values: HashMap<FieldType, String>,
}

#[derive(Deserialize)]
#[serde(transparent)]
struct RawProfile(HashMap<String, Option<serde_json::Value>>);

impl ProfileData {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (FieldType, S)>,
        S: Into<String>,
    {
        let values = pairs
            .into_iter()
            .filter(|(t, _)| t.is_fillable())
            .map(|(t, v)| (t, v.into()))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();
        Self { values }
    }

    /// Resolves loosely named keys (`full_name`, `first_name` + `last_name`,
    /// `company_name`, `comments`, `topic`, `telephone`, ...) onto semantic types.
    pub fn from_raw(raw: &HashMap<String, String>) -> Self {
        let norm: HashMap<String, &str> = raw
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (normalize_key(k), v.trim()))
            .collect();
        let pick = |keys: &[&str]| keys.iter().find_map(|k| norm.get(*k).map(|v| v.to_string()));

        let mut values = HashMap::new();
        let name = pick(&["name", "fullname"]).or_else(|| {
            let first = pick(&["firstname"]).unwrap_or_default();
            let last = pick(&["lastname", "surname"]).unwrap_or_default();
            let joined = format!("{first} {last}").trim().to_string();
            (!joined.is_empty()).then_some(joined)
        });
        let resolved = [
            (FieldType::Name, name),
            (FieldType::Email, pick(&["email", "emailaddress", "mail"])),
            (FieldType::Phone, pick(&["phone", "phonenumber", "telephone", "tel", "mobile"])),
            (FieldType::Company, pick(&["company", "companyname", "organization", "business"])),
            (FieldType::Subject, pick(&["subject", "topic", "title"])),
            (FieldType::Message, pick(&["message", "comment", "comments", "inquiry"])),
        ];
        for (field_type, value) in resolved {
            if let Some(value) = value {
                values.insert(field_type, value);
            }
        }
        Self { values }
    }

    /// Parse a flat JSON object of profile values.
    pub fn from_json(json: &str) -> Result<Self> {
        let RawProfile(raw) = serde_json::from_str(json)?;
        let flat = raw
            .into_iter()
            .filter_map(|(k, v)| match v? {
                serde_json::Value::String(s) => Some((k, s)),
                serde_json::Value::Number(n) => Some((k, n.to_string())),
                _ => None,
            })
            .collect();
        Ok(Self::from_raw(&flat))
    }

    pub fn get(&self, field_type: FieldType) -> Option<&str> {
        self.values.get(&field_type).map(String::as_str)
    }

    pub fn known_types(&self) -> Vec<FieldType> {
        let mut types: Vec<_> = self.values.keys().copied().collect();
        types.sort();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
