use serde::{Deserialize, Deserializer, de};
use std::collections::HashMap;

pub fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Reject empty strings for fields the API always fills in.
pub fn deserialize_non_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    if value.is_empty() {
        return Err(de::Error::invalid_length(0, &"a non-empty string"));
    }
    Ok(value)
}

/// Expand `${VAR}` references in map values from the process environment.
pub fn deserialize_with_envsubst<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, String>::deserialize(deserializer)?;
    // envsubst refuses variables that contain its own delimiters.
    let vars: HashMap<String, String> = std::env::vars()
        .filter(|(key, value)| {
            [key, value]
                .iter()
                .all(|s| !s.contains("${") && !s.contains('}'))
        })
        .collect();
    substitute_values(raw, &vars).map_err(de::Error::custom)
}

pub fn substitute_values(
    raw: HashMap<String, String>,
    vars: &HashMap<String, String>,
) -> Result<HashMap<String, String>, String> {
    raw.into_iter()
        .map(|(key, value)| {
            envsubst::substitute(value, vars)
                .map(|value| (key, value))
                .map_err(|err| err.to_string())
        })
        .collect()
}
