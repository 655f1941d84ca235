use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Read a present field, `null` included, as `Some`. Paired with
/// `#[serde(default)]` so only an absent field becomes `None`.
pub(crate) fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
  D: Deserializer<'de>,
{
  Value::deserialize(deserializer).map(Some)
}
