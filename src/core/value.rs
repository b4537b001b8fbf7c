use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::core::ids::NodeId;

/// The dynamically-typed value a property holds. The backing store keeps
/// this as UTF-8 text (a JSON scalar, array, or object); this is the
/// deserialized, typed view evaluators and services operate on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value")]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Ref(NodeId),
    Refs(Vec<NodeId>),
    Json(Json),
}

impl PropertyValue {
    /// Parses the raw text stored in `properties.value` into a typed value.
    /// Falls back to `Text` for anything that isn't valid JSON, since a bare
    /// reference id is stored unquoted.
    pub fn from_stored(raw: &str) -> Self {
        match serde_json::from_str::<Json>(raw) {
            Ok(Json::Null) => PropertyValue::Null,
            Ok(Json::Bool(b)) => PropertyValue::Bool(b),
            Ok(Json::Number(n)) => PropertyValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Ok(Json::String(s)) => match s.parse::<NodeId>() {
                Ok(id) => PropertyValue::Ref(id),
                Err(_) => PropertyValue::Text(s),
            },
            Ok(Json::Array(items)) => {
                let refs: Option<Vec<NodeId>> = items
                    .iter()
                    .map(|v| v.as_str().and_then(|s| s.parse::<NodeId>().ok()))
                    .collect();
                match refs {
                    Some(refs) => PropertyValue::Refs(refs),
                    None => PropertyValue::Json(Json::Array(items)),
                }
            }
            Ok(json @ Json::Object(_)) => PropertyValue::Json(json),
            Err(_) => raw
                .parse::<NodeId>()
                .map(PropertyValue::Ref)
                .unwrap_or_else(|_| PropertyValue::Text(raw.to_string())),
        }
    }

    /// Serializes to the text representation the store persists.
    pub fn to_stored(&self) -> String {
        match self {
            PropertyValue::Null => "null".to_string(),
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::Number(n) => n.to_string(),
            PropertyValue::Text(s) => Json::String(s.clone()).to_string(),
            PropertyValue::Ref(id) => Json::String(id.to_string()).to_string(),
            PropertyValue::Refs(ids) => {
                Json::Array(ids.iter().map(|id| Json::String(id.to_string())).collect())
                    .to_string()
            }
            PropertyValue::Json(json) => json.to_string(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            PropertyValue::Text(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<NodeId> {
        match self {
            PropertyValue::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Ordering used by the query evaluator's comparators and by sort.
    /// NULL sorts after every other value, mirroring conventional NULLS LAST
    /// semantics; NaN is treated as equal to itself and greater than every
    /// other number.
    pub fn compare(&self, other: &PropertyValue) -> Ordering {
        use PropertyValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Greater,
            (_, Null) => Ordering::Less,
            (Number(a), Number(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            },
            (Text(a), Text(b)) => a.cmp(b),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Ref(a), Ref(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Number(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<NodeId> for PropertyValue {
    fn from(id: NodeId) -> Self {
        PropertyValue::Ref(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_round_trips_through_stored_form() {
        let v = PropertyValue::Text("done".to_string());
        let stored = v.to_stored();
        assert_eq!(PropertyValue::from_stored(&stored), v);
    }

    #[test]
    fn ref_round_trips_through_stored_form() {
        let id = NodeId::new();
        let v = PropertyValue::Ref(id);
        let stored = v.to_stored();
        assert_eq!(PropertyValue::from_stored(&stored), PropertyValue::Ref(id));
    }

    #[test]
    fn null_sorts_after_everything() {
        assert_eq!(
            PropertyValue::Null.compare(&PropertyValue::Number(1.0)),
            Ordering::Greater
        );
        assert_eq!(
            PropertyValue::Number(1.0).compare(&PropertyValue::Null),
            Ordering::Less
        );
    }

    #[test]
    fn nan_is_equal_to_itself_and_greater_than_numbers() {
        let nan = PropertyValue::Number(f64::NAN);
        assert_eq!(nan.compare(&nan), Ordering::Equal);
        assert_eq!(nan.compare(&PropertyValue::Number(1.0)), Ordering::Greater);
    }
}
