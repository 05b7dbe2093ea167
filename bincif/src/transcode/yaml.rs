//! YAML transcoding: convert a CIF document tree to YAML text.
//!
//! Mapping from CIF to YAML:
//!   - Node::Null     -> YAML null (CIF `?`)
//!   - Node::Integer  -> YAML integer (arbitrary precision as string if > i64)
//!   - Node::Float    -> YAML float
//!   - Node::String   -> YAML string (CIF `.` stays the string ".")
//!   - Node::Array    -> YAML sequence (one per looped column)
//!   - Node::Object   -> YAML mapping, in document order

use libcif::Node;
use num_traits::ToPrimitive;

/// Encode a document tree as a YAML string.
pub fn encode(node: &Node) -> Result<String, String> {
    serde_yaml::to_string(&node_to_yaml(node)).map_err(|e| format!("YAML encode error: {}", e))
}

fn node_to_yaml(node: &Node) -> serde_yaml::Value {
    match node {
        Node::Null => serde_yaml::Value::Null,
        Node::Integer(n) => {
            if let Some(i) = n.to_i64() {
                serde_yaml::Value::Number(serde_yaml::Number::from(i))
            } else if let Some(u) = n.to_u64() {
                serde_yaml::Value::Number(serde_yaml::Number::from(u))
            } else {
                // YAML has no arbitrary-precision integers
                serde_yaml::Value::String(n.to_string())
            }
        }
        Node::Float(f) => serde_yaml::Value::Number(serde_yaml::Number::from(*f)),
        Node::String(s) => serde_yaml::Value::String(s.clone()),
        Node::Array(items) => serde_yaml::Value::Sequence(items.iter().map(node_to_yaml).collect()),
        Node::Object(entries) => {
            let mut map = serde_yaml::Mapping::new();
            for (k, v) in entries {
                map.insert(serde_yaml::Value::String(k.clone()), node_to_yaml(v));
            }
            serde_yaml::Value::Mapping(map)
        }
    }
}
