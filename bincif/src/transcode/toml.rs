//! TOML transcoding: convert a CIF document tree to TOML text.
//!
//! Mapping from CIF to TOML:
//!   - Node::Null     -> error (TOML has no null; CIF `?` cannot be written)
//!   - Node::Integer  -> TOML integer (if fits in i64, otherwise error)
//!   - Node::Float    -> TOML float
//!   - Node::String   -> TOML string
//!   - Node::Array    -> TOML array
//!   - Node::Object   -> TOML table (data blocks and save frames)

use libcif::Node;
use num_traits::ToPrimitive;
use toml_edit::DocumentMut;

/// Encode a document tree as a TOML string.
pub fn encode(node: &Node) -> Result<String, String> {
    match node_to_toml(node)? {
        toml_edit::Item::Table(table) => {
            let mut doc = DocumentMut::new();
            for (key, value) in table.iter() {
                doc[key] = value.clone();
            }
            Ok(doc.to_string())
        }
        _ => Err("TOML requires the top-level value to be a table".to_string()),
    }
}

fn node_to_toml(node: &Node) -> Result<toml_edit::Item, String> {
    match node {
        Node::Object(entries) => {
            let mut table = toml_edit::Table::new();
            for (k, v) in entries {
                table.insert(k, node_to_toml(v)?);
            }
            Ok(toml_edit::Item::Table(table))
        }
        _ => Ok(toml_edit::Item::Value(node_to_value(node)?)),
    }
}

fn node_to_value(node: &Node) -> Result<toml_edit::Value, String> {
    match node {
        Node::Null => Err("TOML has no null type for unknown values".to_string()),
        Node::Integer(n) => {
            let i = n
                .to_i64()
                .ok_or_else(|| format!("Integer {} too large for TOML (i64)", n))?;
            Ok(toml_edit::Value::Integer(toml_edit::Formatted::new(i)))
        }
        Node::Float(f) => Ok(toml_edit::Value::Float(toml_edit::Formatted::new(*f))),
        Node::String(s) => Ok(toml_edit::Value::String(toml_edit::Formatted::new(s.clone()))),
        Node::Array(items) => {
            let mut arr = toml_edit::Array::new();
            for v in items {
                arr.push(node_to_value(v)?);
            }
            Ok(toml_edit::Value::Array(arr))
        }
        Node::Object(entries) => {
            let mut inline = toml_edit::InlineTable::new();
            for (k, v) in entries {
                inline.insert(k.as_str(), node_to_value(v)?);
            }
            Ok(toml_edit::Value::InlineTable(inline))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toml(source: &str) -> Result<String, String> {
        let doc = libcif::parse(source).unwrap();
        encode(&Node::from_document(&doc, false))
    }

    #[test]
    fn test_blocks_become_tables() {
        let out = toml("data_x _a 1 _b 'two words'\nloop_ _l 1 2\n").unwrap();
        let parsed: DocumentMut = out.parse().unwrap();
        assert_eq!(parsed["x"]["_a"].as_integer(), Some(1));
        assert_eq!(parsed["x"]["_b"].as_str(), Some("two words"));
        assert_eq!(parsed["x"]["_l"].as_array().map(|a| a.len()), Some(2));
    }

    #[test]
    fn test_save_frame_nested() {
        let out = toml("data_x save_f _a 1 save_\n").unwrap();
        let parsed: DocumentMut = out.parse().unwrap();
        assert_eq!(parsed["x"]["save_f"]["_a"].as_integer(), Some(1));
    }

    #[test]
    fn test_unknown_value_rejected() {
        assert!(toml("data_x _a ?\n").is_err());
    }
}
