//! Converts the JSON-shaped rows [`crate::rows`] produces into the Bolt
//! value types `neo4rs` parameters are built from.

use neo4rs::BoltType;
use serde_json::Value;

use crate::rows::Row;

pub fn value_to_bolt(v: &Value) -> BoltType {
    match v {
        Value::Null => BoltType::Null(neo4rs::BoltNull),
        Value::Bool(b) => BoltType::Boolean(neo4rs::BoltBoolean::new(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                BoltType::Integer(neo4rs::BoltInteger::new(i))
            } else {
                BoltType::Float(neo4rs::BoltFloat::new(n.as_f64().unwrap_or(0.0)))
            }
        }
        Value::String(s) => BoltType::String(neo4rs::BoltString::new(s)),
        Value::Array(items) => {
            let list: Vec<BoltType> = items.iter().map(value_to_bolt).collect();
            BoltType::List(neo4rs::BoltList::from(list))
        }
        Value::Object(obj) => {
            let mut map = neo4rs::BoltMap::new();
            for (k, v) in obj {
                map.put(neo4rs::BoltString::new(k), value_to_bolt(v));
            }
            BoltType::Map(map)
        }
    }
}

pub fn row_to_bolt(row: &Row) -> BoltType {
    let mut map = neo4rs::BoltMap::new();
    for (k, v) in row {
        map.put(neo4rs::BoltString::new(k), value_to_bolt(v));
    }
    BoltType::Map(map)
}

pub fn rows_to_bolt(rows: &[Row]) -> BoltType {
    BoltType::List(neo4rs::BoltList::from(
        rows.iter().map(row_to_bolt).collect::<Vec<_>>(),
    ))
}
