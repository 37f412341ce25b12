/// the payload written by the exercise runs
///
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub description: String,
}

impl Product {
    pub fn new(id: i64, name: &str, price: f64, description: &str) -> Product {
        Product {
            id,
            name: name.to_string(),
            price,
            description: description.to_string(),
        }
    }

    /// the json string stored in the cache
    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(js) => js,
            Err(e) => format!(r#"{{"error":"json encode error: {:?}"}}"#, e),
        }
    }

    pub fn from_json(text: &str) -> Option<Product> {
        serde_json::from_str(text).ok()
    }
}

/// the numeric suffix after the last ':' of a key, or 0
pub fn extract_id_from_key(key: &str) -> i64 {
    match key.rsplit_once(':') {
        Some((_, tail)) => tail.parse().unwrap_or(0),
        None => 0,
    }
}
