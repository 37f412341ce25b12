/// loopback service status structs
///
use serde::{Deserialize, Serialize};

pub type JsonString = String;

pub const OK: &str = "ok";
pub const DOWN: &str = "down";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    #[default]
    Idle,
    Busy,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub server_id: String,
    pub status: String,
    pub state: ServerState,
    pub uptime: String,
    pub entries: usize,
    pub clients: usize,
    pub error_count: u16,
}

impl ServerStatus {
    /// the status as json, or a json error message if encoding fails
    pub fn to_json(&self) -> JsonString {
        match serde_json::to_string(self) {
            Ok(js) => js,
            Err(e) => {
                format!(r#"{}"status":"json parse error: {:?}"{}"#, "{", e, "}\n")
            }
        }
    }

    pub fn from_json(js: &str) -> Option<ServerStatus> {
        serde_json::from_str(js).ok()
    }
}
