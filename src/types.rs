use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// JIP status code as reported in the `Status` field of every response
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Status(pub u8);

impl Status {
    pub const OK: Status = Status(0);
    /// Reported when a variable read did not return any node
    pub const NO_DATA: Status = Status(0xFF);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Body of a JIP request: `action=<name>&key=value&...`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActionRequest {
    action: String,
    params: Vec<(String, String)>,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: Vec::new(),
        }
    }

    /// Append a parameter; parameters keep their insertion order on the wire
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Encode as `application/x-www-form-urlencoded`
    pub fn encode(&self) -> Result<String> {
        let pairs: Vec<(&str, &str)> = std::iter::once(("action", self.action.as_str()))
            .chain(self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .collect();

        serde_urlencoded::to_string(pairs)
            .with_context(|| format!("failed to encode {} request", self.action))
    }
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action={}", self.action)?;
        for (key, value) in &self.params {
            write!(f, "&{key}={value}")?;
        }
        Ok(())
    }
}

/// Response of `getVersion`; fields not known here are passed through
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VersionInfo {
    #[serde(rename = "Status")]
    pub status: Status,
    #[serde(rename = "Version", default)]
    pub version: Option<String>,
    #[serde(rename = "LibJIPVersion", default)]
    pub lib_version: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

pub type BorderRouter = Value;

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct DiscoverBorderRoutersResponse {
    #[serde(rename = "Status")]
    pub status: Status,
    #[serde(rename = "BRList", default)]
    pub border_routers: Vec<BorderRouter>,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct NetworkResponse {
    #[serde(rename = "Status")]
    pub status: Status,
    #[serde(rename = "Network", default)]
    pub network: Value,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct StatusResponse {
    #[serde(rename = "Status")]
    pub status: Status,
}

/// Result of reading a single MIB variable from a node
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct VariableReading {
    pub status: Status,
    pub value: Option<String>,
}

impl VariableReading {
    pub const PLACEHOLDER_VALUE: &str = "?";

    /// Reading reported when the response did not contain any node
    pub fn no_data() -> Self {
        Self {
            status: Status::NO_DATA,
            value: Some(Self::PLACEHOLDER_VALUE.to_string()),
        }
    }

    /// Extract the variable value from a GetVar network snapshot
    ///
    /// Only the first variable of the first MIB of the first node is looked at.
    /// An empty or missing node list is not an error but yields [`VariableReading::no_data`].
    pub fn from_network(status: Status, network: &Value) -> Self {
        let has_nodes = network
            .get("Nodes")
            .and_then(Value::as_array)
            .is_some_and(|nodes| !nodes.is_empty());

        if !has_nodes {
            return Self::no_data();
        }

        let value = match network.pointer("/Nodes/0/MiBs/0/Vars/0/Value") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };

        Self { status, value }
    }
}

/// Application state shared by all actions of a client
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NetworkState {
    /// Border routers returned by the last successful discovery
    pub border_routers: Vec<BorderRouter>,
    /// Border router GetVar/SetVar requests are routed through
    pub active_border_router: Option<String>,
    /// Network contents returned by the last successful discover
    pub network: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod action_request {
        use super::*;

        #[test]
        fn encodes_action_first_then_params_in_order() {
            let request = ActionRequest::new("GetVar")
                .param("BRaddress", "fd04::1")
                .param("mib", 0xfffffe01u32)
                .param("refresh", "no");

            assert_eq!(
                request.encode().unwrap(),
                "action=GetVar&BRaddress=fd04%3A%3A1&mib=4294966785&refresh=no"
            );
        }

        #[test]
        fn encodes_spaces_and_ampersands_in_values() {
            let request = ActionRequest::new("SetVar").param("value", "a b&c");

            assert_eq!(request.encode().unwrap(), "action=SetVar&value=a+b%26c");
        }

        #[test]
        fn display_shows_unencoded_action_string() {
            let request = ActionRequest::new("discover").param("BRaddress", "fd04::1");

            assert_eq!(request.to_string(), "action=discover&BRaddress=fd04::1");
        }
    }

    mod variable_reading {
        use super::*;

        #[test]
        fn empty_node_list_reports_sentinel() {
            let reading = VariableReading::from_network(Status::OK, &json!({ "Nodes": [] }));

            assert_eq!(reading.status, Status(255));
            assert_eq!(reading.value.as_deref(), Some("?"));
        }

        #[test]
        fn missing_node_list_reports_sentinel() {
            let reading = VariableReading::from_network(Status::OK, &Value::Null);

            assert_eq!(reading, VariableReading::no_data());
        }

        #[test]
        fn string_value_is_taken_verbatim() {
            let network = json!({
                "Nodes": [{ "MiBs": [{ "Vars": [{ "Value": "Lamp" }] }] }]
            });

            let reading = VariableReading::from_network(Status(3), &network);

            assert_eq!(reading.status, Status(3));
            assert_eq!(reading.value.as_deref(), Some("Lamp"));
        }

        #[test]
        fn numeric_value_is_rendered_as_string() {
            let network = json!({
                "Nodes": [{ "MiBs": [{ "Vars": [{ "Value": 0 }] }] }]
            });

            let reading = VariableReading::from_network(Status::OK, &network);

            assert_eq!(reading.value.as_deref(), Some("0"));
        }

        #[test]
        fn falsy_values_are_kept() {
            for (value, expected) in [(json!(false), "false"), (json!(""), "")] {
                let network = json!({
                    "Nodes": [{ "MiBs": [{ "Vars": [{ "Value": value }] }] }]
                });

                let reading = VariableReading::from_network(Status::OK, &network);

                assert_eq!(reading.value.as_deref(), Some(expected));
            }
        }

        #[test]
        fn missing_value_yields_none() {
            let network = json!({ "Nodes": [{ "MiBs": [] }] });

            let reading = VariableReading::from_network(Status::OK, &network);

            assert_eq!(reading.status, Status::OK);
            assert_eq!(reading.value, None);
        }
    }

    #[test]
    fn version_info_keeps_unknown_fields() {
        let info: VersionInfo = serde_json::from_value(json!({
            "Status": 0,
            "Version": "1.3",
            "LibJIPVersion": "1.1",
            "Build": "r43426"
        }))
        .unwrap();

        assert!(info.status.is_ok());
        assert_eq!(info.version.as_deref(), Some("1.3"));
        assert_eq!(info.lib_version.as_deref(), Some("1.1"));
        assert_eq!(info.other.get("Build"), Some(&json!("r43426")));
    }
}
