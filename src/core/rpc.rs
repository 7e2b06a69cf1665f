//! RPC entry point
//!
//! Runs a transfer against an RPC gateway with caller-supplied files. The
//! files not consumed by a receive path and the outputs produced for send
//! paths come back in the response, keyed by path locator.

use crate::adapters::connection::{Connection, RpcConnection, RpcFile};
use crate::config::schema::ConnectionKind;
use crate::core::engine::Edi;
use crate::domain::{DocumentId, DocumentState, EdiError, IssueId, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Inbound files by path locator
    #[serde(default)]
    pub paths: HashMap<String, Vec<RpcFile>>,

    /// Overrides the gateway's `automatic` flag; `false` only receives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_process: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcDocument {
    pub id: DocumentId,
    pub name: String,
    pub state: DocumentState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcIssue {
    pub id: IssueId,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Unconsumed inputs and produced outputs by path locator
    pub paths: HashMap<String, Vec<RpcFile>>,

    pub docs: Vec<RpcDocument>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RpcIssue>,
}

impl Edi {
    /// Transfers caller-supplied files through an RPC gateway
    ///
    /// Without a gateway name the configured `server.default_gateway` is used.
    ///
    /// # Errors
    ///
    /// Fails when no gateway can be determined or the gateway is not an RPC
    /// gateway; transfer failures are reported in `errors`
    pub async fn rpc_transfer(&self, gateway: Option<&str>, request: RpcRequest) -> Result<RpcResponse> {
        let name = gateway
            .or(self.config().server.default_gateway.as_deref())
            .ok_or_else(|| EdiError::user("No gateway given and no default gateway configured"))?
            .to_string();
        let gateway = self.gateway(&name)?;
        if gateway.connection != ConnectionKind::Rpc {
            return Err(EdiError::user(format!(
                "Gateway '{name}' does not accept RPC transfers"
            )));
        }

        let mut connection = RpcConnection::new(request.paths);
        let report = self
            .do_transfer(&name, Some(&mut connection as &mut dyn Connection), request.allow_process)
            .await?;

        Ok(RpcResponse {
            paths: connection.into_files(),
            docs: report
                .documents
                .iter()
                .map(|d| RpcDocument {
                    id: d.id,
                    name: d.name.clone(),
                    state: d.state,
                })
                .collect(),
            errors: report
                .issues
                .iter()
                .map(|i| RpcIssue {
                    id: i.id,
                    name: i.title.clone(),
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let request: RpcRequest = serde_json::from_value(json!({
            "paths": {"files": [{"name": "a.txt", "data": "YQ=="}]}
        }))
        .unwrap();
        assert_eq!(request.paths["files"][0].decode().unwrap(), b"a");
        assert_eq!(request.allow_process, None);
    }

    #[test]
    fn test_errors_omitted_when_empty() {
        let response = RpcResponse::default();
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("errors").is_none());
        assert_eq!(value["docs"], json!([]));
    }
}
