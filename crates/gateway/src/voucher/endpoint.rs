//! Action-dispatched voucher endpoint backed by the proxy gateway.

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use scanproof_common::constants::MAX_DEBUG_BODY_BYTES;
use scanproof_common::normalize::{lookup, lookup_non_empty, value_as_string};
use scanproof_common::{ProxyError, VoucherRecord};

use crate::proxy::ProxyGateway;

const VOUCHER_ACTION_PATH: &str = "/api/Voucher/org/{org}/action";

/// Voucher API request body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar")]
    pub org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar")]
    pub voucher_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar")]
    pub pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar")]
    pub barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar")]
    pub voucher_id: Option<String>,
}

/// Accept strings or numbers; blank strings count as absent
fn scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(value_as_string)
        .filter(|s| !s.trim().is_empty()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoucherAction {
    VerifyPin,
    VerifyBarcode,
    Approve,
}

impl VoucherAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "VERIFY_PIN" => Some(Self::VerifyPin),
            "VERIFY_BARCODE" => Some(Self::VerifyBarcode),
            "APPROVE" => Some(Self::Approve),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VerifyPin => "VERIFY_PIN",
            Self::VerifyBarcode => "VERIFY_BARCODE",
            Self::Approve => "APPROVE",
        }
    }

    /// Backend path under the voucher action root
    fn path(&self) -> &'static str {
        match self {
            Self::VerifyPin => "/VerifyVoucherByPin/{voucherNo}/{pin}",
            Self::VerifyBarcode => "/VerifyVoucherByBarcode/{barcode}",
            Self::Approve => "/ApproveVoucherUsedById/{voucherId}/{pin}",
        }
    }
}

/// Status code and JSON body for the caller
#[derive(Debug, Clone, PartialEq)]
pub struct VoucherReply {
    pub status: u16,
    pub body: Value,
}

impl VoucherReply {
    fn error(status: u16, description: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "Status": "ERROR", "Description": description.into() }),
        }
    }

    /// Status token of the reply body
    pub fn status_token(&self) -> &str {
        self.body
            .get("Status")
            .and_then(Value::as_str)
            .unwrap_or("ERROR")
    }
}

pub struct VoucherService {
    proxy: Arc<ProxyGateway>,
    api_base_url: String,
}

impl VoucherService {
    pub fn new(proxy: Arc<ProxyGateway>, api_base_url: &str) -> Self {
        Self {
            proxy,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn handle(&self, request: &VoucherRequest) -> VoucherReply {
        let (Some(org), Some(action)) = (request.org.as_deref(), request.action.as_deref()) else {
            return VoucherReply::error(400, "Invalid request: 'org' and 'action' are required");
        };

        let Some(action) = VoucherAction::parse(action) else {
            return VoucherReply::error(400, "Invalid Action");
        };

        let substitutions = match substitutions_for(action, org, request) {
            Ok(subs) => subs,
            Err(missing) => {
                return VoucherReply::error(400, format!("Missing parameters: {missing}"));
            }
        };

        let template = format!("{}{VOUCHER_ACTION_PATH}{}", self.api_base_url, action.path());

        match self
            .proxy
            .forward_template(&template, Method::POST, &substitutions, None)
            .await
        {
            Ok(response) => {
                let body = match response.body {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                let normalized = normalize_response(&body);
                let status = normalized
                    .get("Status")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                info!(
                    org = %org,
                    action = action.as_str(),
                    status = %status,
                    "Voucher action completed"
                );
                VoucherReply {
                    status: 200,
                    body: Value::Object(normalized),
                }
            }
            Err(ProxyError::UpstreamError { status, body }) => {
                warn!(org = %org, action = action.as_str(), upstream_status = status, "Voucher backend error");
                VoucherReply {
                    status,
                    body: json!({
                        "Status": "ERROR",
                        "Description": format!("Backend Error: {status}"),
                        "DebugBody": truncate(&body, MAX_DEBUG_BODY_BYTES),
                    }),
                }
            }
            Err(ProxyError::UpstreamMalformedResponse(reason)) => {
                warn!(org = %org, action = action.as_str(), reason = %reason, "Voucher backend sent invalid JSON");
                VoucherReply::error(502, "Invalid JSON from Backend")
            }
            Err(e) => {
                warn!(org = %org, action = action.as_str(), error = %e, "Voucher call failed");
                VoucherReply::error(e.status_code(), e.public_message())
            }
        }
    }
}

fn substitutions_for(
    action: VoucherAction,
    org: &str,
    request: &VoucherRequest,
) -> Result<BTreeMap<String, String>, &'static str> {
    let mut subs = BTreeMap::from([("org".to_string(), org.to_string())]);

    let required = match action {
        VoucherAction::VerifyPin => vec![("voucherNo", &request.voucher_no), ("pin", &request.pin)],
        VoucherAction::VerifyBarcode => vec![("barcode", &request.barcode)],
        VoucherAction::Approve => vec![("voucherId", &request.voucher_id), ("pin", &request.pin)],
    };

    for (name, value) in required {
        match value {
            Some(value) => {
                subs.insert(name.to_string(), value.clone());
            }
            None => {
                return Err(match action {
                    VoucherAction::VerifyPin => "voucherNo, pin",
                    VoucherAction::VerifyBarcode => "barcode",
                    VoucherAction::Approve => "voucherId, pin",
                });
            }
        }
    }

    Ok(subs)
}

/// Normalize a backend voucher response
///
/// Well-known fields are lifted to PascalCase; everything else passes
/// through untouched.
pub fn normalize_response(body: &Map<String, Value>) -> Map<String, Value> {
    let record = VoucherRecord::new(body.clone());
    let mut out = record.canonical();

    let status = match lookup_non_empty(body, &["Status", "status"]) {
        Some(status) => status,
        None => {
            let succeeded = lookup(body, &["IsSuccess"]).and_then(Value::as_bool) == Some(true);
            if succeeded || record.id().is_some() {
                "OK".to_string()
            } else {
                "ERROR".to_string()
            }
        }
    };
    let status = if ["success", "active"]
        .iter()
        .any(|s| status.trim().eq_ignore_ascii_case(s))
    {
        "OK".to_string()
    } else {
        status
    };

    out.retain(|k, _| !k.eq_ignore_ascii_case("status"));
    out.insert("Status".to_string(), Value::String(status));
    out.insert(
        "Description".to_string(),
        Value::String(record.description().unwrap_or_default()),
    );
    out.remove("description");

    out
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
