//! Core types shared across Scanproof components.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::normalize::{
    self, SCAN_ITEM_FIELDS, VERIFY_PAYLOAD_FIELDS, VOUCHER_FIELDS, VOUCHER_ID_CANDIDATES,
};
use crate::status::{self, Language, StatusBucket};
use crate::ttl::{self, TtlVerdict};

/// Deployment environment, used to pick the cache namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnv {
    Production,
    Test,
    #[default]
    Development,
}

impl RuntimeEnv {
    /// Parse the free-form `RUNTIME_ENV` value; unknown values are development
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "test" | "testing" | "staging" => Self::Test,
            _ => Self::Development,
        }
    }

    /// Segment used in cache keys
    pub fn cache_segment(&self) -> &'static str {
        match self {
            Self::Production => "Production",
            Self::Test => "Test",
            Self::Development => "Development",
        }
    }
}

/// Canonical scan-item record. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_code: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_no: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_path: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_group: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_flag: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_flag: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_date: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_email: Option<Value>,
}

impl ScanItem {
    /// Build from a raw record with any key casing
    pub fn from_raw(raw: &Map<String, Value>) -> Self {
        let normalized = normalize::normalize(raw, SCAN_ITEM_FIELDS);
        serde_json::from_value(Value::Object(normalized)).unwrap_or_default()
    }

    pub fn created_date_str(&self) -> Option<&str> {
        self.created_date.as_ref().and_then(Value::as_str)
    }
}

/// Normalized decrypted verification payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_thai: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_eng: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_item: Option<ScanItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get_product_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get_customer_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_customer_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_otp_via_email_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_verify: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_generated_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_minute: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_data: Option<Value>,
}

impl VerifyPayload {
    /// Normalize a decrypted payload object
    pub fn from_raw(raw: &Map<String, Value>) -> Self {
        let fields = normalize::normalize(raw, VERIFY_PAYLOAD_FIELDS);
        let text = |name: &str| fields.get(name).and_then(normalize::value_as_string);

        Self {
            status: text("status"),
            description_thai: text("descriptionThai"),
            description_eng: text("descriptionEng"),
            scan_item: fields
                .get("scanItem")
                .and_then(Value::as_object)
                .map(ScanItem::from_raw),
            redirect_url: text("redirectUrl"),
            get_product_url: text("getProductUrl"),
            get_customer_url: text("getCustomerUrl"),
            register_customer_url: text("registerCustomerUrl"),
            request_otp_via_email_url: text("requestOtpViaEmailUrl"),
            theme_verify: fields.get("themeVerify").cloned(),
            data_generated_date: text("dataGeneratedDate"),
            ttl_minute: fields.get("ttlMinute").and_then(ttl::ttl_minutes_from),
            product_data: fields.get("productData").cloned(),
        }
    }

    /// Status token, or `UNKNOWN` when the payload carries none
    pub fn status_token(&self) -> &str {
        self.status.as_deref().unwrap_or("UNKNOWN")
    }

    /// Description in the requested language, falling back to the other one
    pub fn description(&self, lang: Language) -> Option<&str> {
        let (primary, secondary) = match lang {
            Language::Th => (&self.description_thai, &self.description_eng),
            Language::En => (&self.description_eng, &self.description_thai),
        };
        primary
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(secondary.as_deref().filter(|s| !s.trim().is_empty()))
    }

    /// Generation timestamp, from the payload or its scan item
    pub fn generated_at(&self) -> Option<&str> {
        self.data_generated_date.as_deref().or_else(|| {
            self.scan_item
                .as_ref()
                .and_then(ScanItem::created_date_str)
        })
    }
}

/// Display verdict derived from a status token and a TTL check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationVerdict {
    pub status: String,
    pub bucket: StatusBucket,
    pub title: String,
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_remaining: Option<i64>,
}

impl VerificationVerdict {
    pub fn new(token: &str, lang: Language, ttl: &TtlVerdict) -> Self {
        let classification = status::classify(token);
        let text = status::describe(&classification.normalized_key, lang);

        Self {
            status: classification.normalized_key,
            bucket: classification.bucket,
            title: text.title.to_string(),
            messages: text.messages.iter().map(|m| m.to_string()).collect(),
            ttl_seconds_remaining: ttl.remaining_seconds(),
        }
    }

    /// Verdict for a pre-check failure, which never has a TTL
    pub fn without_ttl(token: &str, lang: Language) -> Self {
        Self::new(token, lang, &TtlVerdict::Indeterminate)
    }
}

/// Voucher record as returned by the voucher API, casing left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoucherRecord(pub Map<String, Value>);

impl VoucherRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self(fields),
            _ => Self::default(),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    fn text(&self, candidates: &[&str]) -> Option<String> {
        normalize::lookup_non_empty(&self.0, candidates)
    }

    pub fn status(&self) -> Option<String> {
        self.text(&["Status", "status"])
    }

    pub fn description(&self) -> Option<String> {
        self.text(&["Description", "description", "ErrorMessage"])
    }

    pub fn id(&self) -> Option<String> {
        self.text(VOUCHER_ID_CANDIDATES)
    }

    pub fn voucher_no(&self) -> Option<String> {
        self.text(&["VoucherNo", "voucherNo"])
    }

    pub fn pin(&self) -> Option<String> {
        self.text(&["Pin", "pin"])
    }

    pub fn barcode(&self) -> Option<String> {
        self.text(&["Barcode", "barcode"])
    }

    /// Status matches one of `tokens`, ignoring case
    pub fn status_is(&self, tokens: &[&str]) -> bool {
        self.status()
            .is_some_and(|s| tokens.iter().any(|t| s.trim().eq_ignore_ascii_case(t)))
    }

    /// Overwrite the status under whichever key already carries it
    pub fn set_status(&mut self, value: &str) {
        let key = ["Status", "status"]
            .into_iter()
            .find(|k| self.0.contains_key(*k))
            .unwrap_or("Status");
        self.0.insert(key.to_string(), Value::String(value.to_string()));
    }

    /// Merge `other` over this record; its values win on conflict
    ///
    /// Fields are compared canonically so `voucherNo` replaces `VoucherNo`.
    pub fn merge(&mut self, other: &VoucherRecord) {
        for (key, value) in &other.0 {
            if value.is_null() {
                continue;
            }
            let stale: Vec<String> = self
                .0
                .keys()
                .filter(|k| k.eq_ignore_ascii_case(key) && *k != key)
                .cloned()
                .collect();
            for k in stale {
                self.0.remove(&k);
            }
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Copy of the record with the well-known fields lifted to PascalCase
    pub fn canonical(&self) -> Map<String, Value> {
        let mut out = self.0.clone();
        for (key, value) in normalize::normalize(&self.0, VOUCHER_FIELDS) {
            out.retain(|k, _| !(k.eq_ignore_ascii_case(&key) && *k != key));
            out.insert(key, value);
        }
        out
    }
}
