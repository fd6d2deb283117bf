//! Verification pipeline: token → keys → plaintext → payload → view.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use scanproof_common::normalize::{lookup, lookup_non_empty};
use scanproof_common::ttl::{self, TtlSummary};
use scanproof_common::{
    Language, ProxyError, ScanError, ScanItem, VerificationVerdict, VerifyPayload,
};

use crate::codec;
use crate::keys::KeyResolver;
use crate::proxy::{ProxyGateway, proxied_link};

const VERIFY_SCAN_ITEM_PATH: &str = "/org/{org}/VerifyScanItem/{serial}/{pin}";

/// Query or body parameters of a verification request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyParams {
    pub data: Option<String>,
    pub org: Option<String>,
    pub theme: Option<String>,
    pub lang: Option<String>,
}

impl VerifyParams {
    pub fn language(&self) -> Language {
        Language::parse(self.lang.as_deref())
    }

    fn is_empty(&self) -> bool {
        self.data.is_none() && self.org.is_none() && self.theme.is_none()
    }
}

/// Normalized payload plus the HTTP status the JSON API should answer with
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyOutcome {
    pub payload: VerifyPayload,
    pub http_status: u16,
}

impl VerifyOutcome {
    fn ok(payload: VerifyPayload) -> Self {
        Self {
            payload,
            http_status: 200,
        }
    }

    fn failure(status: &str, thai: &str, eng: &str, http_status: u16) -> Self {
        Self {
            payload: VerifyPayload {
                status: Some(status.to_string()),
                description_thai: Some(thai.to_string()),
                description_eng: Some(eng.to_string()),
                ..Default::default()
            },
            http_status,
        }
    }

    fn configuration_error() -> Self {
        Self::failure(
            "ERROR",
            "การกำหนดค่าเซิร์ฟเวอร์ไม่ถูกต้อง",
            "Server configuration error",
            500,
        )
    }

    fn decrypt_failed() -> Self {
        Self::failure(
            "DECRYPT_FAIL",
            "ไม่สามารถถอดรหัสข้อมูลได้",
            "Failed to decrypt data",
            400,
        )
    }

    fn backend_failed(http_status: u16) -> Self {
        Self::failure(
            "FAILED",
            "เกิดข้อผิดพลาดจากเซิร์ฟเวอร์",
            "Backend server error",
            http_status,
        )
    }

    pub fn status_token(&self) -> &str {
        self.payload.status_token()
    }
}

/// Everything a verification page needs to render
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyView {
    #[serde(flatten)]
    pub verdict: VerificationVerdict,
    pub description: String,
    pub scan_item: Option<ScanItem>,
    pub product_url: Option<String>,
    pub get_customer_url: Option<String>,
    pub register_customer_url: Option<String>,
    pub request_otp_via_email_url: Option<String>,
    pub redirect_url: Option<String>,
    pub product_data: Option<Value>,
    pub ttl: TtlSummary,
    pub created_date: Option<String>,
    pub ttl_seconds: Option<i64>,
    pub language: Language,
}

impl VerifyView {
    pub fn build(outcome: &VerifyOutcome, lang: Language, now: DateTime<Utc>) -> Self {
        let payload = &outcome.payload;
        let ttl = ttl::evaluate(payload.generated_at(), payload.ttl_minute, now);

        Self {
            verdict: VerificationVerdict::new(payload.status_token(), lang, &ttl),
            description: payload.description(lang).unwrap_or_default().to_string(),
            scan_item: payload.scan_item.clone(),
            product_url: payload.get_product_url.clone(),
            get_customer_url: payload.get_customer_url.clone(),
            register_customer_url: payload.register_customer_url.clone(),
            request_otp_via_email_url: payload.request_otp_via_email_url.clone(),
            redirect_url: payload.redirect_url.clone(),
            product_data: payload.product_data.clone(),
            ttl: ttl.summary(lang),
            created_date: payload.data_generated_date.clone(),
            ttl_seconds: payload.ttl_minute.map(|m| m * 60),
            language: lang,
        }
    }
}

/// What a decrypted token turned out to contain
#[derive(Debug, PartialEq)]
enum Plaintext {
    Payload(Map<String, Value>),
    Lookup { serial: String, pin: String },
    Unrecognized,
}

fn read_plaintext(text: &str) -> Plaintext {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text.trim()) {
        let has_status = lookup_non_empty(&map, &["status", "Status"]).is_some();
        let has_item = lookup(&map, &["scanItem", "ScanItem"]).is_some_and(Value::is_object);
        if has_status || has_item {
            return Plaintext::Payload(map);
        }

        let serial = lookup_non_empty(&map, &["serial", "Serial"]);
        let pin = lookup_non_empty(&map, &["pin", "Pin"]);
        if let (Some(serial), Some(pin)) = (serial, pin) {
            return Plaintext::Lookup { serial, pin };
        }
    }

    let mut parts = text.split('|').map(str::trim);
    match (parts.next(), parts.next()) {
        (Some(serial), Some(pin)) if !serial.is_empty() && !pin.is_empty() => Plaintext::Lookup {
            serial: serial.to_string(),
            pin: pin.to_string(),
        },
        _ => Plaintext::Unrecognized,
    }
}

/// Turns encrypted tokens into normalized verification payloads
pub struct VerifyService {
    keys: KeyResolver,
    proxy: Arc<ProxyGateway>,
    api_base_url: String,
    public_proxy_path: String,
}

impl VerifyService {
    pub fn new(
        keys: KeyResolver,
        proxy: Arc<ProxyGateway>,
        api_base_url: &str,
        public_proxy_path: &str,
    ) -> Self {
        Self {
            keys,
            proxy,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            public_proxy_path: public_proxy_path.to_string(),
        }
    }

    /// Run the full pipeline. Every failure becomes a status verdict.
    ///
    /// The page flow requires `theme`; the JSON API does not.
    pub async fn verify(&self, params: &VerifyParams, require_theme: bool) -> VerifyOutcome {
        let (data, org) = match precheck(params, require_theme) {
            Ok(checked) => checked,
            Err(outcome) => return outcome,
        };

        let keys = match self.keys.resolve(org).await {
            Ok(keys) => keys,
            Err(e) => {
                error!(org = %org, error = %e, "Encryption keys unavailable");
                return VerifyOutcome::configuration_error();
            }
        };

        let plaintext = match codec::decrypt_token(data, &keys) {
            Ok(text) => text,
            Err(ScanError::Configuration(reason)) => {
                error!(org = %org, reason = %reason, "Encryption keys rejected");
                return VerifyOutcome::configuration_error();
            }
            Err(e) => {
                warn!(org = %org, token_len = data.len(), error = %e, "Token decryption failed");
                return VerifyOutcome::decrypt_failed();
            }
        };

        let raw = match read_plaintext(&plaintext) {
            Plaintext::Payload(map) => map,
            Plaintext::Lookup { serial, pin } => match self.lookup(org, &serial, &pin).await {
                Ok(map) => map,
                Err(outcome) => return outcome,
            },
            Plaintext::Unrecognized => {
                warn!(org = %org, "Decrypted token has an unrecognized format");
                return VerifyOutcome::failure(
                    "PARAM_MISSING",
                    "ข้อมูลไม่ครบถ้วน: รูปแบบข้อมูลไม่ถูกต้อง",
                    "Invalid data format: expected JSON or serial|pin",
                    400,
                );
            }
        };

        let mut payload = VerifyPayload::from_raw(&raw);
        self.hide_backend_urls(&mut payload);

        info!(org = %org, status = %payload.status_token(), "Verification completed");
        VerifyOutcome::ok(payload)
    }

    async fn lookup(
        &self,
        org: &str,
        serial: &str,
        pin: &str,
    ) -> Result<Map<String, Value>, VerifyOutcome> {
        let template = format!("{}{VERIFY_SCAN_ITEM_PATH}", self.api_base_url);
        let substitutions = BTreeMap::from([
            ("org".to_string(), org.to_string()),
            ("serial".to_string(), serial.to_string()),
            ("pin".to_string(), pin.to_string()),
        ]);

        match self
            .proxy
            .forward_template(&template, Method::GET, &substitutions, None)
            .await
        {
            Ok(response) => match response.body {
                Value::Object(map) => Ok(map),
                _ => {
                    warn!(org = %org, "Scan item lookup returned a non-object body");
                    Err(VerifyOutcome::backend_failed(502))
                }
            },
            Err(ProxyError::UpstreamError { status, .. }) => {
                warn!(org = %org, upstream_status = status, "Scan item lookup rejected");
                Err(VerifyOutcome::backend_failed(status))
            }
            Err(e) => {
                warn!(org = %org, error = %e, "Scan item lookup failed");
                Err(VerifyOutcome::backend_failed(e.status_code()))
            }
        }
    }

    fn hide_backend_urls(&self, payload: &mut VerifyPayload) {
        let path = &self.public_proxy_path;
        for url in [
            &mut payload.get_product_url,
            &mut payload.get_customer_url,
            &mut payload.register_customer_url,
            &mut payload.request_otp_via_email_url,
        ] {
            let link = url
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .map(|target| proxied_link(path, target));
            if link.is_some() {
                *url = link;
            }
        }
    }
}

/// Parameter checks that answer without touching the token
fn precheck(params: &VerifyParams, require_theme: bool) -> Result<(&str, &str), VerifyOutcome> {
    if params.is_empty() {
        return Err(VerifyOutcome::failure(
            "PARAMETER_MISSING",
            "ไม่พบพารามิเตอร์สำหรับการตรวจสอบ",
            "Query parameters are missing",
            400,
        ));
    }

    let Some(data) = params.data.as_deref() else {
        return Err(VerifyOutcome::failure(
            "PARAM_MISSING",
            "ไม่พบพารามิเตอร์ data",
            "Data parameter is missing",
            400,
        ));
    };

    if data.trim().is_empty() {
        return Err(VerifyOutcome::failure(
            "NO_DATA",
            "พารามิเตอร์ data ว่างเปล่า",
            "Data parameter is empty",
            400,
        ));
    }

    if require_theme && params.theme.as_deref().is_none_or(|t| t.trim().is_empty()) {
        return Err(VerifyOutcome::failure(
            "MISSING_THEME",
            "ไม่พบพารามิเตอร์ theme",
            "Theme parameter is missing",
            400,
        ));
    }

    match params.org.as_deref().map(str::trim) {
        Some(org) if !org.is_empty() => Ok((data, org)),
        _ => Err(VerifyOutcome::failure(
            "MISSING_ORG",
            "ไม่พบพารามิเตอร์ org",
            "Organization parameter is missing",
            400,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NullCache;
    use crate::codec::{EncryptionKeys, encrypt};
    use crate::proxy::{MockUpstreamTransport, OutboundRequest};
    use crate::testing::{raw, replying, silent};
    use chrono::TimeZone;
    use scanproof_common::{RuntimeEnv, StatusBucket};
    use serde_json::json;
    use std::time::Duration;

    const KEY: &str = "0123456789abcdef0123456789abcdef";
    const IV: &str = "fedcba9876543210";

    fn service(transport: MockUpstreamTransport, keys: Option<EncryptionKeys>) -> VerifyService {
        let proxy = ProxyGateway::new(Arc::new(transport), ["api.allowed.example"], Duration::from_secs(5));
        let resolver = KeyResolver::new(Arc::new(NullCache), RuntimeEnv::Development, keys);
        VerifyService::new(resolver, Arc::new(proxy), "https://api.allowed.example/", "/api/proxy")
    }

    fn keys() -> Option<EncryptionKeys> {
        Some(EncryptionKeys::new(KEY, IV))
    }

    fn token(plaintext: &str) -> String {
        encrypt(plaintext, KEY.as_bytes(), IV.as_bytes()).unwrap()
    }

    fn params(data: Option<&str>, org: Option<&str>, theme: Option<&str>) -> VerifyParams {
        VerifyParams {
            data: data.map(String::from),
            org: org.map(String::from),
            theme: theme.map(String::from),
            lang: None,
        }
    }

    #[tokio::test]
    async fn test_precheck_order() {
        let svc = service(silent(), keys());

        let cases = [
            (params(None, None, None), "PARAMETER_MISSING"),
            (params(None, Some("acme"), Some("default")), "PARAM_MISSING"),
            (params(Some("  "), Some("acme"), Some("default")), "NO_DATA"),
            (params(Some("abc"), Some("acme"), None), "MISSING_THEME"),
            (params(Some("abc"), None, Some("default")), "MISSING_ORG"),
            (params(Some("abc"), Some(" "), Some("default")), "MISSING_ORG"),
        ];

        for (p, expected) in cases {
            let outcome = svc.verify(&p, true).await;
            assert_eq!(outcome.status_token(), expected);
            assert_eq!(outcome.http_status, 400);
        }
    }

    #[tokio::test]
    async fn test_theme_optional_for_api() {
        let svc = service(silent(), keys());
        let data = token(r#"{"Status":"VALID"}"#);
        let outcome = svc.verify(&params(Some(&data), Some("acme"), None), false).await;
        assert_eq!(outcome.status_token(), "VALID");
    }

    #[tokio::test]
    async fn test_embedded_payload_is_normalized_and_proxied() {
        let svc = service(silent(), keys());
        let data = token(
            &json!({
                "Status": "VALID",
                "ScanItem": { "Serial": "S1", "Pin": "1234" },
                "GetProductUrl": "https://api.allowed.example/product/1",
                "RedirectUrl": "https://brand.example"
            })
            .to_string(),
        );

        let outcome = svc
            .verify(&params(Some(&data), Some("acme"), Some("default")), true)
            .await;

        assert_eq!(outcome.http_status, 200);
        assert_eq!(outcome.status_token(), "VALID");
        let product = outcome.payload.get_product_url.as_deref().unwrap();
        assert!(product.starts_with("/api/proxy?url="));
        assert!(!product.contains("allowed.example"));
        assert_eq!(outcome.payload.redirect_url.as_deref(), Some("https://brand.example"));
    }

    #[tokio::test]
    async fn test_pipe_token_calls_backend() {
        let mut transport = MockUpstreamTransport::new();
        transport
            .expect_send()
            .withf(|req: &OutboundRequest| {
                req.url.as_str() == "https://api.allowed.example/org/acme/VerifyScanItem/S%201/9999"
            })
            .times(1)
            .returning(|_| {
                Ok(raw(
                    200,
                    r#"{"status":"ALREADY_REGISTERED","scanItem":{"serial":"S 1"}}"#,
                ))
            });
        let svc = service(transport, keys());
        let data = token("S 1|9999");

        let outcome = svc
            .verify(&params(Some(&data), Some("acme"), Some("default")), true)
            .await;

        assert_eq!(outcome.status_token(), "ALREADY_REGISTERED");
    }

    #[tokio::test]
    async fn test_json_serial_pin_calls_backend() {
        let svc = service(replying(&[(200, r#"{"Status":"VALID"}"#)]), keys());
        let data = token(r#"{"Serial":"S1","pin":"1234"}"#);

        let outcome = svc
            .verify(&params(Some(&data), Some("acme"), Some("default")), true)
            .await;

        assert_eq!(outcome.status_token(), "VALID");
    }

    #[tokio::test]
    async fn test_backend_rejection_is_failed() {
        let svc = service(replying(&[(500, "boom")]), keys());
        let data = token("S1|1234");

        let outcome = svc
            .verify(&params(Some(&data), Some("acme"), Some("default")), true)
            .await;

        assert_eq!(outcome.status_token(), "FAILED");
        assert_eq!(outcome.http_status, 500);
    }

    #[tokio::test]
    async fn test_decrypt_and_config_failures() {
        let svc = service(silent(), keys());
        let outcome = svc
            .verify(&params(Some("bm90LWEtdG9rZW4="), Some("acme"), Some("default")), true)
            .await;
        assert_eq!(outcome.status_token(), "DECRYPT_FAIL");

        let svc = service(silent(), None);
        let outcome = svc
            .verify(&params(Some("anything"), Some("acme"), Some("default")), true)
            .await;
        assert_eq!(outcome.status_token(), "ERROR");
        assert_eq!(outcome.http_status, 500);
        assert_eq!(
            outcome.payload.description_eng.as_deref(),
            Some("Server configuration error")
        );
    }

    #[tokio::test]
    async fn test_unrecognized_plaintext() {
        let svc = service(silent(), keys());
        let data = token(r#"{"hello":"world"}"#);
        let outcome = svc
            .verify(&params(Some(&data), Some("acme"), Some("default")), true)
            .await;
        assert_eq!(outcome.status_token(), "PARAM_MISSING");
    }

    #[test]
    fn test_read_plaintext_forms() {
        assert_eq!(
            read_plaintext("A|B|extra"),
            Plaintext::Lookup {
                serial: "A".to_string(),
                pin: "B".to_string()
            }
        );
        assert_eq!(read_plaintext("only-one"), Plaintext::Unrecognized);
        assert_eq!(read_plaintext("|"), Plaintext::Unrecognized);
        assert!(matches!(
            read_plaintext(r#"{"scanItem":{"serial":"x"}}"#),
            Plaintext::Payload(_)
        ));
    }

    #[test]
    fn test_view_carries_verdict_and_ttl() {
        let raw = json!({
            "status": "valid",
            "descriptionThai": "ของแท้",
            "descriptionEng": "Genuine",
            "dataGeneratedDate": "2024-05-01T10:00:00",
            "ttlMinute": 60
        });
        let outcome = VerifyOutcome::ok(VerifyPayload::from_raw(raw.as_object().unwrap()));
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();

        let view = VerifyView::build(&outcome, Language::En, now);
        assert_eq!(view.verdict.status, "VALID");
        assert_eq!(view.verdict.bucket, StatusBucket::Success);
        assert_eq!(view.verdict.ttl_seconds_remaining, Some(1800));
        assert_eq!(view.description, "Genuine");
        assert_eq!(view.ttl.state, "valid");
        assert_eq!(view.ttl_seconds, Some(3600));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "VALID");
        assert_eq!(json["bucket"], "SUCCESS");
        assert_eq!(json["ttl"]["display"], "30 min 0 sec");
        assert_eq!(json["language"], "en");
    }
}
