//! Field normalization for upstream records with inconsistent key casing.
//!
//! Each canonical field names an ordered list of candidate keys. Lookup runs
//! two passes over the candidates:
//! 1. exact key match, in candidate order
//! 2. ASCII case-insensitive match, in candidate order
//!
//! The first candidate holding a non-null value wins. A field with no
//! matching candidate is left out of the output, never defaulted.

use serde_json::{Map, Value};

/// One canonical field and the key spellings that may carry it
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub canonical: &'static str,
    pub candidates: &'static [&'static str],
}

impl FieldSpec {
    pub const fn new(canonical: &'static str, candidates: &'static [&'static str]) -> Self {
        Self {
            canonical,
            candidates,
        }
    }
}

/// Nested scan-item record
pub const SCAN_ITEM_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", &["id", "Id"]),
    FieldSpec::new("orgId", &["orgId", "OrgId"]),
    FieldSpec::new("serial", &["serial", "Serial"]),
    FieldSpec::new("pin", &["pin", "Pin"]),
    FieldSpec::new("tags", &["tags", "Tags"]),
    FieldSpec::new("productCode", &["productCode", "ProductCode"]),
    FieldSpec::new("sequenceNo", &["sequenceNo", "SequenceNo"]),
    FieldSpec::new("url", &["url", "Url"]),
    FieldSpec::new("runId", &["runId", "RunId"]),
    FieldSpec::new("uploadedPath", &["uploadedPath", "UploadedPath"]),
    FieldSpec::new("itemGroup", &["itemGroup", "ItemGroup"]),
    FieldSpec::new("registeredFlag", &["registeredFlag", "RegisteredFlag"]),
    FieldSpec::new("usedFlag", &["usedFlag", "UsedFlag"]),
    FieldSpec::new("createdDate", &["createdDate", "CreatedDate"]),
    FieldSpec::new("registeredDate", &["registeredDate", "RegisteredDate"]),
    FieldSpec::new("registeredEmail", &["registeredEmail", "RegisteredEmail"]),
];

/// Top-level decrypted verification payload
pub const VERIFY_PAYLOAD_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("status", &["status", "Status"]),
    FieldSpec::new("descriptionThai", &["descriptionThai", "DescriptionThai"]),
    FieldSpec::new("descriptionEng", &["descriptionEng", "DescriptionEng"]),
    FieldSpec::new("scanItem", &["scanItem", "ScanItem"]),
    FieldSpec::new("redirectUrl", &["redirectUrl", "RedirectUrl"]),
    FieldSpec::new("getProductUrl", &["getProductUrl", "GetProductUrl"]),
    FieldSpec::new("getCustomerUrl", &["getCustomerUrl", "GetCustomerUrl"]),
    FieldSpec::new("registerCustomerUrl", &["registerCustomerUrl", "RegisterCustomerUrl"]),
    FieldSpec::new("requestOtpViaEmailUrl", &["requestOtpViaEmailUrl", "RequestOtpViaEmailUrl"]),
    FieldSpec::new("themeVerify", &["themeVerify", "ThemeVerify"]),
    FieldSpec::new("dataGeneratedDate", &["dataGeneratedDate", "DataGeneratedDate"]),
    FieldSpec::new("ttlMinute", &["ttlMinute", "TtlMinute"]),
    FieldSpec::new("productData", &["productData", "ProductData"]),
];

/// Voucher API response fields lifted to PascalCase
pub const VOUCHER_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Id", &["Id", "id"]),
    FieldSpec::new("VoucherNo", &["VoucherNo", "voucherNo"]),
    FieldSpec::new("Pin", &["Pin", "pin"]),
    FieldSpec::new("PrivilegeName", &["PrivilegeName", "privilegeName"]),
    FieldSpec::new("PrivilegeCode", &["PrivilegeCode", "privilegeCode"]),
    FieldSpec::new("StartDate", &["StartDate", "startDate"]),
    FieldSpec::new("ExpiryDate", &["ExpiryDate", "expiryDate"]),
];

/// Identifier of a voucher record, under any of its historical names
pub const VOUCHER_ID_CANDIDATES: &[&str] = &["Id", "id", "VoucherId", "voucherId"];

/// Cached per-organisation encryption config
pub const ENCRYPTION_CONFIG_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("key", &["Encryption_Key", "encryption_key", "EncryptionKey"]),
    FieldSpec::new("iv", &["Encryption_Iv", "encryption_iv", "EncryptionIv"]),
];

/// Find the first non-null value for `candidates`
pub fn lookup<'a>(raw: &'a Map<String, Value>, candidates: &[&str]) -> Option<&'a Value> {
    lookup_by(raw, candidates, |v| !v.is_null())
}

/// Like [`lookup`], rendered as a string and skipping blank strings
pub fn lookup_non_empty(raw: &Map<String, Value>, candidates: &[&str]) -> Option<String> {
    lookup_by(raw, candidates, |v| {
        value_as_string(v).is_some_and(|s| !s.trim().is_empty())
    })
    .and_then(value_as_string)
}

/// Two-pass lookup with a caller-supplied acceptance test
pub fn lookup_by<'a, F>(
    raw: &'a Map<String, Value>,
    candidates: &[&str],
    accept: F,
) -> Option<&'a Value>
where
    F: Fn(&Value) -> bool,
{
    for candidate in candidates {
        if let Some(value) = raw.get(*candidate).filter(|v| accept(v)) {
            return Some(value);
        }
    }

    for candidate in candidates {
        // Several keys may fold to the same candidate; the smallest key wins
        // so the result never depends on map iteration order.
        let found = raw
            .iter()
            .filter(|(key, value)| key.eq_ignore_ascii_case(candidate) && accept(value))
            .min_by(|a, b| a.0.cmp(b.0))
            .map(|(_, value)| value);

        if found.is_some() {
            return found;
        }
    }

    None
}

/// Map `raw` onto the canonical field names in `specs`
pub fn normalize(raw: &Map<String, Value>, specs: &[FieldSpec]) -> Map<String, Value> {
    specs
        .iter()
        .filter_map(|spec| {
            lookup(raw, spec.candidates).map(|value| (spec.canonical.to_string(), value.clone()))
        })
        .collect()
}

/// Normalize a JSON value; anything but an object means "no record"
pub fn normalize_value(raw: &Value, specs: &[FieldSpec]) -> Option<Map<String, Value>> {
    raw.as_object().map(|obj| normalize(obj, specs))
}

/// Normalize a nested record found under `candidates`
///
/// A missing or non-object nested value yields `None` rather than an error.
pub fn normalize_nested(
    raw: &Map<String, Value>,
    candidates: &[&str],
    specs: &[FieldSpec],
) -> Option<Map<String, Value>> {
    lookup(raw, candidates).and_then(|nested| normalize_value(nested, specs))
}

/// Render a scalar JSON value as a string
pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_exact_match_beats_case_insensitive() {
        let raw = object(json!({ "Status": "A", "status": "B" }));
        let value = lookup(&raw, &["status", "Status"]);
        assert_eq!(value, Some(&json!("B")));

        let value = lookup(&raw, &["Status", "status"]);
        assert_eq!(value, Some(&json!("A")));
    }

    #[test]
    fn test_case_insensitive_fallback() {
        let raw = object(json!({ "SERIAL": "S-1" }));
        let normalized = normalize(&raw, SCAN_ITEM_FIELDS);
        assert_eq!(normalized.get("serial"), Some(&json!("S-1")));
    }

    #[test]
    fn test_null_values_fall_through() {
        let raw = object(json!({ "Id": null, "id": "7" }));
        assert_eq!(lookup(&raw, &["Id", "id"]), Some(&json!("7")));

        let raw = object(json!({ "Id": null }));
        assert_eq!(lookup(&raw, &["Id", "id"]), None);
    }

    #[test]
    fn test_missing_fields_are_absent() {
        let raw = object(json!({ "unrelated": 1 }));
        let normalized = normalize(&raw, SCAN_ITEM_FIELDS);
        assert!(normalized.is_empty());
    }

    #[test]
    fn test_missing_nested_record_is_none() {
        let raw = object(json!({ "Status": "OK" }));
        assert!(normalize_nested(&raw, &["scanItem", "ScanItem"], SCAN_ITEM_FIELDS).is_none());

        let raw = object(json!({ "ScanItem": "not-an-object" }));
        assert!(normalize_nested(&raw, &["scanItem", "ScanItem"], SCAN_ITEM_FIELDS).is_none());
    }

    #[test]
    fn test_nested_record_normalized() {
        let raw = object(json!({
            "ScanItem": { "Serial": "ABC", "Pin": "1234", "RegisteredFlag": "NO" }
        }));
        let item = normalize_nested(&raw, &["scanItem", "ScanItem"], SCAN_ITEM_FIELDS).unwrap();
        assert_eq!(item.get("serial"), Some(&json!("ABC")));
        assert_eq!(item.get("pin"), Some(&json!("1234")));
        assert_eq!(item.get("registeredFlag"), Some(&json!("NO")));
        assert!(!item.contains_key("usedFlag"));
    }

    #[test]
    fn test_lookup_non_empty_skips_blank() {
        let raw = object(json!({ "Id": "", "VoucherId": 42 }));
        assert_eq!(
            lookup_non_empty(&raw, VOUCHER_ID_CANDIDATES),
            Some("42".to_string())
        );
    }

    #[test]
    fn test_colliding_case_variants_are_deterministic() {
        let raw = object(json!({ "PIN": "x", "pIn": "y" }));
        let first = lookup(&raw, &["pin"]).cloned();
        let second = lookup(&raw, &["pin"]).cloned();
        assert_eq!(first, second);
        assert_eq!(first, Some(json!("x")));
    }

    proptest! {
        #[test]
        fn unmatched_keys_never_produce_fields(
            keys in prop::collection::vec("[a-z]{1,6}_[0-9]{1,3}", 0..8),
            value in "[a-zA-Z0-9]{0,10}",
        ) {
            let raw: Map<String, Value> = keys
                .into_iter()
                .map(|k| (k, Value::String(value.clone())))
                .collect();
            let normalized = normalize(&raw, SCAN_ITEM_FIELDS);
            prop_assert!(normalized.is_empty());
        }

        #[test]
        fn normalization_is_deterministic(serial in "[A-Z0-9]{1,12}", pin in "[0-9]{4}") {
            let raw = object(json!({ "Serial": serial, "pin": pin, "extra": true }));
            let a = normalize(&raw, SCAN_ITEM_FIELDS);
            let b = normalize(&raw.clone(), SCAN_ITEM_FIELDS);
            prop_assert_eq!(a, b);
        }
    }
}
