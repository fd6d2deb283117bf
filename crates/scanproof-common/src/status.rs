//! Status classification and the closed verification status taxonomy.
//!
//! Bucket membership is checked SUCCESS, then WARNING; everything else is an
//! ERROR. The title/message lookup is total and falls back to `UNKNOWN`.

use serde::{Deserialize, Serialize};

/// Tokens classified as success
pub const SUCCESS_TOKENS: &[&str] = &["OK", "SUCCESS", "VALID"];

/// Tokens classified as warning
pub const WARNING_TOKENS: &[&str] = &["ALREADY_REGISTERED", "EXPIRED"];

/// Coarse classification of a status token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusBucket {
    Success,
    Warning,
    Error,
}

impl StatusBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Result of classifying a status token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub bucket: StatusBucket,
    pub normalized_key: String,
}

/// Display language for status text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Th,
    En,
}

impl Language {
    /// Parse a `lang` parameter; anything unrecognized is Thai
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("en") => Self::En,
            _ => Self::Th,
        }
    }
}

/// Closed set of verification status tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Valid,
    Success,
    Ok,
    AlreadyRegistered,
    NotFound,
    ParamMissing,
    ParameterMissing,
    NoData,
    MissingTheme,
    MissingOrg,
    DecryptFail,
    DecryptError,
    Invalid,
    Failed,
    Expired,
    Unknown,
}

impl StatusKind {
    pub const ALL: [StatusKind; 16] = [
        Self::Valid,
        Self::Success,
        Self::Ok,
        Self::AlreadyRegistered,
        Self::NotFound,
        Self::ParamMissing,
        Self::ParameterMissing,
        Self::NoData,
        Self::MissingTheme,
        Self::MissingOrg,
        Self::DecryptFail,
        Self::DecryptError,
        Self::Invalid,
        Self::Failed,
        Self::Expired,
        Self::Unknown,
    ];

    /// Wire token for this status
    pub fn token(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Success => "SUCCESS",
            Self::Ok => "OK",
            Self::AlreadyRegistered => "ALREADY_REGISTERED",
            Self::NotFound => "NOTFOUND",
            Self::ParamMissing => "PARAM_MISSING",
            Self::ParameterMissing => "PARAMETER_MISSING",
            Self::NoData => "NO_DATA",
            Self::MissingTheme => "MISSING_THEME",
            Self::MissingOrg => "MISSING_ORG",
            Self::DecryptFail => "DECRYPT_FAIL",
            Self::DecryptError => "DECRYPT_ERROR",
            Self::Invalid => "INVALID",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Look up a normalized key; unrecognized keys have no kind
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.token() == key)
    }

    /// Title and ordered messages for this status
    pub fn text(&self, lang: Language) -> StatusText {
        let (title, messages): (&'static str, &'static [&'static str]) = match lang {
            Language::En => english(*self),
            Language::Th => thai(*self),
        };
        StatusText { title, messages }
    }
}

/// Localized title and messages for a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusText {
    pub title: &'static str,
    pub messages: &'static [&'static str],
}

/// Trim, upper-case and collapse whitespace runs to `_`
pub fn normalize_key(token: &str) -> String {
    token
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

/// Bucket a status token
pub fn classify(token: &str) -> Classification {
    let normalized_key = normalize_key(token);

    let bucket = if SUCCESS_TOKENS.contains(&normalized_key.as_str()) {
        StatusBucket::Success
    } else if WARNING_TOKENS.contains(&normalized_key.as_str()) {
        StatusBucket::Warning
    } else {
        StatusBucket::Error
    };

    Classification {
        bucket,
        normalized_key,
    }
}

/// Title/messages for any token, falling back to `UNKNOWN`
pub fn describe(token: &str, lang: Language) -> StatusText {
    StatusKind::from_key(&normalize_key(token))
        .unwrap_or(StatusKind::Unknown)
        .text(lang)
}

const GENUINE_EN: &[&str] = &["Thank you for verifying. You are using a genuine product"];
const GENUINE_TH: &[&str] = &["ขอบคุณที่ตรวจสอบ คุณกำลังใช้สินค้าของแท้"];
const UNREADABLE_EN: &[&str] = &["Cannot read product data. Data may be corrupted or invalid"];
const UNREADABLE_TH: &[&str] = &["ไม่สามารถอ่านข้อมูลสินค้าได้ ข้อมูลอาจเสียหายหรือไม่ถูกต้อง"];

fn english(kind: StatusKind) -> (&'static str, &'static [&'static str]) {
    match kind {
        StatusKind::Valid | StatusKind::Success | StatusKind::Ok => {
            ("Genuine Product Confirmed", GENUINE_EN)
        }
        StatusKind::AlreadyRegistered => (
            "Code Already Used",
            &[
                "This code has been used before or may have been registered by someone else",
                "Please contact support for further verification",
            ],
        ),
        StatusKind::NotFound => (
            "Code Not Found",
            &["This product was not found in the system. It may not be registered"],
        ),
        StatusKind::ParamMissing => (
            "Missing Required Data",
            &["Required verification data is incomplete. Cannot proceed with authenticity verification"],
        ),
        StatusKind::ParameterMissing => (
            "Missing Parameters",
            &[
                "The verification parameters are incorrect or missing",
                "Please check the link or QR Code and try again",
            ],
        ),
        StatusKind::NoData => (
            "No Data Available",
            &["No verification data available. The link or QR Code may be invalid or corrupted"],
        ),
        StatusKind::MissingTheme => (
            "Theme Information Missing",
            &["Theme information is missing from the link"],
        ),
        StatusKind::MissingOrg => (
            "Organization Information Missing",
            &["Organization information is missing from the link"],
        ),
        StatusKind::DecryptFail | StatusKind::DecryptError => ("Decryption Failed", UNREADABLE_EN),
        StatusKind::Invalid => (
            "Invalid Code",
            &["Product data is invalid or does not match the system. May be counterfeit or tampered"],
        ),
        StatusKind::Failed => (
            "Verification Failed",
            &["Authenticity verification failed. System error occurred. Please try again or contact support"],
        ),
        StatusKind::Expired => (
            "Code Expired",
            &["This verification code has expired. Please request a new code"],
        ),
        StatusKind::Unknown => (
            "Unknown Status - Please Contact Support",
            &["Unable to determine result from received data"],
        ),
    }
}

fn thai(kind: StatusKind) -> (&'static str, &'static [&'static str]) {
    match kind {
        StatusKind::Valid | StatusKind::Success | StatusKind::Ok => {
            ("ยืนยันแล้วว่าเป็นสินค้าแท้", GENUINE_TH)
        }
        StatusKind::AlreadyRegistered => (
            "โค้ดนี้ถูกใช้ไปแล้ว",
            &[
                "โค้ดนี้ถูกใช้งานไปก่อนหน้าหรืออาจถูกลงทะเบียนโดยผู้อื่น",
                "กรุณาติดต่อทีมงานเพื่อช่วยตรวจสอบเพิ่มเติม",
            ],
        ),
        StatusKind::NotFound => (
            "ไม่พบโค้ดนี้ในระบบ",
            &["ไม่พบข้อมูลสินค้านี้ในระบบ สินค้าอาจไม่ได้ลงทะเบียนในระบบ"],
        ),
        StatusKind::ParamMissing => (
            "ข้อมูลที่ส่งมาไม่ครบ",
            &["ข้อมูลที่จำเป็นสำหรับการตรวจสอบไม่ครบถ้วน ไม่สามารถดำเนินการตรวจสอบความแท้ได้"],
        ),
        StatusKind::ParameterMissing => (
            "พารามิเตอร์ไม่ครบถ้วน",
            &[
                "พารามิเตอร์ที่ส่งมาตรวจสอบไม่ถูกต้องหรือหายไป",
                "กรุณาตรวจสอบลิงก์หรือ QR Code ที่ใช้ใหม่อีกครั้ง",
            ],
        ),
        StatusKind::NoData => (
            "ไม่มีข้อมูล",
            &["ไม่มีข้อมูลสำหรับการตรวจสอบ ลิงก์หรือ QR Code อาจไม่ถูกต้อง หรือข้อมูลเสียหาย"],
        ),
        StatusKind::MissingTheme => ("ไม่มีข้อมูล theme ในลิงค์", &["ไม่มีข้อมูล theme ในลิงก์"]),
        StatusKind::MissingOrg => ("ไม่มีข้อมูล org ในลิงค์", &["ไม่มีข้อมูล org ในลิงก์"]),
        StatusKind::DecryptFail | StatusKind::DecryptError => {
            ("ไม่สามารถถอดรหัสข้อมูลได้", UNREADABLE_TH)
        }
        StatusKind::Invalid => (
            "โค้ดไม่ถูกต้อง",
            &["ข้อมูลสินค้าไม่ถูกต้องหรือไม่ตรงกับระบบ อาจเป็นสินค้าปลอมหรือข้อมูลถูกดัดแปลง"],
        ),
        StatusKind::Failed => (
            "การตรวจสอบล้มเหลว",
            &["การตรวจสอบความแท้ล้มเหลว เกิดข้อผิดพลาดจากระบบ กรุณาลองใหม่อีกครั้งหรือติดต่อทีมงาน"],
        ),
        StatusKind::Expired => (
            "โค้ดนี้หมดอายุแล้ว",
            &["โค้ดยืนยันนี้หมดอายุแล้ว กรุณาขอโค้ดใหม่"],
        ),
        StatusKind::Unknown => (
            "สถานะไม่แน่ชัด กรุณาติดต่อทีมงาน",
            &["ไม่สามารถสรุปผลได้จากข้อมูลที่ได้รับ"],
        ),
    }
}
