//! Redemption state machine for a single voucher attempt.
//!
//! ```text
//! INPUT ──verify ok──▶ VERIFIED ──approve ok──▶ APPROVED
//!   ▲                     │  ▲                     │
//!   └──────edit───────────┘  │ try again           │
//!   ▲                        │                     │
//!   └───────reset─── ERROR ◀─┴─approve failed      │
//!   └──────────────────────────────reset───────────┘
//! ```
//!
//! Calls are split into `begin_*` (validate, mark in flight, hand back the
//! request) and `complete_*` (apply the reply). A reply whose ticket belongs
//! to an earlier generation is dropped.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Serialize;
use serde_json::Value;

use scanproof_common::normalize::lookup_non_empty;
use scanproof_common::{ScanError, ScanResult, StateTransitionError, VoucherRecord};

use super::endpoint::{VoucherAction, VoucherRequest};

const SUCCESS_STATUSES: &[&str] = &["OK", "SUCCESS", "ACTIVE"];
const VERIFIED_STATUSES: &[&str] = &["OK", "Active", "Redeemed"];
const REDEEMED_STATUSES: &[&str] = &["Redeemed", "Used"];
const REDEEMED: &str = "Redeemed";
const NOT_FOUND_MESSAGE: &str = "Voucher not found";
const CONNECTION_MESSAGE: &str = "Connection error, please try again";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoucherMode {
    #[default]
    Pin,
    Barcode,
}

/// Identifier fields typed by the user (always upper-cased)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierFields {
    pub voucher_no: String,
    pub pin: String,
    pub barcode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "UPPERCASE")]
pub enum Step {
    Input {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Verified {
        record: VoucherRecord,
    },
    Approved {
        record: VoucherRecord,
    },
    Error {
        record: VoucherRecord,
        error: String,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Input { .. } => "INPUT",
            Self::Verified { .. } => "VERIFIED",
            Self::Approved { .. } => "APPROVED",
            Self::Error { .. } => "ERROR",
        }
    }

    pub fn record(&self) -> Option<&VoucherRecord> {
        match self {
            Self::Input { .. } => None,
            Self::Verified { record } | Self::Approved { record } | Self::Error { record, .. } => {
                Some(record)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Verify,
    Approve,
}

/// Handle for an outstanding upstream call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    kind: CallKind,
}

/// Reply from the voucher API, whatever its HTTP status
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub http_status: u16,
    pub record: VoucherRecord,
}

impl ApiReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.http_status)
    }
}

/// What applying a reply did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Reply belonged to an earlier attempt and was dropped
    Stale,
    Updated,
    /// Approval succeeded; fire the one-shot celebration
    Redeemed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherSession {
    org: String,
    mode: VoucherMode,
    fields: IdentifierFields,
    #[serde(skip)]
    hint: VoucherRecord,
    #[serde(flatten)]
    step: Step,
    generation: u64,
    #[serde(skip)]
    in_flight: Option<Ticket>,
}

impl VoucherSession {
    pub fn new(org: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            mode: VoucherMode::default(),
            fields: IdentifierFields::default(),
            hint: VoucherRecord::default(),
            step: Step::Input { error: None },
            generation: 0,
            in_flight: None,
        }
    }

    /// Seed from a base64 JSON hint carried by a voucher link
    pub fn with_hint(org: impl Into<String>, hint_b64: &str) -> ScanResult<Self> {
        let bytes = STANDARD
            .decode(hint_b64.trim())
            .map_err(|_| ScanError::InvalidInput("voucher hint is not base64".to_string()))?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|_| ScanError::InvalidInput("voucher hint is not JSON".to_string()))?;
        let Value::Object(fields) = value else {
            return Err(ScanError::InvalidInput("voucher hint is not an object".to_string()));
        };

        let mut session = Self::new(org);
        let barcode = lookup_non_empty(&fields, &["Barcode"]);
        let voucher_no = lookup_non_empty(&fields, &["VoucherNo", "Serial"]);
        let pin = lookup_non_empty(&fields, &["Pin"]);

        if let Some(barcode) = &barcode {
            session.fields.barcode = barcode.to_uppercase();
        }
        if let Some(voucher_no) = &voucher_no {
            session.fields.voucher_no = voucher_no.to_uppercase();
        }
        if let Some(pin) = pin {
            session.fields.pin = pin.to_uppercase();
        }

        if voucher_no.is_some() {
            session.mode = VoucherMode::Pin;
        } else if barcode.is_some() {
            session.mode = VoucherMode::Barcode;
        }

        session.hint = VoucherRecord::new(fields);
        Ok(session)
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn mode(&self) -> VoucherMode {
        self.mode
    }

    pub fn fields(&self) -> &IdentifierFields {
        &self.fields
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn set_mode(&mut self, mode: VoucherMode) -> Result<(), StateTransitionError> {
        self.require_idle()?;
        self.require_input("change mode")?;
        self.mode = mode;
        self.step = Step::Input { error: None };
        Ok(())
    }

    pub fn set_voucher_no(&mut self, value: &str) -> Result<(), StateTransitionError> {
        self.require_idle()?;
        self.require_input("edit voucher number")?;
        self.fields.voucher_no = value.trim().to_uppercase();
        Ok(())
    }

    pub fn set_pin(&mut self, value: &str) -> Result<(), StateTransitionError> {
        self.require_idle()?;
        self.require_input("edit PIN")?;
        self.fields.pin = value.trim().to_uppercase();
        Ok(())
    }

    pub fn set_barcode(&mut self, value: &str) -> Result<(), StateTransitionError> {
        self.require_idle()?;
        self.require_input("edit barcode")?;
        self.fields.barcode = value.trim().to_uppercase();
        Ok(())
    }

    /// Empty the identifier fields (INPUT only)
    pub fn clear(&mut self) -> Result<(), StateTransitionError> {
        self.require_idle()?;
        self.require_input("clear")?;
        self.fields = IdentifierFields::default();
        self.step = Step::Input { error: None };
        Ok(())
    }

    /// Start over from any step. Outstanding replies become stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.in_flight = None;
        self.fields = IdentifierFields::default();
        self.hint = VoucherRecord::default();
        self.step = Step::Input { error: None };
    }

    /// Go back from VERIFIED to edit the identifiers
    pub fn edit(&mut self) -> Result<(), StateTransitionError> {
        self.require_idle()?;
        if !matches!(self.step, Step::Verified { .. }) {
            return Err(self.invalid("edit"));
        }
        self.generation += 1;
        self.step = Step::Input { error: None };
        Ok(())
    }

    pub fn begin_verify(&mut self) -> Result<(Ticket, VoucherRequest), StateTransitionError> {
        self.require_idle()?;
        self.require_input("verify")?;

        let request = match self.mode {
            VoucherMode::Pin => {
                if self.fields.voucher_no.is_empty() || self.fields.pin.is_empty() {
                    return Err(StateTransitionError::MissingInput("voucher number and PIN"));
                }
                VoucherRequest {
                    action: Some(VoucherAction::VerifyPin.as_str().to_string()),
                    org: Some(self.org.clone()),
                    voucher_no: Some(self.fields.voucher_no.clone()),
                    pin: Some(self.fields.pin.clone()),
                    ..Default::default()
                }
            }
            VoucherMode::Barcode => {
                if self.fields.barcode.is_empty() {
                    return Err(StateTransitionError::MissingInput("barcode"));
                }
                VoucherRequest {
                    action: Some(VoucherAction::VerifyBarcode.as_str().to_string()),
                    org: Some(self.org.clone()),
                    barcode: Some(self.fields.barcode.clone()),
                    ..Default::default()
                }
            }
        };

        self.step = Step::Input { error: None };
        Ok((self.issue(CallKind::Verify), request))
    }

    pub fn complete_verify(&mut self, ticket: Ticket, reply: ScanResult<ApiReply>) -> Applied {
        if !self.accept(ticket, CallKind::Verify) {
            return Applied::Stale;
        }

        self.step = match reply {
            Ok(reply) if !reply.is_success() => Step::Input {
                error: Some(
                    reply
                        .record
                        .description()
                        .unwrap_or_else(|| format!("HTTP Error: {}", reply.http_status)),
                ),
            },
            Ok(reply) if is_verified(&reply.record) => {
                let mut record = self.hint.clone();
                record.merge(&reply.record);
                Step::Verified { record }
            }
            Ok(reply) => Step::Input {
                error: Some(
                    reply
                        .record
                        .description()
                        .unwrap_or_else(|| NOT_FOUND_MESSAGE.to_string()),
                ),
            },
            Err(e) => Step::Input {
                error: Some(connection_message(&e)),
            },
        };

        Applied::Updated
    }

    /// Validate and start an approval
    ///
    /// A record without an identifier or PIN moves the session to ERROR and
    /// nothing is sent upstream.
    pub fn begin_approve(&mut self) -> Result<(Ticket, VoucherRequest), StateTransitionError> {
        self.require_idle()?;
        let Step::Verified { record } = &self.step else {
            return Err(self.invalid("approve"));
        };

        if record.status_is(REDEEMED_STATUSES) {
            return Err(StateTransitionError::AlreadyRedeemed);
        }

        let id = record.id();
        let pin = record
            .pin()
            .or_else(|| Some(self.fields.pin.clone()).filter(|p| !p.is_empty()));

        let (voucher_id, pin) = match (id, pin) {
            (Some(id), Some(pin)) => (id, pin),
            (None, _) => return Err(self.fail_closed(StateTransitionError::MissingIdentifier)),
            (_, None) => return Err(self.fail_closed(StateTransitionError::MissingPin)),
        };

        let request = VoucherRequest {
            action: Some(VoucherAction::Approve.as_str().to_string()),
            org: Some(self.org.clone()),
            voucher_id: Some(voucher_id),
            pin: Some(pin),
            ..Default::default()
        };

        Ok((self.issue(CallKind::Approve), request))
    }

    pub fn complete_approve(&mut self, ticket: Ticket, reply: ScanResult<ApiReply>) -> Applied {
        if !self.accept(ticket, CallKind::Approve) {
            return Applied::Stale;
        }

        let mut record = self.step.record().cloned().unwrap_or_default();

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                self.step = Step::Error {
                    record,
                    error: connection_message(&e),
                };
                return Applied::Updated;
            }
        };

        let description = reply.record.description();
        if description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains("already used"))
        {
            record.set_status(REDEEMED);
            self.step = Step::Error {
                record,
                error: description.unwrap_or_default(),
            };
            return Applied::Updated;
        }

        if !reply.is_success() {
            self.step = Step::Error {
                record,
                error: description.unwrap_or_else(|| format!("HTTP Error: {}", reply.http_status)),
            };
            return Applied::Updated;
        }

        if reply.record.status_is(SUCCESS_STATUSES) {
            record.merge(&self.hint);
            record.merge(&reply.record);
            record.set_status(REDEEMED);
            self.step = Step::Approved { record };
            Applied::Redeemed
        } else {
            let error = description
                .or_else(|| reply.record.status())
                .unwrap_or_else(|| "Approval failed".to_string());
            self.step = Step::Error { record, error };
            Applied::Updated
        }
    }

    /// Retry from ERROR
    ///
    /// Returns to VERIFIED when the record is still usable; otherwise goes
    /// back to INPUT and starts a fresh verify.
    pub fn try_again(&mut self) -> Result<Option<(Ticket, VoucherRequest)>, StateTransitionError> {
        self.require_idle()?;
        let Step::Error { record, .. } = &self.step else {
            return Err(self.invalid("try again"));
        };

        if record.voucher_no().is_some() && !record.status_is(&["ERROR"]) {
            let record = record.clone();
            self.step = Step::Verified { record };
            return Ok(None);
        }

        self.step = Step::Input { error: None };
        self.begin_verify().map(Some)
    }

    fn issue(&mut self, kind: CallKind) -> Ticket {
        let ticket = Ticket {
            generation: self.generation,
            kind,
        };
        self.in_flight = Some(ticket);
        ticket
    }

    fn accept(&mut self, ticket: Ticket, kind: CallKind) -> bool {
        if ticket.kind != kind || self.in_flight != Some(ticket) {
            return false;
        }
        self.in_flight = None;
        true
    }

    fn fail_closed(&mut self, err: StateTransitionError) -> StateTransitionError {
        let record = self.step.record().cloned().unwrap_or_default();
        self.step = Step::Error {
            record,
            error: err.to_string(),
        };
        err
    }

    fn require_idle(&self) -> Result<(), StateTransitionError> {
        if self.in_flight.is_some() {
            return Err(StateTransitionError::RequestInFlight);
        }
        Ok(())
    }

    fn require_input(&self, action: &'static str) -> Result<(), StateTransitionError> {
        if matches!(self.step, Step::Input { .. }) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> StateTransitionError {
        StateTransitionError::InvalidStep {
            action,
            step: self.step.name(),
        }
    }
}

fn is_verified(record: &VoucherRecord) -> bool {
    record.id().is_some() || record.voucher_no().is_some() || record.status_is(VERIFIED_STATUSES)
}

fn connection_message(err: &ScanError) -> String {
    match err {
        ScanError::Proxy(_) => CONNECTION_MESSAGE.to_string(),
        other => other.public_message(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanproof_common::ProxyError;
    use serde_json::json;

    fn reply(status: u16, body: Value) -> ScanResult<ApiReply> {
        Ok(ApiReply {
            http_status: status,
            record: VoucherRecord::from_value(body),
        })
    }

    fn pin_session() -> VoucherSession {
        let mut session = VoucherSession::new("acme");
        session.set_voucher_no("v-1").unwrap();
        session.set_pin("9999").unwrap();
        session
    }

    fn verified_session() -> VoucherSession {
        let mut session = pin_session();
        let (ticket, _) = session.begin_verify().unwrap();
        session.complete_verify(ticket, reply(200, json!({ "Status": "Active", "Id": "1" })));
        session
    }

    #[test]
    fn test_verify_then_approve() {
        let mut session = pin_session();

        let (ticket, request) = session.begin_verify().unwrap();
        assert_eq!(request.action.as_deref(), Some("VERIFY_PIN"));
        assert_eq!(request.voucher_no.as_deref(), Some("V-1"));
        assert_eq!(request.pin.as_deref(), Some("9999"));

        let applied = session.complete_verify(ticket, reply(200, json!({ "Status": "Active", "Id": "1" })));
        assert_eq!(applied, Applied::Updated);
        assert_eq!(session.step().name(), "VERIFIED");

        let (ticket, request) = session.begin_approve().unwrap();
        assert_eq!(request.action.as_deref(), Some("APPROVE"));
        assert_eq!(request.voucher_id.as_deref(), Some("1"));
        assert_eq!(request.pin.as_deref(), Some("9999"));

        let applied = session.complete_approve(ticket, reply(200, json!({ "Status": "OK" })));
        assert_eq!(applied, Applied::Redeemed);
        match session.step() {
            Step::Approved { record } => assert_eq!(record.status().as_deref(), Some(REDEEMED)),
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn test_already_used_marks_record_redeemed() {
        let mut session = pin_session();
        let (ticket, _) = session.begin_verify().unwrap();
        session.complete_verify(
            ticket,
            reply(200, json!({ "Status": "Active", "Id": "1", "VoucherNo": "V-1" })),
        );
        let (ticket, _) = session.begin_approve().unwrap();

        session.complete_approve(ticket, reply(200, json!({ "Description": "Voucher already used" })));

        match session.step() {
            Step::Error { record, error } => {
                assert_eq!(record.status().as_deref(), Some(REDEEMED));
                assert_eq!(error, "Voucher already used");
            }
            other => panic!("unexpected step {other:?}"),
        }

        // Try again returns to VERIFIED, but approving is refused locally
        assert_eq!(session.try_again().unwrap(), None);
        assert_eq!(session.begin_approve().unwrap_err(), StateTransitionError::AlreadyRedeemed);
    }

    #[test]
    fn test_redeemed_record_cannot_be_approved_again() {
        let mut session = pin_session();
        session.set_voucher_no("V-2").unwrap();
        let (ticket, _) = session.begin_verify().unwrap();
        session.complete_verify(
            ticket,
            reply(200, json!({ "Status": "Redeemed", "Id": "2", "VoucherNo": "V-2" })),
        );

        assert_eq!(session.begin_approve().unwrap_err(), StateTransitionError::AlreadyRedeemed);
        assert!(!session.is_busy());
    }

    #[test]
    fn test_failed_verify_stays_in_input() {
        let mut session = pin_session();
        let (ticket, _) = session.begin_verify().unwrap();
        session.complete_verify(ticket, reply(200, json!({ "Status": "ERROR", "Description": "Not found" })));

        assert_eq!(session.step(), &Step::Input { error: Some("Not found".to_string()) });

        let (ticket, _) = session.begin_verify().unwrap();
        session.complete_verify(ticket, Err(ProxyError::UpstreamUnreachable("down".to_string()).into()));
        assert_eq!(
            session.step(),
            &Step::Input { error: Some(CONNECTION_MESSAGE.to_string()) }
        );
    }

    #[test]
    fn test_non_2xx_verify_uses_description() {
        let mut session = pin_session();
        let (ticket, _) = session.begin_verify().unwrap();
        session.complete_verify(ticket, reply(404, json!({ "Status": "ERROR", "Description": "Backend Error: 404" })));
        assert_eq!(
            session.step(),
            &Step::Input { error: Some("Backend Error: 404".to_string()) }
        );
    }

    #[test]
    fn test_missing_input_rejected_locally() {
        let mut session = VoucherSession::new("acme");
        assert_eq!(
            session.begin_verify().unwrap_err(),
            StateTransitionError::MissingInput("voucher number and PIN")
        );

        session.set_mode(VoucherMode::Barcode).unwrap();
        assert_eq!(
            session.begin_verify().unwrap_err(),
            StateTransitionError::MissingInput("barcode")
        );
        assert!(!session.is_busy());
    }

    #[test]
    fn test_approve_without_id_fails_closed() {
        let mut session = pin_session();
        let (ticket, _) = session.begin_verify().unwrap();
        session.complete_verify(ticket, reply(200, json!({ "Status": "OK", "VoucherNo": "V-1" })));

        assert_eq!(session.begin_approve().unwrap_err(), StateTransitionError::MissingIdentifier);
        assert_eq!(session.step().name(), "ERROR");
        assert!(!session.is_busy());
    }

    #[test]
    fn test_approve_requires_verified() {
        let mut session = pin_session();
        let err = session.begin_approve().unwrap_err();
        assert_eq!(
            err,
            StateTransitionError::InvalidStep {
                action: "approve",
                step: "INPUT"
            }
        );
    }

    #[test]
    fn test_no_double_submit() {
        let mut session = pin_session();
        let _ticket = session.begin_verify().unwrap();
        assert!(session.is_busy());
        assert_eq!(session.begin_verify().unwrap_err(), StateTransitionError::RequestInFlight);
    }

    #[test]
    fn test_fields_locked_while_verify_in_flight() {
        let mut session = pin_session();
        let (ticket, _) = session.begin_verify().unwrap();

        let busy = Err(StateTransitionError::RequestInFlight);
        assert_eq!(session.set_voucher_no("V-2"), busy);
        assert_eq!(session.set_pin("0000"), busy);
        assert_eq!(session.set_barcode("XYZ"), busy);
        assert_eq!(session.set_mode(VoucherMode::Barcode), busy);
        assert_eq!(session.clear(), busy);
        assert_eq!(session.fields().voucher_no, "V-1");
        assert_eq!(session.mode(), VoucherMode::Pin);

        session.complete_verify(ticket, reply(200, json!({ "Status": "Active", "Id": "1" })));
        assert_eq!(session.step().name(), "VERIFIED");
    }

    #[test]
    fn test_stale_verify_after_reset_is_ignored() {
        let mut session = pin_session();
        let (ticket, _) = session.begin_verify().unwrap();

        session.reset();
        session.set_voucher_no("OTHER").unwrap();

        let applied = session.complete_verify(ticket, reply(200, json!({ "Status": "Active", "Id": "1" })));
        assert_eq!(applied, Applied::Stale);
        assert_eq!(session.step(), &Step::Input { error: None });
        assert_eq!(session.fields().voucher_no, "OTHER");
    }

    #[test]
    fn test_edit_keeps_fields_and_bumps_generation() {
        let mut session = verified_session();
        let generation = session.generation();

        session.edit().unwrap();
        assert_eq!(session.step().name(), "INPUT");
        assert_eq!(session.fields().voucher_no, "V-1");
        assert_eq!(session.generation(), generation + 1);
    }

    #[test]
    fn test_try_again_paths() {
        // Usable record goes straight back to VERIFIED
        let mut session = verified_session();
        let (ticket, _) = session.begin_approve().unwrap();
        session.complete_approve(ticket, reply(500, json!({ "Status": "ERROR", "Description": "Backend Error: 500" })));
        assert_eq!(session.step().name(), "ERROR");

        // Record without a voucher number re-verifies
        let request = session.try_again().unwrap();
        assert!(request.is_some());
        assert_eq!(session.step().name(), "INPUT");
        assert!(session.is_busy());
    }

    #[test]
    fn test_try_again_with_voucher_number_returns_to_verified() {
        let mut session = pin_session();
        let (ticket, _) = session.begin_verify().unwrap();
        session.complete_verify(
            ticket,
            reply(200, json!({ "Status": "Active", "Id": "1", "VoucherNo": "V-1" })),
        );
        let (ticket, _) = session.begin_approve().unwrap();
        session.complete_approve(ticket, reply(200, json!({ "Status": "ERROR", "Description": "Temporarily unavailable" })));
        assert_eq!(session.step().name(), "ERROR");

        assert_eq!(session.try_again().unwrap(), None);
        assert_eq!(session.step().name(), "VERIFIED");
    }

    #[test]
    fn test_hint_seeds_fields_and_mode() {
        let hint = STANDARD.encode(r#"{"barcode":"abc123","Extra":"x"}"#);
        let session = VoucherSession::with_hint("acme", &hint).unwrap();
        assert_eq!(session.mode(), VoucherMode::Barcode);
        assert_eq!(session.fields().barcode, "ABC123");

        let hint = STANDARD.encode(r#"{"serial":"v9","PIN":"ab12","Barcode":"zz"}"#);
        let session = VoucherSession::with_hint("acme", &hint).unwrap();
        assert_eq!(session.mode(), VoucherMode::Pin);
        assert_eq!(session.fields().voucher_no, "V9");
        assert_eq!(session.fields().pin, "AB12");

        assert!(VoucherSession::with_hint("acme", "!!!").is_err());
    }

    #[test]
    fn test_verified_record_merges_hint() {
        let hint = STANDARD.encode(r#"{"VoucherNo":"V-1","Pin":"1111","PrivilegeName":"Coffee"}"#);
        let mut session = VoucherSession::with_hint("acme", &hint).unwrap();
        let (ticket, _) = session.begin_verify().unwrap();
        session.complete_verify(ticket, reply(200, json!({ "status": "Active", "id": "7", "privilegeName": "Tea" })));

        let record = session.step().record().unwrap();
        assert_eq!(record.id().as_deref(), Some("7"));
        assert_eq!(record.fields().get("privilegeName"), Some(&json!("Tea")));
        assert!(!record.fields().contains_key("PrivilegeName"));
        assert_eq!(record.pin().as_deref(), Some("1111"));
    }

    #[test]
    fn test_snapshot_serializes_step() {
        let session = verified_session();
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["step"], "VERIFIED");
        assert_eq!(json["mode"], "PIN");
        assert_eq!(json["record"]["Id"], "1");
    }
}
