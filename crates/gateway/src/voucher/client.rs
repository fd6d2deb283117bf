//! Drives a [`VoucherSession`] against the voucher endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use scanproof_common::{ProxyError, ScanResult, StateTransitionError, VoucherRecord};

use super::endpoint::VoucherRequest;
use super::session::{Applied, ApiReply, Step, VoucherSession};

/// Anything that can answer a voucher request
#[async_trait]
pub trait VoucherApi: Send + Sync {
    async fn call(&self, request: &VoucherRequest) -> ScanResult<ApiReply>;
}

/// Talks to a running gateway's `/api/voucher`
pub struct HttpVoucherApi {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpVoucherApi {
    pub fn new(gateway_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/voucher", gateway_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl VoucherApi for HttpVoucherApi {
    async fn call(&self, request: &VoucherRequest) -> ScanResult<ApiReply> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| ProxyError::UpstreamUnreachable(e.to_string()))?;

        let http_status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ProxyError::UpstreamUnreachable(e.to_string()))?;

        // Non-JSON bodies still carry a useful status code
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);

        Ok(ApiReply {
            http_status,
            record: VoucherRecord::from_value(body),
        })
    }
}

pub struct RedemptionDriver<A> {
    api: A,
}

impl<A: VoucherApi> RedemptionDriver<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub async fn verify(&self, session: &mut VoucherSession) -> Result<(), StateTransitionError> {
        let (ticket, request) = session.begin_verify()?;
        debug!(action = ?request.action, "Verifying voucher");

        let reply = self.api.call(&request).await;
        session.complete_verify(ticket, reply);
        log_step(session);
        Ok(())
    }

    /// Approve the verified voucher; `Ok(true)` when it was redeemed
    pub async fn approve(&self, session: &mut VoucherSession) -> Result<bool, StateTransitionError> {
        let (ticket, request) = session.begin_approve()?;
        debug!(voucher_id = ?request.voucher_id, "Approving voucher");

        let reply = self.api.call(&request).await;
        let applied = session.complete_approve(ticket, reply);
        log_step(session);

        if applied == Applied::Redeemed {
            info!("🎉 Voucher redeemed");
            return Ok(true);
        }
        Ok(false)
    }

    pub async fn try_again(&self, session: &mut VoucherSession) -> Result<(), StateTransitionError> {
        if let Some((ticket, request)) = session.try_again()? {
            let reply = self.api.call(&request).await;
            session.complete_verify(ticket, reply);
        }
        log_step(session);
        Ok(())
    }
}

fn log_step(session: &VoucherSession) {
    match session.step() {
        Step::Input { error: Some(error) } => warn!(error = %error, "Voucher input rejected"),
        Step::Error { error, .. } => warn!(error = %error, "Voucher redemption failed"),
        step => info!(step = step.name(), "Voucher step"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{MockUpstreamTransport, OutboundRequest, ProxyGateway};
    use crate::testing::{raw, replying, silent};
    use crate::voucher::VoucherService;
    use mockall::Sequence;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    /// Answers through the endpoint service without HTTP
    struct LocalVoucherApi {
        service: Arc<VoucherService>,
    }

    #[async_trait]
    impl VoucherApi for LocalVoucherApi {
        async fn call(&self, request: &VoucherRequest) -> ScanResult<ApiReply> {
            let reply = self.service.handle(request).await;
            Ok(ApiReply {
                http_status: reply.status,
                record: VoucherRecord::from_value(reply.body),
            })
        }
    }

    fn driver(transport: MockUpstreamTransport) -> RedemptionDriver<LocalVoucherApi> {
        let proxy = ProxyGateway::new(Arc::new(transport), ["api.allowed.example"], Duration::from_secs(5));
        let service = VoucherService::new(Arc::new(proxy), "https://api.allowed.example");
        RedemptionDriver::new(LocalVoucherApi {
            service: Arc::new(service),
        })
    }

    fn pin_session() -> VoucherSession {
        let mut session = VoucherSession::new("acme");
        session.set_voucher_no("V-1").unwrap();
        session.set_pin("1234").unwrap();
        session
    }

    #[tokio::test]
    async fn test_full_redemption() {
        let mut transport = MockUpstreamTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_send()
            .withf(|req: &OutboundRequest| req.url.path().ends_with("/VerifyVoucherByPin/V-1/1234"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(raw(200, r#"{"status":"Active","id":"11","voucherNo":"V-1"}"#)));
        transport
            .expect_send()
            .withf(|req: &OutboundRequest| req.url.path().ends_with("/ApproveVoucherUsedById/11/1234"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(raw(200, r#"{"IsSuccess":true}"#)));
        let driver = driver(transport);
        let mut session = pin_session();

        assert_ok!(driver.verify(&mut session).await);
        assert_eq!(session.step().name(), "VERIFIED");

        assert!(assert_ok!(driver.approve(&mut session).await));
        assert_eq!(session.step().name(), "APPROVED");
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces_as_inline_error() {
        let driver = driver(replying(&[(404, r#"{"message":"nope"}"#)]));
        let mut session = pin_session();

        driver.verify(&mut session).await.unwrap();
        assert_eq!(
            session.step(),
            &Step::Input {
                error: Some("Backend Error: 404".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_local_validation_sends_nothing() {
        let driver = driver(silent());
        let mut session = VoucherSession::new("acme");

        assert_err!(driver.verify(&mut session).await);
    }
}
