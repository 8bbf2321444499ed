//! Scripted payment gateway.

use carhire_core::gateway::{
    GatewayError, GatewayFuture, GatewayResult, InitiateRequest, InitiateResponse,
    PaymentGateway, PollResponse,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Script {
    initiate_failures: VecDeque<GatewayError>,
    poll_failures: VecDeque<GatewayError>,
    poll_status: HashMap<String, String>,
    initiated: Vec<InitiateRequest>,
    polls: Vec<String>,
    callback_verdict: Option<bool>,
}

/// Gateway whose answers are set by the test.
///
/// Initiate succeeds with `poll_url = https://gateway.test/poll/<reference>`
/// unless a failure is queued. Polls return the status text set with
/// [`ScriptedGateway::set_status`], `"Sent"` by default.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGateway {
    script: Arc<Mutex<Script>>,
}

impl ScriptedGateway {
    /// New gateway with default answers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Poll URL issued for a merchant reference.
    #[must_use]
    pub fn poll_url_for(reference: &str) -> String {
        format!("https://gateway.test/poll/{reference}")
    }

    /// Provider reference issued for a merchant reference.
    #[must_use]
    pub fn provider_ref_for(reference: &str) -> String {
        format!("PN-{reference}")
    }

    /// Set the status text returned for `poll_url`.
    pub fn set_status(&self, poll_url: &str, text: &str) {
        self.lock()
            .poll_status
            .insert(poll_url.to_string(), text.to_string());
    }

    /// Fail the next initiate call.
    pub fn fail_next_initiate(&self, error: GatewayError) {
        self.lock().initiate_failures.push_back(error);
    }

    /// Fail the next poll call.
    pub fn fail_next_poll(&self, error: GatewayError) {
        self.lock().poll_failures.push_back(error);
    }

    /// Verdict returned by `verify_callback`.
    pub fn set_callback_verdict(&self, verdict: Option<bool>) {
        self.lock().callback_verdict = verdict;
    }

    /// Initiate requests seen so far.
    #[must_use]
    pub fn initiated(&self) -> Vec<InitiateRequest> {
        self.lock().initiated.clone()
    }

    /// Poll URLs requested so far.
    #[must_use]
    pub fn polls(&self) -> Vec<String> {
        self.lock().polls.clone()
    }

    fn answer_initiate(&self, request: InitiateRequest) -> GatewayResult<InitiateResponse> {
        let mut script = self.lock();
        script.initiated.push(request.clone());
        if let Some(err) = script.initiate_failures.pop_front() {
            return Err(err);
        }
        let mobile = request.method.is_mobile();
        Ok(InitiateResponse {
            provider_ref: Some(Self::provider_ref_for(&request.reference)),
            poll_url: Self::poll_url_for(&request.reference),
            redirect_url: (!mobile)
                .then(|| format!("https://gateway.test/pay/{}", request.reference)),
            instructions: mobile.then(|| "Dial *151# and approve the payment".to_string()),
        })
    }

    fn answer_poll(&self, poll_url: String) -> GatewayResult<PollResponse> {
        let mut script = self.lock();
        script.polls.push(poll_url.clone());
        if let Some(err) = script.poll_failures.pop_front() {
            return Err(err);
        }
        let status_text = script
            .poll_status
            .get(&poll_url)
            .cloned()
            .unwrap_or_else(|| "Sent".to_string());
        let reference = poll_url.rsplit('/').next().map(str::to_string);
        Ok(PollResponse {
            status_text,
            provider_ref: reference.as_deref().map(Self::provider_ref_for),
            reference,
            amount: None,
        })
    }
}

impl PaymentGateway for ScriptedGateway {
    fn initiate(&self, request: InitiateRequest) -> GatewayFuture<'_, InitiateResponse> {
        let answer = self.answer_initiate(request);
        Box::pin(async move { answer })
    }

    fn poll(&self, poll_url: String) -> GatewayFuture<'_, PollResponse> {
        let answer = self.answer_poll(poll_url);
        Box::pin(async move { answer })
    }

    fn verify_callback(&self, fields: &BTreeMap<String, String>) -> Option<bool> {
        if fields.contains_key("hash") {
            Some(self.lock().callback_verdict.unwrap_or(true))
        } else {
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use carhire_core::types::{Currency, PaymentMethod};
    use rust_decimal::Decimal;

    fn request(reference: &str, method: PaymentMethod) -> InitiateRequest {
        InitiateRequest {
            reference: reference.to_string(),
            amount: Decimal::new(4500, 2),
            currency: Currency::Usd,
            description: "Reservation".to_string(),
            method,
            payer_email: None,
            payer_phone: None,
        }
    }

    #[tokio::test]
    async fn mobile_initiate_returns_instructions() {
        let gateway = ScriptedGateway::new();
        let answer = gateway.initiate(request("PAY-1", PaymentMethod::Wallet)).await;
        let Ok(answer) = answer else {
            panic!("initiate failed");
        };
        assert_eq!(answer.poll_url, ScriptedGateway::poll_url_for("PAY-1"));
        assert!(answer.redirect_url.is_none());
        assert!(answer.instructions.is_some());
        assert_eq!(gateway.initiated().len(), 1);
    }

    #[tokio::test]
    async fn queued_failures_are_used_once() {
        let gateway = ScriptedGateway::new();
        gateway.fail_next_poll(GatewayError::Timeout);
        let url = ScriptedGateway::poll_url_for("PAY-2");
        assert_eq!(gateway.poll(url.clone()).await, Err(GatewayError::Timeout));

        gateway.set_status(&url, "Paid");
        let polled = gateway.poll(url.clone()).await.map(|p| p.status_text);
        assert_eq!(polled.as_deref(), Ok("Paid"));
        assert_eq!(gateway.polls(), vec![url.clone(), url]);
    }

    #[test]
    fn callback_verdict_needs_a_hash() {
        let gateway = ScriptedGateway::new();
        let mut fields = BTreeMap::new();
        assert_eq!(gateway.verify_callback(&fields), None);
        fields.insert("hash".to_string(), "ABC".to_string());
        assert_eq!(gateway.verify_callback(&fields), Some(true));
        gateway.set_callback_verdict(Some(false));
        assert_eq!(gateway.verify_callback(&fields), Some(false));
    }
}
