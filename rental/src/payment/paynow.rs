//! Paynow HTTP client.
//!
//! Requests are form-encoded and signed with an uppercase hex SHA-512 over
//! the field values (in order) followed by the integration key. Responses are
//! url-encoded and carry the same kind of hash, which is verified when
//! present.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use carhire_core::gateway::{
    GatewayError, GatewayFuture, GatewayResult, InitiateRequest, InitiateResponse,
    PaymentGateway, PollResponse,
};
use carhire_core::types::round_money;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use sha2::{Digest, Sha512};

use crate::config::PaynowConfig;

/// Field order of a status update before any extra fields.
const CALLBACK_FIELD_ORDER: [&str; 5] = ["reference", "paynowreference", "amount", "status", "pollurl"];

/// Wallet method sent on the mobile flow.
const MOBILE_METHOD: &str = "ecocash";

/// Uppercase hex SHA-512 of `values` followed by `key`.
#[must_use]
pub fn sign<'a>(values: impl IntoIterator<Item = &'a str>, key: &str) -> String {
    let mut hasher = Sha512::new();
    for value in values {
        hasher.update(value.as_bytes());
    }
    hasher.update(key.as_bytes());
    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(128), |mut out, b| {
            let _ = write!(out, "{b:02X}");
            out
        })
}

type Fields = Vec<(String, String)>;

fn field<'a>(fields: &'a Fields, name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Paynow gateway client.
#[derive(Clone)]
pub struct PaynowClient {
    client: Client,
    config: PaynowConfig,
}

impl PaynowClient {
    /// Client with the configured per-call timeout.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Unavailable`] when the HTTP client cannot be built.
    pub fn new(config: PaynowConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.call_timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn signed(&self, mut form: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        let hash = sign(
            form.iter().map(|(_, v)| v.as_str()),
            &self.config.integration_key,
        );
        form.push(("hash", hash));
        form
    }

    /// Check the hash of a response, when it carries one.
    fn verify(&self, fields: &Fields) -> GatewayResult<()> {
        let Some(expected) = field(fields, "hash") else {
            return Ok(());
        };
        let actual = sign(
            fields
                .iter()
                .filter(|(k, _)| !k.eq_ignore_ascii_case("hash"))
                .map(|(_, v)| v.as_str()),
            &self.config.integration_key,
        );
        if actual.eq_ignore_ascii_case(expected) {
            Ok(())
        } else {
            Err(GatewayError::HashMismatch)
        }
    }

    async fn post_form(&self, url: &str, form: &[(&'static str, String)]) -> GatewayResult<Fields> {
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::Unavailable(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(GatewayError::Rejected(format!("HTTP {status}: {body}")));
        }

        let fields: Fields = serde_urlencoded::from_str(&body)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        if field(&fields, "status").is_some_and(|s| s.eq_ignore_ascii_case("error")) {
            let reason = field(&fields, "error").unwrap_or("unspecified error");
            return Err(GatewayError::Rejected(reason.to_string()));
        }
        self.verify(&fields)?;
        Ok(fields)
    }

    fn initiate_form(&self, request: &InitiateRequest) -> GatewayResult<Vec<(&'static str, String)>> {
        let mut form = vec![
            ("id", self.config.integration_id.clone()),
            ("reference", request.reference.clone()),
            ("amount", round_money(request.amount).to_string()),
            ("additionalinfo", request.description.clone()),
            ("returnurl", self.config.return_url.clone()),
            ("resulturl", self.config.result_url.clone()),
        ];
        let email = request
            .payer_email
            .clone()
            .or_else(|| self.config.merchant_email.clone())
            .unwrap_or_default();
        form.push(("authemail", email));
        if request.method.is_mobile() {
            let phone = request
                .payer_phone
                .clone()
                .ok_or_else(|| GatewayError::Rejected("mobile payment without phone".into()))?;
            form.push(("phone", phone));
            form.push(("method", MOBILE_METHOD.to_string()));
        }
        form.push(("status", "Message".to_string()));
        Ok(self.signed(form))
    }

    async fn do_initiate(&self, request: InitiateRequest) -> GatewayResult<InitiateResponse> {
        let path = if request.method.is_mobile() {
            "remotetransaction"
        } else {
            "initiatetransaction"
        };
        let form = self.initiate_form(&request)?;
        let fields = self.post_form(&self.endpoint(path), &form).await?;

        let poll_url = field(&fields, "pollurl")
            .ok_or_else(|| GatewayError::InvalidResponse("missing pollurl".into()))?
            .to_string();
        let response = InitiateResponse {
            provider_ref: field(&fields, "paynowreference").map(str::to_string),
            poll_url,
            redirect_url: field(&fields, "browserurl").map(str::to_string),
            instructions: field(&fields, "instructions").map(str::to_string),
        };
        tracing::debug!(reference = %request.reference, mobile = request.method.is_mobile(), "Paynow transaction initiated");
        Ok(response)
    }

    async fn do_poll(&self, poll_url: String) -> GatewayResult<PollResponse> {
        let fields = self.post_form(&poll_url, &[]).await?;
        let status_text = field(&fields, "status")
            .ok_or_else(|| GatewayError::InvalidResponse("missing status".into()))?
            .to_string();
        Ok(PollResponse {
            status_text,
            reference: field(&fields, "reference").map(str::to_string),
            provider_ref: field(&fields, "paynowreference").map(str::to_string),
            amount: field(&fields, "amount").and_then(|a| a.parse::<Decimal>().ok()),
        })
    }
}

impl PaymentGateway for PaynowClient {
    fn initiate(&self, request: InitiateRequest) -> GatewayFuture<'_, InitiateResponse> {
        Box::pin(self.do_initiate(request))
    }

    fn poll(&self, poll_url: String) -> GatewayFuture<'_, PollResponse> {
        Box::pin(self.do_poll(poll_url))
    }

    fn verify_callback(&self, fields: &BTreeMap<String, String>) -> Option<bool> {
        let expected = fields.get("hash")?;
        let known = CALLBACK_FIELD_ORDER
            .iter()
            .filter_map(|k| fields.get(*k).map(String::as_str));
        let extra = fields
            .iter()
            .filter(|(k, _)| *k != "hash" && !CALLBACK_FIELD_ORDER.contains(&k.as_str()))
            .map(|(_, v)| v.as_str());
        let actual = sign(known.chain(extra), &self.config.integration_key);
        Some(actual.eq_ignore_ascii_case(expected))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use carhire_core::types::{Currency, PaymentMethod};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn config() -> PaynowConfig {
        PaynowConfig {
            integration_id: "1201".into(),
            integration_key: "secret-key".into(),
            result_url: "https://carhire.test/api/v1/payments/webhook/paynow".into(),
            return_url: "https://carhire.test/payments/return".into(),
            base_url: "https://www.paynow.co.zw/interface/".into(),
            merchant_email: Some("payments@carhire.test".into()),
            call_timeout: Duration::from_secs(10),
            initiate_timeout: Duration::from_secs(30),
        }
    }

    fn request(method: PaymentMethod) -> InitiateRequest {
        InitiateRequest {
            reference: "PAY-1".into(),
            amount: dec!(80),
            currency: Currency::Usd,
            description: "Driver booking DRV-20250301-000001".into(),
            method,
            payer_email: None,
            payer_phone: Some("0771234567".into()),
        }
    }

    #[test]
    fn signature_matches_published_vector() {
        let values = [
            "1201",
            "TEST REF",
            "99.99",
            "A test ticket transaction",
            "http://www.google.com/search?q=returnurl",
            "http://www.google.com/search?q=resulturl",
            "Message",
        ];
        assert_eq!(
            sign(values, "3e9fed89-60e1-4ce5-ab6e-6b1eb2d4f977"),
            "2A033FC38798D913D42ECB786B9B19645ADEDBDE788862032F1BD82CF3B92DEF84F316385D5B40DBB35F1A4FD7D5BFE73835174136463CDD48C9366B0749C689"
        );
    }

    #[test]
    fn redirect_form_is_signed_last() {
        let client = PaynowClient::new(config()).unwrap();
        let form = client.initiate_form(&request(PaymentMethod::Card)).unwrap();
        let names: Vec<_> = form.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            names,
            ["id", "reference", "amount", "additionalinfo", "returnurl", "resulturl", "authemail", "status", "hash"]
        );
        assert_eq!(form[2].1, "80.00");
        assert_eq!(form[6].1, "payments@carhire.test");
        let (hash, values) = form.split_last().unwrap();
        assert_eq!(hash.1, sign(values.iter().map(|(_, v)| v.as_str()), "secret-key"));
        assert_eq!(
            client.endpoint("initiatetransaction"),
            "https://www.paynow.co.zw/interface/initiatetransaction"
        );
    }

    #[test]
    fn mobile_form_carries_phone_and_method() {
        let client = PaynowClient::new(config()).unwrap();
        let form = client.initiate_form(&request(PaymentMethod::Wallet)).unwrap();
        assert!(form.contains(&("phone", "0771234567".to_string())));
        assert!(form.contains(&("method", MOBILE_METHOD.to_string())));

        let mut no_phone = request(PaymentMethod::Wallet);
        no_phone.payer_phone = None;
        assert!(matches!(
            client.initiate_form(&no_phone),
            Err(GatewayError::Rejected(_))
        ));
    }

    #[test]
    fn response_hash_is_verified() {
        let client = PaynowClient::new(config()).unwrap();
        let mut fields: Fields = vec![
            ("reference".into(), "PAY-1".into()),
            ("paynowreference".into(), "PN-1".into()),
            ("amount".into(), "80.00".into()),
            ("status".into(), "Paid".into()),
            ("pollurl".into(), "https://gateway.test/poll/PAY-1".into()),
        ];
        let hash = sign(fields.iter().map(|(_, v)| v.as_str()), "secret-key");
        fields.push(("hash".into(), hash.clone()));
        assert_eq!(client.verify(&fields), Ok(()));

        let callback: BTreeMap<String, String> = fields.iter().cloned().collect();
        assert_eq!(client.verify_callback(&callback), Some(true));

        fields[3].1 = "Cancelled".into();
        assert_eq!(client.verify(&fields), Err(GatewayError::HashMismatch));
        let tampered: BTreeMap<String, String> = fields.into_iter().collect();
        assert_eq!(client.verify_callback(&tampered), Some(false));

        let unsigned = BTreeMap::from([("reference".to_string(), "PAY-1".to_string())]);
        assert_eq!(client.verify_callback(&unsigned), None);
    }
}
