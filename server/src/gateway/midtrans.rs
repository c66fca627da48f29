use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::{GatewayError, PaymentGateway, PaymentSession};

pub const SANDBOX_BASE_URL: &str = "https://app.sandbox.midtrans.com";

const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Serialize)]
struct SnapRequest {
    transaction_details: TransactionDetails,
    credit_card: CreditCard,
}

#[derive(Serialize)]
struct TransactionDetails {
    order_id: String,
    gross_amount: i64,
}

#[derive(Serialize)]
struct CreditCard {
    secure: bool,
}

#[derive(Deserialize)]
struct SnapResponse {
    token: String,
    redirect_url: String,
}

/// Midtrans Snap client. Amounts are sent in whole currency units.
#[derive(Clone)]
pub struct MidtransGateway {
    client: reqwest::Client,
    base_url: String,
    server_key: String,
}

impl MidtransGateway {
    pub fn new(base_url: impl Into<String>, server_key: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            server_key: server_key.into(),
        })
    }

    fn gross_amount(amount: Decimal) -> Result<i64, GatewayError> {
        amount
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .filter(|value| *value > 0)
            .ok_or(GatewayError::InvalidAmount(amount))
    }
}

#[async_trait]
impl PaymentGateway for MidtransGateway {
    async fn create_payment_session(
        &self,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<PaymentSession, GatewayError> {
        let request = SnapRequest {
            transaction_details: TransactionDetails {
                order_id: order_id.to_string(),
                gross_amount: Self::gross_amount(amount)?,
            },
            credit_card: CreditCard { secure: true },
        };

        let response = self
            .client
            .post(format!("{}/snap/v1/transactions", self.base_url))
            .basic_auth(&self.server_key, Some(""))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%order_id, status = status.as_u16(), "Midtrans rejected payment session");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let snap: SnapResponse = response.json().await?;
        tracing::info!(%order_id, "Midtrans payment session created");

        Ok(PaymentSession {
            token: snap.token,
            redirect_url: snap.redirect_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gross_amount_rounds_to_whole_units() {
        assert_eq!(
            MidtransGateway::gross_amount(Decimal::new(15000050, 2)).unwrap(),
            150001
        );
        assert!(MidtransGateway::gross_amount(Decimal::ZERO).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let gateway = MidtransGateway::new("https://example.test/", "key").unwrap();
        assert_eq!(gateway.base_url, "https://example.test");
    }
}
