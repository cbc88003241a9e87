//! Access to the wallet's payments on the server.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

use crate::observability::sanitization::sanitize_invoice;
use crate::types::{
    CreatedInvoice, PaymentAck, PaymentStatus, RawPayment, Wallet, WalletDetails,
};

const API_KEY_HEADER: &str = "X-Api-Key";

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create_invoice(
        &self,
        wallet: &Wallet,
        amount_sat: u64,
        memo: &str,
    ) -> Result<CreatedInvoice>;

    async fn get_payment_status(&self, wallet: &Wallet, payment_hash: &str)
        -> Result<PaymentStatus>;

    async fn pay_invoice(&self, wallet: &Wallet, bolt11: &str) -> Result<PaymentAck>;

    async fn list_payments(&self, wallet: &Wallet, include_pending: bool)
        -> Result<Vec<RawPayment>>;
}

/// Error body returned by the payments API
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    detail: Option<String>,
    message: Option<String>,
}

/// JSON-over-HTTP client for an LNbits compatible payments API
#[derive(Debug, Clone)]
pub struct LnbitsClient {
    client: Client,
    base_url: Url,
}

impl LnbitsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API url: {}", base_url))?;

        match base_url.scheme() {
            "http" | "https" => {}
            scheme => return Err(anyhow!("Unsupported URL scheme: {}", scheme)),
        }

        // Keep a trailing slash so joins stay below any path prefix
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch the wallet summary, including the server-side balance
    #[instrument(skip(self, wallet), fields(wallet_id = %wallet.id))]
    pub async fn wallet_details(&self, wallet: &Wallet) -> Result<WalletDetails> {
        let response = self
            .request(Method::GET, "api/v1/wallet", &wallet.invoice_key)?
            .send()
            .await?;

        let details: WalletDetails = Self::parse(response).await?;
        debug!(balance_msat = details.balance, "Wallet details fetched");
        Ok(details)
    }

    fn request(&self, method: Method, path: &str, api_key: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(path)?;
        Ok(self
            .client
            .request(method, url)
            .header(API_KEY_HEADER, api_key))
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .context("Unexpected response body");
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.detail.or(b.message))
            .unwrap_or(body);

        Err(anyhow!("{}: {}", status, detail))
    }
}

#[async_trait]
impl PaymentRepository for LnbitsClient {
    #[instrument(skip(self, wallet), fields(wallet_id = %wallet.id))]
    async fn create_invoice(
        &self,
        wallet: &Wallet,
        amount_sat: u64,
        memo: &str,
    ) -> Result<CreatedInvoice> {
        let response = self
            .request(Method::POST, "api/v1/payments", &wallet.invoice_key)?
            .json(&json!({ "out": false, "amount": amount_sat, "memo": memo }))
            .send()
            .await?;

        let invoice: CreatedInvoice = Self::parse(response).await?;
        debug!(
            payment_hash = %invoice.payment_hash,
            invoice = %sanitize_invoice(&invoice.payment_request),
            "Invoice created"
        );
        Ok(invoice)
    }

    async fn get_payment_status(
        &self,
        wallet: &Wallet,
        payment_hash: &str,
    ) -> Result<PaymentStatus> {
        let path = format!("api/v1/payments/{}", payment_hash);
        let response = self
            .request(Method::GET, &path, &wallet.invoice_key)?
            .send()
            .await?;

        Self::parse(response).await
    }

    #[instrument(skip(self, wallet, bolt11), fields(wallet_id = %wallet.id, invoice = %sanitize_invoice(bolt11)))]
    async fn pay_invoice(&self, wallet: &Wallet, bolt11: &str) -> Result<PaymentAck> {
        let admin_key = wallet
            .admin_key
            .as_deref()
            .ok_or_else(|| anyhow!("Wallet admin key required to pay invoices"))?;

        let response = self
            .request(Method::POST, "api/v1/payments", admin_key)?
            .json(&json!({ "out": true, "bolt11": bolt11 }))
            .send()
            .await?;

        Self::parse(response).await
    }

    #[instrument(skip(self, wallet), fields(wallet_id = %wallet.id))]
    async fn list_payments(
        &self,
        wallet: &Wallet,
        include_pending: bool,
    ) -> Result<Vec<RawPayment>> {
        let response = self
            .request(Method::GET, "api/v1/payments", &wallet.invoice_key)?
            .query(&[("check_pending", include_pending)])
            .send()
            .await?;

        let payments: Vec<RawPayment> = Self::parse(response).await?;
        debug!(payment_count = payments.len(), "Payments fetched");
        Ok(payments)
    }
}
