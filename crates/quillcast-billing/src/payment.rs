//! Client for the subscription/checkout API (Stripe-compatible,
//! form-encoded bodies, bearer secret key).

use std::time::Duration;

use quillcast_db::{BillingProfileUpdate, LedgerStore};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::BillingError;

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub trial_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

pub struct PaymentClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl PaymentClient {
    /// # Errors
    ///
    /// Returns [`BillingError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(api_key: Option<&str>, timeout_secs: u64) -> Result<Self, BillingError> {
        Self::with_base_url(api_key, timeout_secs, DEFAULT_BASE_URL)
    }

    /// # Errors
    ///
    /// Returns [`BillingError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn with_base_url(
        api_key: Option<&str>,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, BillingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("quillcast/0.1 (billing)")
            .build()?;

        Ok(Self {
            client,
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_owned),
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// # Errors
    ///
    /// Returns [`BillingError`] on missing key, transport failure, a non-2xx
    /// status, or an unexpected body.
    pub async fn create_customer(
        &self,
        email: &str,
        user_id: Uuid,
    ) -> Result<Customer, BillingError> {
        let user_id = user_id.to_string();
        self.send(
            Method::POST,
            "/v1/customers",
            &[("email", email), ("metadata[user_id]", user_id.as_str())],
        )
        .await
    }

    /// # Errors
    ///
    /// Returns [`BillingError`] on missing key, transport failure, a non-2xx
    /// status, or an unexpected body.
    pub async fn create_subscription_with_trial(
        &self,
        customer_id: &str,
        price_id: &str,
        trial_days: u32,
    ) -> Result<Subscription, BillingError> {
        let trial_days = trial_days.to_string();
        self.send(
            Method::POST,
            "/v1/subscriptions",
            &[
                ("customer", customer_id),
                ("items[0][price]", price_id),
                ("trial_period_days", trial_days.as_str()),
            ],
        )
        .await
    }

    /// # Errors
    ///
    /// Returns [`BillingError`] on missing key, transport failure, a non-2xx
    /// status, or an unexpected body.
    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Subscription, BillingError> {
        self.send(
            Method::DELETE,
            &format!("/v1/subscriptions/{subscription_id}"),
            &[],
        )
        .await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T, BillingError> {
        let api_key = self.api_key.as_deref().ok_or(BillingError::MissingApiKey)?;
        let url = format!("{}{path}", self.base_url);

        let mut request = self.client.request(method, &url).bearer_auth(api_key);
        if !form.is_empty() {
            request = request.form(form);
        }
        let response = request.send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or(body);
            return Err(BillingError::Payment {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| BillingError::Deserialize {
            context: path.to_string(),
            source: e,
        })
    }
}

/// The user's payment customer id, creating the customer and storing the id
/// on the billing profile the first time.
///
/// # Errors
///
/// Returns [`BillingError`] if the profile cannot be read or written, or the
/// customer cannot be created.
pub async fn ensure_customer(
    ledger: &dyn LedgerStore,
    client: &PaymentClient,
    user_id: Uuid,
    email: &str,
) -> Result<String, BillingError> {
    if let Some(existing) = ledger
        .billing_profile(user_id)
        .await?
        .and_then(|p| p.payment_customer_id)
    {
        return Ok(existing);
    }

    let customer = client.create_customer(email, user_id).await?;
    ledger
        .upsert_billing_profile(
            user_id,
            &BillingProfileUpdate {
                email: Some(email.to_string()),
                payment_customer_id: Some(customer.id.clone()),
                ..BillingProfileUpdate::default()
            },
        )
        .await?;
    tracing::info!(%user_id, customer_id = %customer.id, "payment customer created");
    Ok(customer.id)
}

/// Create (or reuse) the user's customer and start a trial subscription on
/// `price_id`. The subscription id and status are stored on the profile.
///
/// # Errors
///
/// Returns [`BillingError`] if the customer or subscription cannot be
/// created, or the profile cannot be written.
pub async fn start_trial(
    ledger: &dyn LedgerStore,
    client: &PaymentClient,
    user_id: Uuid,
    email: &str,
    price_id: &str,
    trial_days: u32,
) -> Result<Subscription, BillingError> {
    let customer_id = ensure_customer(ledger, client, user_id, email).await?;
    let subscription = client
        .create_subscription_with_trial(&customer_id, price_id, trial_days)
        .await?;
    store_subscription(ledger, user_id, &subscription).await?;
    tracing::info!(
        %user_id,
        subscription_id = %subscription.id,
        status = %subscription.status,
        trial_days,
        "trial subscription started"
    );
    Ok(subscription)
}

/// Cancel the subscription stored on the user's profile.
///
/// # Errors
///
/// Returns [`BillingError::NoSubscription`] when the profile has none, or
/// [`BillingError`] if the cancellation or profile write fails.
pub async fn cancel_user_subscription(
    ledger: &dyn LedgerStore,
    client: &PaymentClient,
    user_id: Uuid,
) -> Result<Subscription, BillingError> {
    let subscription_id = ledger
        .billing_profile(user_id)
        .await?
        .and_then(|p| p.subscription_id)
        .ok_or(BillingError::NoSubscription(user_id))?;
    let subscription = client.cancel_subscription(&subscription_id).await?;
    store_subscription(ledger, user_id, &subscription).await?;
    tracing::info!(%user_id, subscription_id = %subscription.id, "subscription cancelled");
    Ok(subscription)
}

async fn store_subscription(
    ledger: &dyn LedgerStore,
    user_id: Uuid,
    subscription: &Subscription,
) -> Result<(), BillingError> {
    ledger
        .upsert_billing_profile(
            user_id,
            &BillingProfileUpdate {
                subscription_id: Some(subscription.id.clone()),
                subscription_status: Some(subscription.status.clone()),
                ..BillingProfileUpdate::default()
            },
        )
        .await?;
    Ok(())
}
