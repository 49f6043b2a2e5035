use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A product offered by the merchant agent.
///
/// Identity is by name within one result set; the backend does not hand out stable keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    #[serde(
        serialize_with = "rust_decimal::serde::float::serialize",
        deserialize_with = "deserialize_price"
    )]
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
}

fn deserialize_price<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let price = rust_decimal::serde::float::deserialize(deserializer)?;
    if price < Decimal::ZERO {
        return Err(serde::de::Error::custom("price must not be negative"));
    }
    Ok(price)
}

impl Product {
    /// Creates a product with no brand or merchant.
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            price,
            brand: None,
            merchant: None,
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant = Some(merchant.into());
        self
    }
}

/// Body of `POST /update-product`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateProductRequest {
    pub product_id: String,
    pub name: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub price: Decimal,
    pub currency: String,
    pub description: String,
    pub brand: String,
    pub merchant: String,
}

impl UpdateProductRequest {
    /// Builds the cart update for `product`, filling gaps with the configured defaults.
    pub fn new(product: &Product, currency: &str, default_merchant: &str) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            product_id: format!("prod_{}", &id[..7]),
            name: product.name.clone(),
            price: product.price,
            currency: currency.to_string(),
            description: String::new(),
            brand: product.brand.clone().unwrap_or_default(),
            merchant: product
                .merchant
                .clone()
                .unwrap_or_else(|| default_merchant.to_string()),
        }
    }
}
