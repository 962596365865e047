// 🛒 Checkout Redirect - Prefilled URL for the external checkout page

use serde::{Deserialize, Serialize};

use crate::subscription::Plan;

/// Checkout page per plan; a plan without a URL cannot be sold
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutUrls {
    pub monthly: Option<String>,
    pub quarterly: Option<String>,
    pub annual: Option<String>,
}

impl CheckoutUrls {
    pub fn for_plan(&self, plan: Plan) -> Option<&str> {
        match plan {
            Plan::Monthly => self.monthly.as_deref(),
            Plan::Quarterly => self.quarterly.as_deref(),
            Plan::Annual => self.annual.as_deref(),
        }
    }
}

/// Customer data used to prefill the checkout form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    /// Our user id, echoed back by the provider in webhooks
    #[serde(default)]
    pub user_id: String,
}

/// Append the request as query parameters to `base`
pub fn checkout_url(base: &str, request: &CheckoutRequest) -> String {
    let phone: String = request.phone.chars().filter(|c| c.is_ascii_digit()).collect();

    let params: Vec<String> = [
        ("name", request.name.trim()),
        ("email", request.email.trim()),
        ("phone", phone.as_str()),
        ("external_reference", request.user_id.trim()),
    ]
    .iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
    .collect();

    if params.is_empty() {
        return base.to_string();
    }

    let separator = if !base.contains('?') {
        "?"
    } else if base.ends_with('?') || base.ends_with('&') {
        ""
    } else {
        "&"
    };

    format!("{}{}{}", base, separator, params.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            name: "Ana Souza".to_string(),
            email: "ana+fin@example.com".to_string(),
            phone: "(11) 99999-0000".to_string(),
            user_id: "user-1".to_string(),
        }
    }

    #[test]
    fn test_builds_encoded_query() {
        let url = checkout_url("https://pay.example.com/c/abc", &request());
        assert_eq!(
            url,
            "https://pay.example.com/c/abc?name=Ana%20Souza&email=ana%2Bfin%40example.com&phone=11999990000&external_reference=user-1"
        );
    }

    #[test]
    fn test_appends_to_existing_query() {
        let url = checkout_url("https://pay.example.com/c/abc?coupon=X", &request());
        assert!(url.starts_with("https://pay.example.com/c/abc?coupon=X&name=Ana%20Souza"));
    }

    #[test]
    fn test_skips_empty_values() {
        let partial = CheckoutRequest {
            email: "ana@example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(
            checkout_url("https://pay.example.com/c/abc", &partial),
            "https://pay.example.com/c/abc?email=ana%40example.com"
        );
        assert_eq!(
            checkout_url("https://pay.example.com/c/abc", &CheckoutRequest::default()),
            "https://pay.example.com/c/abc"
        );
    }

    #[test]
    fn test_urls_per_plan() {
        let urls = CheckoutUrls {
            monthly: Some("https://pay.example.com/m".to_string()),
            quarterly: None,
            annual: Some("https://pay.example.com/a".to_string()),
        };
        assert_eq!(urls.for_plan(Plan::Annual), Some("https://pay.example.com/a"));
        assert_eq!(urls.for_plan(Plan::Quarterly), None);
    }
}
