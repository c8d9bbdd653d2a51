use url::Url;

use crate::utils::{constants::PAYMENT_RETURN_PARAMS, error::EntitlementError};

/// What the client knows about the page it just landed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationContext {
    url: Url,
}

impl NavigationContext {
    pub fn parse(location: &str) -> Result<Self, EntitlementError> {
        let url = Url::parse(location).map_err(|e| {
            EntitlementError::Config(format!("invalid location {}: {}", location, e))
        })?;
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// True when the checkout flow sent the user back after paying.
    pub fn payment_completed(&self) -> bool {
        self.url.query_pairs().any(|(key, value)| {
            PAYMENT_RETURN_PARAMS
                .iter()
                .any(|(k, v)| key.eq_ignore_ascii_case(k) && value.eq_ignore_ascii_case(v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_payment_return() {
        let nav = NavigationContext::parse("https://app.example/lessons?payment=success").unwrap();
        assert!(nav.payment_completed());
        let nav = NavigationContext::parse("https://app.example/?checkout=SUCCESS&x=1").unwrap();
        assert!(nav.payment_completed());
    }

    #[test]
    fn ordinary_navigation_is_not_a_payment() {
        let nav = NavigationContext::parse("https://app.example/lessons?payment=canceled").unwrap();
        assert!(!nav.payment_completed());
        let nav = NavigationContext::parse("https://app.example/lessons").unwrap();
        assert!(!nav.payment_completed());
    }

    #[test]
    fn relative_locations_are_rejected() {
        assert!(NavigationContext::parse("/lessons?payment=success").is_err());
    }
}
