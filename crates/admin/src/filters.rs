//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

use pharmacy_core::OrderStatus;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Up to two uppercase initials for the avatar badge.
///
/// Usage in templates: `{{ admin_user.name|initials }}`
#[askama::filter_fn]
pub fn initials(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(initials_of(&value.to_string()))
}

/// Badge classes for an order status.
///
/// Usage in templates: `<span class="{{ order.status|status_badge }}">`
#[askama::filter_fn]
pub fn status_badge(value: impl Display, _env: &dyn askama::Values) -> askama::Result<&'static str> {
    Ok(value
        .to_string()
        .parse::<OrderStatus>()
        .map_or("badge badge-gray", badge_class))
}

const fn badge_class(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "badge badge-amber",
        OrderStatus::Processing => "badge badge-blue",
        OrderStatus::Shipped => "badge badge-indigo",
        OrderStatus::Delivered => "badge badge-green",
        OrderStatus::Cancelled => "badge badge-gray",
    }
}

fn initials_of(name: &str) -> String {
    let initials: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect();
    if initials.is_empty() { "?".to_string() } else { initials }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initials_of() {
        assert_eq!(initials_of("Dana Scully"), "DS");
        assert_eq!(initials_of("ada lovelace byron"), "AL");
        assert_eq!(initials_of("  "), "?");
    }

    #[test]
    fn test_every_status_has_a_badge() {
        for status in OrderStatus::ALL {
            assert!(badge_class(status).starts_with("badge "));
        }
        assert_eq!(badge_class(OrderStatus::Delivered), "badge badge-green");
    }
}
