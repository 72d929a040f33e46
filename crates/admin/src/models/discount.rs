//! Discount codes.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;

use pharmacy_core::{DiscountCodeId, DiscountKind, Money};

use super::validation::{ValidationError, optional};

#[derive(Debug, Clone)]
pub struct DiscountCode {
    pub id: DiscountCodeId,
    pub code: String,
    pub kind: DiscountKind,
    /// Percent for `Percentage`, currency amount for `FixedAmount`.
    pub value: Decimal,
    pub min_order_total: Option<Money>,
    pub max_uses: Option<i32>,
    pub times_used: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl DiscountCode {
    /// Active, inside its window, and under its usage cap.
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at.is_none_or(|s| s <= now)
            && self.expires_at.is_none_or(|e| now < e)
            && self.max_uses.is_none_or(|max| self.times_used < max)
    }

    /// `"15%"` or `"$5.00"`.
    #[must_use]
    pub fn value_label(&self) -> String {
        match self.kind {
            DiscountKind::Percentage => format!("{}%", self.value.normalize()),
            DiscountKind::FixedAmount => Money::new(self.value).to_string(),
        }
    }
}

/// Filters for the discounts table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DiscountFilter {
    pub search: Option<String>,
    pub active: Option<bool>,
}

/// Normalize a code to uppercase and check its shape.
///
/// # Errors
///
/// Returns a `ValidationError` unless the code is 3 to 32 characters of
/// `A-Z`, `0-9`, `_` or `-`.
pub fn normalize_code(raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim().to_uppercase();
    let len = code.chars().count();
    if !(3..=32).contains(&len) {
        return Err(ValidationError::new("code", "must be 3 to 32 characters"));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(ValidationError::new(
            "code",
            "may only contain letters, digits, '_' and '-'",
        ));
    }
    Ok(code)
}

/// Raw discount form.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct DiscountForm {
    pub code: String,
    pub kind: String,
    pub value: String,
    #[serde(default)]
    pub min_order_total: Option<String>,
    #[serde(default)]
    pub max_uses: Option<String>,
    /// `datetime-local` input, interpreted as UTC.
    #[serde(default)]
    pub starts_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub is_active: Option<String>,
}

/// Validated discount fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountInput {
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_order_total: Option<Money>,
    pub max_uses: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl DiscountForm {
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<DiscountInput, ValidationError> {
        let code = normalize_code(&self.code)?;
        let kind: DiscountKind = self
            .kind
            .parse()
            .map_err(|_| ValidationError::new("kind", "is not a valid discount type"))?;

        let value = Money::parse(&self.value)
            .map(|m| m.amount())
            .ok_or_else(|| ValidationError::new("value", "must be a number"))?;
        match kind {
            DiscountKind::Percentage if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED => {
                return Err(ValidationError::new("value", "must be between 0 and 100"));
            }
            DiscountKind::FixedAmount if value <= Decimal::ZERO => {
                return Err(ValidationError::new("value", "must be greater than 0"));
            }
            _ => {}
        }

        let min_order_total = optional(self.min_order_total.as_deref())
            .map(|v| {
                Money::parse(&v)
                    .ok_or_else(|| ValidationError::new("min_order_total", "must be a valid amount"))
            })
            .transpose()?;

        let max_uses = optional(self.max_uses.as_deref())
            .map(|v| {
                v.parse::<i32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| ValidationError::new("max_uses", "must be a positive number"))
            })
            .transpose()?;

        let starts_at = parse_datetime("starts_at", self.starts_at.as_deref())?;
        let expires_at = parse_datetime("expires_at", self.expires_at.as_deref())?;
        if let (Some(start), Some(end)) = (starts_at, expires_at)
            && end <= start
        {
            return Err(ValidationError::new("expires_at", "must be after the start date"));
        }

        Ok(DiscountInput {
            code,
            kind,
            value,
            min_order_total,
            max_uses,
            starts_at,
            expires_at,
            is_active: self.is_active.is_some(),
        })
    }
}

/// Parse an HTML `datetime-local` value (or a bare date) as UTC.
fn parse_datetime(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, ValidationError> {
    let Some(value) = optional(value) else {
        return Ok(None);
    };
    NaiveDateTime::parse_from_str(&value, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(&value, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map(|naive| Some(naive.and_utc()))
        .map_err(|_| ValidationError::new(field, "is not a valid date"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn form(kind: &str, value: &str) -> DiscountForm {
        DiscountForm {
            code: " spring-10 ".to_string(),
            kind: kind.to_string(),
            value: value.to_string(),
            is_active: Some("on".to_string()),
            ..DiscountForm::default()
        }
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code(" welcome_5 ").unwrap(), "WELCOME_5");
        assert!(normalize_code("ab").is_err());
        assert!(normalize_code(&"A".repeat(33)).is_err());
        assert!(normalize_code("NO SPACES").is_err());
    }

    #[test]
    fn test_percentage_bounds() {
        assert!(form("percentage", "100").validate().is_ok());
        assert!(form("percentage", "0").validate().is_err());
        assert!(form("percentage", "100.01").validate().is_err());
    }

    #[test]
    fn test_fixed_amount_must_be_positive() {
        let input = form("fixed_amount", "5").validate().unwrap();
        assert_eq!(input.code, "SPRING-10");
        assert_eq!(input.kind, DiscountKind::FixedAmount);
        assert!(input.is_active);
        assert!(form("fixed_amount", "0").validate().is_err());
        assert!(form("bogus", "5").validate().is_err());
    }

    #[test]
    fn test_expiry_must_follow_start() {
        let mut f = form("percentage", "10");
        f.starts_at = Some("2026-04-01T00:00".to_string());
        f.expires_at = Some("2026-03-01T00:00".to_string());
        assert_eq!(f.validate().unwrap_err().field, "expires_at");

        f.expires_at = Some("2026-05-01".to_string());
        let input = f.validate().unwrap();
        assert_eq!(
            input.expires_at,
            Some(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_is_usable() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let mut code = DiscountCode {
            id: DiscountCodeId::new(1),
            code: "SPRING".to_string(),
            kind: DiscountKind::Percentage,
            value: Decimal::new(15, 0),
            min_order_total: None,
            max_uses: Some(2),
            times_used: 1,
            starts_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()),
            expires_at: Some(Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()),
            is_active: true,
            created_at: now,
        };
        assert!(code.is_usable(now));
        assert_eq!(code.value_label(), "15%");

        code.times_used = 2;
        assert!(!code.is_usable(now));

        code.times_used = 0;
        code.is_active = false;
        assert!(!code.is_usable(now));

        code.is_active = true;
        assert!(!code.is_usable(Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()));
    }
}
