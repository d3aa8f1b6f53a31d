use {
    super::error::GatewayError,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Payment amount in minor units (cents, 分). Always strictly positive —
/// a zero-amount payment or refund is rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub fn new(minor_units: i64) -> Result<Self, GatewayError> {
        if minor_units <= 0 {
            return Err(GatewayError::Validation(format!(
                "amount must be positive, got: {minor_units}"
            )));
        }
        Ok(Self(minor_units))
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Total for `unit_amount × quantity` order lines.
    pub fn from_unit(unit_amount: i64, quantity: i64) -> Result<Self, GatewayError> {
        let total = unit_amount.checked_mul(quantity).ok_or_else(|| {
            GatewayError::Validation(format!(
                "amount overflow: {unit_amount} x {quantity}"
            ))
        })?;
        Self::new(total)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Cny,
    Hkd,
    Krw,
    Thb,
    Eur,
    Gbp,
    Jpy,
    Inr,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Cny => "CNY",
            Self::Hkd => "HKD",
            Self::Krw => "KRW",
            Self::Thb => "THB",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Jpy => "JPY",
            Self::Inr => "INR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Currency {
    type Error = GatewayError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "USD" => Ok(Self::Usd),
            "CNY" => Ok(Self::Cny),
            "HKD" => Ok(Self::Hkd),
            "KRW" => Ok(Self::Krw),
            "THB" => Ok(Self::Thb),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            "JPY" => Ok(Self::Jpy),
            "INR" => Ok(Self::Inr),
            other => Err(GatewayError::Validation(format!(
                "unknown currency: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_rejects_zero_and_negative() {
        assert!(Amount::new(0).is_err());
        assert!(Amount::new(-1).is_err());
        assert_eq!(Amount::new(1).unwrap().minor_units(), 1);
    }

    #[test]
    fn amount_from_unit_multiplies() {
        assert_eq!(Amount::from_unit(1000, 2).unwrap().minor_units(), 2000);
        assert!(Amount::from_unit(0, 5).is_err());
        assert!(Amount::from_unit(i64::MAX, 2).is_err());
    }

    #[test]
    fn currency_roundtrip() {
        for c in [
            Currency::Usd,
            Currency::Cny,
            Currency::Hkd,
            Currency::Krw,
            Currency::Thb,
            Currency::Eur,
            Currency::Gbp,
            Currency::Jpy,
            Currency::Inr,
        ] {
            assert_eq!(Currency::try_from(c.as_str()).unwrap(), c);
        }
        assert!(Currency::try_from("usd").is_err());
    }
}
