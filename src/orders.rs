//! Order records as read from the backend, and their normalization.
//!
//! Only two order types reach the kitchen plan: formula menu orders and
//! special cart orders. Their `details` payload is repaired here once, so the
//! resolver and cart aggregator downstream only ever see [`Details`].

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::details::{decode_details, Details, RawDetails};

/// Status tags stored by the backend for orders still in the kitchen.
/// Used verbatim in remote `status=in.(...)` filters.
pub const IN_PRODUCTION_STATUS_TAGS: &[&str] = &[
    "EN_ATTENTE_PREPARATION",
    "EN_ATTENTE",
    "EN_PREPARATION",
    "PRETE_A_LIVRER",
    "PRET_A_LIVRER",
    "AWAITING_PREP",
    "IN_PREP",
    "READY_FOR_DELIVERY",
];

/// One order row, as received. Nothing here is trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(
        rename = "type",
        alias = "order_type",
        alias = "orderType",
        default,
        deserialize_with = "lenient_string"
    )]
    pub order_type: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(default, alias = "requestDate")]
    pub request_date: Option<String>,
    #[serde(default, alias = "businessUnit")]
    pub business_unit: Option<String>,
    #[serde(default)]
    pub details: Value,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

impl OrderRecord {
    pub fn kind(&self) -> OrderKind {
        OrderKind::from_tag(&self.order_type)
    }

    pub fn status(&self) -> OrderStatus {
        OrderStatus::from_tag(&self.status)
    }

    /// Calendar day the order is due, read from the first ten characters of
    /// `request_date` so full timestamps work too.
    pub fn request_day(&self) -> Option<NaiveDate> {
        let raw = self.request_date.as_deref()?.trim();
        let day = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    FormulaMenu,
    SpecialCart,
    Other(String),
}

impl OrderKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "COMMANDE_MENU" | "FORMULA_MENU_ORDER" => Self::FormulaMenu,
            "COMMANDE_SPECIALE" | "SPECIAL_CART_ORDER" => Self::SpecialCart,
            _ => Self::Other(tag.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    AwaitingPrep,
    InPrep,
    ReadyForDelivery,
    Other(String),
}

impl OrderStatus {
    pub fn from_tag(tag: &str) -> Self {
        let normalized: String = tag
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        match normalized.as_str() {
            "AWAITING_PREP" | "EN_ATTENTE_PREPARATION" | "EN_ATTENTE" => Self::AwaitingPrep,
            "IN_PREP" | "EN_PREPARATION" => Self::InPrep,
            "READY_FOR_DELIVERY" | "PRETE_A_LIVRER" | "PRET_A_LIVRER" => Self::ReadyForDelivery,
            _ => Self::Other(tag.trim().to_string()),
        }
    }

    pub fn is_in_production(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// Which request dates a consolidation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateRange {
    #[default]
    Any,
    Day {
        date: NaiveDate,
    },
    Between {
        from: NaiveDate,
        to: NaiveDate,
    },
}

impl DateRange {
    /// Inclusive range; reversed bounds are swapped.
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        if from <= to {
            Self::Between { from, to }
        } else {
            Self::Between { from: to, to: from }
        }
    }

    /// Build a range from optional `date` / `from` / `to` inputs.
    pub fn from_parts(
        date: Option<NaiveDate>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Self, String> {
        match (date, from, to) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                Err("Use either a single date or a from/to range, not both".into())
            }
            (Some(day), None, None) => Ok(Self::Day { date: day }),
            (None, Some(from), Some(to)) => Ok(Self::between(from, to)),
            (None, Some(_), None) | (None, None, Some(_)) => {
                Err("A date range needs both from and to".into())
            }
            (None, None, None) => Ok(Self::Any),
        }
    }

    /// First and last day covered, if bounded.
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        match *self {
            Self::Any => None,
            Self::Day { date } => Some((date, date)),
            Self::Between { from, to } => Some((from, to)),
        }
    }

    pub fn contains(&self, day: Option<NaiveDate>) -> bool {
        match (self.bounds(), day) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some((from, to)), Some(day)) => from <= day && day <= to,
        }
    }

    pub fn label(&self) -> String {
        match *self {
            Self::Any => "toutes dates".to_string(),
            Self::Day { date } => date.format("%d/%m/%Y").to_string(),
            Self::Between { from, to } => format!(
                "du {} au {}",
                from.format("%d/%m/%Y"),
                to.format("%d/%m/%Y")
            ),
        }
    }
}

/// Selection applied before consolidation: in-production status, business
/// unit and request date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    pub business_unit: Option<String>,
    pub date: DateRange,
}

impl OrderFilter {
    pub fn matches(&self, order: &OrderRecord) -> bool {
        if !order.status().is_in_production() {
            return false;
        }
        if let Some(unit) = self.business_unit.as_deref() {
            if order.business_unit.as_deref().map(str::trim) != Some(unit.trim()) {
                return false;
            }
        }
        self.date.contains(order.request_day())
    }
}

/// An order ready for the resolver or the cart aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedOrder {
    pub id: String,
    pub kind: OrderKind,
    pub details: Details,
    /// The payload could not be repaired and a fallback is in use.
    pub degraded: bool,
}

/// Repair an order's payload. Orders of any other type are excluded.
pub fn normalize(order: &OrderRecord) -> Option<NormalizedOrder> {
    let kind = order.kind();
    if let OrderKind::Other(tag) = &kind {
        debug!(order_id = %order.id, order_type = %tag, "order type not consolidated");
        return None;
    }

    let (details, degraded) = match decode_details(RawDetails::classify(&order.details)) {
        Ok(details) => (details, false),
        Err(err) => {
            warn!(order_id = %order.id, error = %err, "order details could not be repaired");
            (err.fallback(), true)
        }
    };

    Some(NormalizedOrder {
        id: order.id.clone(),
        kind,
        details,
        degraded,
    })
}
