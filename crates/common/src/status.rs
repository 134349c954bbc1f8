//! Payment and fulfillment state machines.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A status string that matches no known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

/// Payment state of an order, driven by the gateway callback.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Completed
///           └──► Failed ──► Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// Gateway transaction created, no verified payment yet.
    #[default]
    Pending,

    /// Signature verified. Never downgraded.
    Completed,

    /// Verification failed or the client reported a failure. A retried
    /// payment can still complete.
    Failed,
}

impl PaymentStatus {
    /// Returns the states from which `target` may be entered.
    pub fn sources_for(target: PaymentStatus) -> &'static [PaymentStatus] {
        match target {
            PaymentStatus::Pending => &[],
            PaymentStatus::Completed => &[PaymentStatus::Pending, PaymentStatus::Failed],
            PaymentStatus::Failed => &[PaymentStatus::Pending],
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(PaymentStatus::Pending),
            "Completed" => Ok(PaymentStatus::Completed),
            "Failed" => Ok(PaymentStatus::Failed),
            other => Err(UnknownStatus {
                kind: "payment",
                value: other.to_string(),
            }),
        }
    }
}

/// Fulfillment state of an order, driven by the owning store.
///
/// State transitions:
/// ```text
/// pending ──┬──► approved ──► preparing ──► Shipped ──► delivered ──► Return Initiated
///           │        └──────────────────────►┘
///           ├──► cancelled ──► rejected
///           └──► rejected
/// ```
///
/// The serialized names keep the mixed casing clients already depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FulfillmentStatus {
    #[default]
    #[serde(rename = "pending")]
    Pending,

    #[serde(rename = "approved")]
    Approved,

    #[serde(rename = "rejected")]
    Rejected,

    #[serde(rename = "cancelled")]
    Cancelled,

    #[serde(rename = "preparing")]
    Preparing,

    #[serde(rename = "Shipped")]
    Shipped,

    #[serde(rename = "delivered")]
    Delivered,

    #[serde(rename = "Return Initiated")]
    ReturnInitiated,
}

impl FulfillmentStatus {
    /// Returns true if the store has accepted the order at some point.
    pub fn is_approved_or_later(&self) -> bool {
        matches!(
            self,
            FulfillmentStatus::Approved
                | FulfillmentStatus::Preparing
                | FulfillmentStatus::Shipped
                | FulfillmentStatus::Delivered
                | FulfillmentStatus::ReturnInitiated
        )
    }

    /// Returns true if the order can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        matches!(self, FulfillmentStatus::Pending)
    }

    /// Returns true if the order can be rejected in this state.
    pub fn can_reject(&self) -> bool {
        !self.is_approved_or_later() && *self != FulfillmentStatus::Rejected
    }

    /// Returns true if the order can be approved in this state.
    pub fn can_approve(&self) -> bool {
        matches!(self, FulfillmentStatus::Pending)
    }

    /// Returns true if preparation can start in this state.
    pub fn can_start_preparing(&self) -> bool {
        matches!(self, FulfillmentStatus::Approved)
    }

    /// Returns true if the order can be handed to a courier in this state.
    pub fn can_ship(&self) -> bool {
        matches!(
            self,
            FulfillmentStatus::Approved | FulfillmentStatus::Preparing
        )
    }

    /// Returns true if the order can be marked delivered in this state.
    pub fn can_deliver(&self) -> bool {
        matches!(self, FulfillmentStatus::Shipped)
    }

    /// Returns true if a return can be requested in this state.
    pub fn can_initiate_return(&self) -> bool {
        matches!(self, FulfillmentStatus::Delivered)
    }

    /// Returns true if an order in this state may move to `next`.
    pub fn can_transition_to(&self, next: FulfillmentStatus) -> bool {
        match next {
            FulfillmentStatus::Pending => false,
            FulfillmentStatus::Approved => self.can_approve(),
            FulfillmentStatus::Rejected => self.can_reject(),
            FulfillmentStatus::Cancelled => self.can_cancel(),
            FulfillmentStatus::Preparing => self.can_start_preparing(),
            FulfillmentStatus::Shipped => self.can_ship(),
            FulfillmentStatus::Delivered => self.can_deliver(),
            FulfillmentStatus::ReturnInitiated => self.can_initiate_return(),
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "pending",
            FulfillmentStatus::Approved => "approved",
            FulfillmentStatus::Rejected => "rejected",
            FulfillmentStatus::Cancelled => "cancelled",
            FulfillmentStatus::Preparing => "preparing",
            FulfillmentStatus::Shipped => "Shipped",
            FulfillmentStatus::Delivered => "delivered",
            FulfillmentStatus::ReturnInitiated => "Return Initiated",
        }
    }
}

impl std::fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FulfillmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FulfillmentStatus::Pending),
            "approved" => Ok(FulfillmentStatus::Approved),
            "rejected" => Ok(FulfillmentStatus::Rejected),
            "cancelled" => Ok(FulfillmentStatus::Cancelled),
            "preparing" => Ok(FulfillmentStatus::Preparing),
            "Shipped" => Ok(FulfillmentStatus::Shipped),
            "delivered" => Ok(FulfillmentStatus::Delivered),
            "Return Initiated" => Ok(FulfillmentStatus::ReturnInitiated),
            other => Err(UnknownStatus {
                kind: "fulfillment",
                value: other.to_string(),
            }),
        }
    }
}
