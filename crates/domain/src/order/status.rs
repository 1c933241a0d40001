//! Lifecycle state machines of the canonical order.
//!
//! The marketplace-reported status and the ERP-side status evolve
//! independently; each has its own enum and transition rules.

use serde::{Deserialize, Serialize};

/// Who ships the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentMode {
    /// Shipped by the marketplace's fulfillment network (e.g. FBA).
    ChannelFulfilled,
    /// Shipped from the seller's own warehouse (e.g. FBM).
    SellerFulfilled,
}

impl FulfillmentMode {
    /// Prefix used when deriving the ERP order name.
    pub fn order_name_prefix(&self) -> &'static str {
        match self {
            FulfillmentMode::ChannelFulfilled => "FBA",
            FulfillmentMode::SellerFulfilled => "FBM",
        }
    }
}

impl std::fmt::Display for FulfillmentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FulfillmentMode::ChannelFulfilled => write!(f, "channel-fulfilled"),
            FulfillmentMode::SellerFulfilled => write!(f, "seller-fulfilled"),
        }
    }
}

/// Marketplace-reported order status.
///
/// ```text
/// Pending ──► Unshipped ──► PartiallyShipped ──► Shipped
///     │           │                │
///     └───────────┴────────────────┴──► Canceled
/// ```
///
/// Status never regresses; the only sideways move is an explicit
/// cancellation from any non-shipped state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MarketplaceStatus {
    /// Payment not yet cleared; no address or lines available yet.
    #[default]
    Pending,
    /// Paid, awaiting shipment.
    Unshipped,
    /// Some but not all items shipped.
    PartiallyShipped,
    /// Fully shipped (terminal).
    Shipped,
    /// Canceled on the marketplace (terminal).
    Canceled,
}

impl MarketplaceStatus {
    /// Monotonic rank used to reject regressions.
    fn rank(&self) -> u8 {
        match self {
            MarketplaceStatus::Pending => 0,
            MarketplaceStatus::Unshipped => 1,
            MarketplaceStatus::PartiallyShipped => 2,
            MarketplaceStatus::Shipped => 3,
            // Canceled is terminal but not ordered against the ship states.
            MarketplaceStatus::Canceled => 4,
        }
    }

    /// Returns true if a reported transition to `next` is acceptable.
    ///
    /// Forward moves and same-state repeats are fine; cancellation is
    /// accepted from any state except `Shipped` (the marketplace never
    /// un-ships), and nothing leaves `Canceled`.
    pub fn can_become(&self, next: MarketplaceStatus) -> bool {
        match (self, next) {
            (a, b) if *a == b => true,
            (MarketplaceStatus::Canceled, _) => false,
            (MarketplaceStatus::Shipped, MarketplaceStatus::Canceled) => false,
            (_, MarketplaceStatus::Canceled) => true,
            (a, b) => b.rank() > a.rank(),
        }
    }

    /// Returns true if the order is reported shipped (fully).
    pub fn is_shipped(&self) -> bool {
        matches!(self, MarketplaceStatus::Shipped)
    }

    /// Returns true for terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MarketplaceStatus::Shipped | MarketplaceStatus::Canceled)
    }
}

impl std::fmt::Display for MarketplaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarketplaceStatus::Pending => "Pending",
            MarketplaceStatus::Unshipped => "Unshipped",
            MarketplaceStatus::PartiallyShipped => "PartiallyShipped",
            MarketplaceStatus::Shipped => "Shipped",
            MarketplaceStatus::Canceled => "Canceled",
        };
        write!(f, "{s}")
    }
}

/// ERP-side status of the linked sales order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErpStatus {
    /// No ERP order created yet.
    #[default]
    None,
    /// Draft quotation created.
    Draft,
    /// Confirmed sales order.
    Confirmed,
    /// Delivered and done (terminal).
    Done,
    /// Canceled in the ERP (terminal).
    Canceled,
}

impl ErpStatus {
    /// Returns true if the ERP order can still be canceled.
    ///
    /// Done orders are immutable; their stock moves already happened.
    pub fn can_cancel(&self) -> bool {
        matches!(self, ErpStatus::Draft | ErpStatus::Confirmed)
    }

    /// Maps the ERP's raw `state` field to this status.
    pub fn from_erp_state(state: &str) -> Self {
        match state {
            "draft" | "sent" => ErpStatus::Draft,
            "sale" => ErpStatus::Confirmed,
            "done" => ErpStatus::Done,
            "cancel" => ErpStatus::Canceled,
            _ => ErpStatus::None,
        }
    }
}

impl std::fmt::Display for ErpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErpStatus::None => "none",
            ErpStatus::Draft => "draft",
            ErpStatus::Confirmed => "confirmed",
            ErpStatus::Done => "done",
            ErpStatus::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

/// Whether the carrier tracking number has been pushed to the marketplace.
///
/// Moves strictly forward: a pushed confirmation is never un-pushed, and
/// an order the marketplace already considers shipped stays that way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackingPushState {
    /// Not pushed yet.
    #[default]
    NotPushed,
    /// Confirmation call succeeded.
    Pushed,
    /// The marketplace reported the order already shipped; treated as
    /// a successful no-op.
    AlreadyShippedNoop,
}

impl TrackingPushState {
    fn rank(&self) -> u8 {
        match self {
            TrackingPushState::NotPushed => 0,
            TrackingPushState::Pushed | TrackingPushState::AlreadyShippedNoop => 1,
        }
    }

    /// Returns true once a push (or its no-op equivalent) happened.
    pub fn is_pushed(&self) -> bool {
        self.rank() > 0
    }

    /// Returns true if a transition to `next` moves forward.
    pub fn can_become(&self, next: TrackingPushState) -> bool {
        next.rank() >= self.rank()
    }
}

impl std::fmt::Display for TrackingPushState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrackingPushState::NotPushed => "not_pushed",
            TrackingPushState::Pushed => "pushed",
            TrackingPushState::AlreadyShippedNoop => "already_shipped_noop",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marketplace_status_moves_forward() {
        assert!(MarketplaceStatus::Pending.can_become(MarketplaceStatus::Unshipped));
        assert!(MarketplaceStatus::Unshipped.can_become(MarketplaceStatus::PartiallyShipped));
        assert!(MarketplaceStatus::Unshipped.can_become(MarketplaceStatus::Shipped));
        assert!(MarketplaceStatus::Shipped.can_become(MarketplaceStatus::Shipped));
    }

    #[test]
    fn marketplace_status_never_regresses() {
        assert!(!MarketplaceStatus::Shipped.can_become(MarketplaceStatus::Unshipped));
        assert!(!MarketplaceStatus::PartiallyShipped.can_become(MarketplaceStatus::Pending));
    }

    #[test]
    fn cancellation_allowed_until_shipped() {
        assert!(MarketplaceStatus::Pending.can_become(MarketplaceStatus::Canceled));
        assert!(MarketplaceStatus::Unshipped.can_become(MarketplaceStatus::Canceled));
        assert!(!MarketplaceStatus::Shipped.can_become(MarketplaceStatus::Canceled));
        assert!(!MarketplaceStatus::Canceled.can_become(MarketplaceStatus::Unshipped));
    }

    #[test]
    fn erp_status_cancellable_states() {
        assert!(ErpStatus::Draft.can_cancel());
        assert!(ErpStatus::Confirmed.can_cancel());
        assert!(!ErpStatus::Done.can_cancel());
        assert!(!ErpStatus::Canceled.can_cancel());
        assert!(!ErpStatus::None.can_cancel());
    }

    #[test]
    fn erp_status_from_raw_state() {
        assert_eq!(ErpStatus::from_erp_state("draft"), ErpStatus::Draft);
        assert_eq!(ErpStatus::from_erp_state("sent"), ErpStatus::Draft);
        assert_eq!(ErpStatus::from_erp_state("sale"), ErpStatus::Confirmed);
        assert_eq!(ErpStatus::from_erp_state("done"), ErpStatus::Done);
        assert_eq!(ErpStatus::from_erp_state("cancel"), ErpStatus::Canceled);
    }

    #[test]
    fn tracking_push_is_monotonic() {
        assert!(TrackingPushState::NotPushed.can_become(TrackingPushState::Pushed));
        assert!(TrackingPushState::NotPushed.can_become(TrackingPushState::AlreadyShippedNoop));
        assert!(!TrackingPushState::Pushed.can_become(TrackingPushState::NotPushed));
        assert!(!TrackingPushState::AlreadyShippedNoop.can_become(TrackingPushState::NotPushed));
        assert!(TrackingPushState::Pushed.is_pushed());
        assert!(TrackingPushState::AlreadyShippedNoop.is_pushed());
    }

    #[test]
    fn order_name_prefix_follows_fulfillment() {
        assert_eq!(FulfillmentMode::SellerFulfilled.order_name_prefix(), "FBM");
        assert_eq!(FulfillmentMode::ChannelFulfilled.order_name_prefix(), "FBA");
    }
}
