use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harvest_catalog::VariantId;
use harvest_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use harvest_enterprises::EnterpriseId;
use harvest_events::Event;

/// Order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for OrderId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Cart,
    Complete,
}

impl OrderState {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderState::Cart => "cart",
            OrderState::Complete => "complete",
        }
    }
}

/// One variant in the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub variant_id: VariantId,
    pub quantity: u32,
    /// Unit price in minor units, captured when the item was added.
    pub price: u64,
}

impl LineItem {
    pub fn amount(&self) -> u64 {
        self.price.saturating_mul(u64::from(self.quantity))
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    number: String,
    user: Option<UserId>,
    distributor: Option<EnterpriseId>,
    state: OrderState,
    line_items: Vec<LineItem>,
    created_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            number: String::new(),
            user: None,
            distributor: None,
            state: OrderState::Cart,
            line_items: Vec::new(),
            created_at: None,
            completed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn user(&self) -> Option<UserId> {
        self.user
    }

    pub fn distributor(&self) -> Option<EnterpriseId> {
        self.distributor
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_complete(&self) -> bool {
        self.state == OrderState::Complete
    }

    /// Sum of line item amounts in minor units.
    pub fn item_total(&self) -> u64 {
        self.line_items
            .iter()
            .fold(0u64, |acc, li| acc.saturating_add(li.amount()))
    }

    fn ensure_cart(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.state != OrderState::Cart {
            return Err(DomainError::invariant("order is already complete"));
        }
        Ok(())
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: OrderId,
    /// Human-facing reference (`R123456789`).
    pub number: String,
    pub user: Option<UserId>,
    pub distributor: EnterpriseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLineItem {
    pub order_id: OrderId,
    pub variant_id: VariantId,
    pub quantity: u32,
    pub price: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    Create(CreateOrder),
    AddLineItem(AddLineItem),
    Complete(CompleteOrder),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub number: String,
    pub user: Option<UserId>,
    pub distributor: EnterpriseId,
    pub occurred_at: DateTime<Utc>,
}

/// Adding a variant already in the order merges into its line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemAdded {
    pub order_id: OrderId,
    pub variant_id: VariantId,
    pub quantity: u32,
    pub price: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCompleted {
    pub order_id: OrderId,
    pub item_total: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    Created(OrderCreated),
    LineItemAdded(LineItemAdded),
    Completed(OrderCompleted),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "orders.order.created",
            OrderEvent::LineItemAdded(_) => "orders.order.line_item_added",
            OrderEvent::Completed(_) => "orders.order.completed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Created(e) => e.occurred_at,
            OrderEvent::LineItemAdded(e) => e.occurred_at,
            OrderEvent::Completed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::Created(e) => {
                self.id = e.order_id;
                self.number = e.number.clone();
                self.user = e.user;
                self.distributor = Some(e.distributor);
                self.state = OrderState::Cart;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::LineItemAdded(e) => {
                match self.line_items.iter_mut().find(|li| li.variant_id == e.variant_id) {
                    Some(line) => {
                        line.quantity = line.quantity.saturating_add(e.quantity);
                        line.price = e.price;
                    }
                    None => self.line_items.push(LineItem {
                        variant_id: e.variant_id,
                        quantity: e.quantity,
                        price: e.price,
                    }),
                }
            }
            OrderEvent::Completed(e) => {
                self.state = OrderState::Complete;
                self.completed_at = Some(e.occurred_at);
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("order already exists"));
                }
                if cmd.number.trim().is_empty() {
                    return Err(DomainError::validation("number", "can't be blank"));
                }

                Ok(vec![OrderEvent::Created(OrderCreated {
                    order_id: cmd.order_id,
                    number: cmd.number.trim().to_string(),
                    user: cmd.user,
                    distributor: cmd.distributor,
                    occurred_at: cmd.occurred_at,
                })])
            }
            OrderCommand::AddLineItem(cmd) => {
                self.ensure_cart()?;
                if cmd.quantity == 0 {
                    return Err(DomainError::validation("quantity", "must be greater than 0"));
                }

                Ok(vec![OrderEvent::LineItemAdded(LineItemAdded {
                    order_id: cmd.order_id,
                    variant_id: cmd.variant_id,
                    quantity: cmd.quantity,
                    price: cmd.price,
                    occurred_at: cmd.occurred_at,
                })])
            }
            OrderCommand::Complete(cmd) => {
                self.ensure_cart()?;
                if self.line_items.is_empty() {
                    return Err(DomainError::validation("line_items", "can't be empty"));
                }

                Ok(vec![OrderEvent::Completed(OrderCompleted {
                    order_id: cmd.order_id,
                    item_total: self.item_total(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn cart() -> Order {
        let id = OrderId::new(AggregateId::new());
        let mut order = Order::empty(id);
        let cmd = OrderCommand::Create(CreateOrder {
            order_id: id,
            number: "R100000001".to_string(),
            user: Some(UserId::new()),
            distributor: EnterpriseId::new(AggregateId::new()),
            occurred_at: now(),
        });
        for e in order.handle(&cmd).unwrap() {
            order.apply(&e);
        }
        order
    }

    fn add(order: &mut Order, variant_id: VariantId, quantity: u32, price: u64) {
        let cmd = OrderCommand::AddLineItem(AddLineItem {
            order_id: order.id_typed(),
            variant_id,
            quantity,
            price,
            occurred_at: now(),
        });
        for e in order.handle(&cmd).unwrap() {
            order.apply(&e);
        }
    }

    #[test]
    fn line_items_merge_per_variant_and_total() {
        let mut order = cart();
        let peas = VariantId::new();
        add(&mut order, peas, 2, 350);
        add(&mut order, peas, 1, 350);
        add(&mut order, VariantId::new(), 1, 1000);

        assert_eq!(order.line_items().len(), 2);
        assert_eq!(order.line_items()[0].quantity, 3);
        assert_eq!(order.item_total(), 2050);
    }

    #[test]
    fn empty_carts_cannot_complete() {
        let order = cart();
        let cmd = OrderCommand::Complete(CompleteOrder {
            order_id: order.id_typed(),
            occurred_at: now(),
        });
        assert!(matches!(order.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn completed_orders_are_frozen() {
        let mut order = cart();
        add(&mut order, VariantId::new(), 1, 500);
        let complete = OrderCommand::Complete(CompleteOrder {
            order_id: order.id_typed(),
            occurred_at: now(),
        });
        for e in order.handle(&complete).unwrap() {
            order.apply(&e);
        }
        assert!(order.is_complete());
        assert!(order.completed_at().is_some());

        let more = OrderCommand::AddLineItem(AddLineItem {
            order_id: order.id_typed(),
            variant_id: VariantId::new(),
            quantity: 1,
            price: 1,
            occurred_at: now(),
        });
        assert!(matches!(order.handle(&more), Err(DomainError::InvariantViolation(_))));
        assert!(order.handle(&complete).is_err());
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let order = cart();
        let cmd = OrderCommand::AddLineItem(AddLineItem {
            order_id: order.id_typed(),
            variant_id: VariantId::new(),
            quantity: 0,
            price: 100,
            occurred_at: now(),
        });
        assert!(order.handle(&cmd).is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// The item total is the sum of quantity × price over every addition.
            #[test]
            fn item_total_matches_additions(lines in prop::collection::vec((1u32..20, 0u64..10_000), 1..10)) {
                let mut order = cart();
                let mut expected = 0u64;
                for (quantity, price) in &lines {
                    add(&mut order, VariantId::new(), *quantity, *price);
                    expected += u64::from(*quantity) * price;
                }
                prop_assert_eq!(order.item_total(), expected);
            }
        }
    }
}
