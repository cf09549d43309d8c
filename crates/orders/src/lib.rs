//! Orders domain module (event-sourced).
//!
//! Orders are placed with a distributor enterprise by a user and move from
//! `cart` to `complete`. Checkout, payment and shipping live elsewhere.

pub mod order;

pub use order::{
    AddLineItem, CompleteOrder, CreateOrder, LineItem, Order, OrderCommand, OrderEvent, OrderId,
    OrderState,
};
