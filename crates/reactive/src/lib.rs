//! Tabula Reactive - change notifications for tables and views.
//!
//! Tables and views publish [`ListChanged`] events describing what changed
//! (added, deleted, changed, moved, reset, column events) and where. A
//! [`SubscriptionManager`] holds the callbacks of one source.
//!
//! # Example
//!
//! ```rust
//! use tabula_reactive::{ListChanged, ListChangedKind, SubscriptionManager};
//!
//! let mut manager = SubscriptionManager::new();
//! let id = manager.subscribe(|e: &ListChanged| assert_eq!(e.kind, ListChangedKind::ItemAdded));
//! manager.notify_all(&ListChanged::added(0));
//! manager.unsubscribe(id);
//! ```

#![no_std]

extern crate alloc;

pub mod list_changed;
pub mod subscription;

pub use list_changed::{ListChanged, ListChangedKind};
pub use subscription::{Callback, Subscription, SubscriptionId, SubscriptionManager};
