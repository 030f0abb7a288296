//! Durable state stores (`spec.md` §4.5): JSON documents flushed
//! write-then-rename, guarded by an async `RwLock`.

pub mod subscriptions;

pub use subscriptions::SubscriptionStore;
