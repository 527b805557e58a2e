//! Live update fan-out for timeops.
//!
//! A [`Broadcaster`] keeps, per user, the set of open subscriptions and pushes
//! a payload-free [`LiveEvent::DataUpdate`] to each of them whenever that
//! user's data changes. Subscribers refetch what they display; the event only
//! says "something changed".

mod broadcaster;
mod event;

pub use broadcaster::{Broadcaster, SubscriberId, Subscription};
pub use event::LiveEvent;
