//! Small synchronization helpers.

mod notification;

pub use notification::Notification;
