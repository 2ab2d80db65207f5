pub mod event;
pub mod notifier;
#[cfg(test)]
mod tests;

pub use event::{NotificationKind, RecipientKind};
pub use notifier::{create_notifier, Notifier, NotifierTrait};
