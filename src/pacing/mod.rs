//! Invocation-rate control: debounce and throttle as explicit stateful objects.

mod debounce;
mod throttle;

pub use debounce::{Debounce, KeyedDebounce};
pub use throttle::Throttle;
