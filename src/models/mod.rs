mod event;
mod usage;

pub use event::{SwitchEvent, WindowHandle};
pub use usage::{TopAppEntry, UsageLedger};
