/*
[INPUT]:  Activity samples and app lifecycle transitions
[OUTPUT]: Inactivity notifications and auto-lock
[POS]:    Activity layer - idle detection
[UPDATE]: When activity sources or auto-lock rules change
*/

pub mod auto_lock;
pub mod monitor;

pub use auto_lock::AutoLock;
pub use monitor::{ActivityMonitor, Subscription};
