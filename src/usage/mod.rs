// Usage module
// Append-only CSV log of prompt/response sizes

mod logger;
mod types;

pub use logger::UsageLogger;
pub use types::{estimate_tokens, UsageRecord};
