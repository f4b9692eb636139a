//! Sliding-window admission engines and the contract they share.

mod backend;
mod clock;
mod distributed;
mod limit;
mod memory;
mod window;

pub use backend::Limiter;
pub use clock::{Clock, ManualClock, SystemClock};
pub use distributed::{RedisLimiter, DEFAULT_KEY_PREFIX};
pub use limit::{LimitConfig, Outcome};
pub use memory::{MemoryLimiter, MemoryLimiterOptions};
pub use window::WindowLog;
