//! Shield - Sliding-Window Rate Limiting
//!
//! This crate grants or denies actions per caller identifier so that no caller
//! exceeds a fixed number of admissions within any rolling window. The same
//! contract is served by an in-process engine and by a Redis-backed engine
//! that stays exact across any number of cooperating processes.

pub mod config;
pub mod error;
pub mod ratelimit;

pub use error::{Result, ShieldError};
pub use ratelimit::{LimitConfig, Limiter, MemoryLimiter, Outcome, RedisLimiter};
