//! SONiC transport contract for newtron.
//!
//! [`SonicClient`] is the seam between the control plane and a switch:
//! pipelined CONFIG_DB writes, atomic whole-DB replacement, post-write
//! verification, the distributed advisory lock, and the STATE_DB /
//! APP_DB / ASIC_DB read surfaces health checks use.
//!
//! Two implementations ship here:
//!
//! - [`RedisSonicClient`]: the real thing, over the `redis` crate's
//!   connection manager
//! - [`mock::MockSonicClient`]: an in-memory CONFIG_DB with failure
//!   injection, used by every higher-level test

mod client;
mod error;
pub mod mock;
mod redis_client;
mod verify;

pub use client::{BgpNeighborState, RouteEntry, SonicClient};
pub use error::{ApplyError, ClientError, ClientResult};
pub use redis_client::{RedisSonicClient, RedisSonicClientConfig};
pub use verify::{VerificationCheck, VerificationResult};
