//! Cloud resource API collaborators.
//!
//! The dependency collector only needs one capability from the cloud side:
//! fetch a single resource by identifier. Implementations must keep three
//! outcomes apart so the retry policy can act on them:
//!
//! | Outcome | Return value | Retry? |
//! |---------|--------------|--------|
//! | found | `Ok(Some(resource))` | - |
//! | permanently absent | `Ok(None)` | no |
//! | throttled / transient | `Err(e)` with `e.is_transient()` | yes |
//! | permanent failure | `Err(e)` otherwise | no |

mod arm;

pub use arm::ArmClient;

use crate::error::Result;
use crate::types::Resource;
use async_trait::async_trait;

/// Fetches individual resources from the source cloud API.
#[async_trait]
pub trait CloudResourceClient: Send + Sync {
    /// Fetch a resource by its full identifier.
    ///
    /// # Errors
    ///
    /// Returns `Throttled` for rate limiting and `CloudApi` for other
    /// failures; see the module docs for the retry contract.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<Resource>>;
}
