mod checkpoint;
mod config;
mod error;
mod event;
mod history;
mod logging;
mod merge;
mod poller;
mod relay;
mod session;
mod signer;
mod submit;
mod timeline;
pub mod wire;

use std::future::Future;
use std::pin::Pin;

pub use checkpoint::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use history::*;
pub use logging::init_logging;
pub use merge::merge;
pub use poller::{IncrementalPoller, LedgerRpc, PollOutcome};
pub use relay::*;
pub use session::*;
pub use signer::*;
pub use submit::*;
pub use timeline::*;

/// Boxed future returned by the collaborator traits so they stay object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
