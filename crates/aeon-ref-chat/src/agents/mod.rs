//! Reference agents of the chat runtime.

pub mod activity;
pub mod configuration;
pub mod proxy;
pub mod router;

pub use activity::ActivityLogAgent;
pub use configuration::{ConfigurationAgent, ConfigurationApi};
pub use proxy::{ProxyAgent, ProxyApi};
pub use router::{ChatRouterAgent, RouterApi};
