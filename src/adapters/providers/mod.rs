//! Capability provider adapters.

pub mod fixture;
pub mod http;
pub mod mock;

pub use fixture::{FixtureCapabilityProvider, FixtureSet};
pub use http::HttpCapabilityProvider;
pub use mock::{MockCapabilityProvider, MockResponse};
