// # In-Memory Backends
//
// Zone provider and endpoint source implementations that live entirely in
// process memory. Used for dry runs, embedding and tests.

pub mod source;
pub mod zone;

pub use source::{ChannelEndpointSource, EndpointSender};
pub use zone::{Fault, MemoryProviderFactory, MemoryZoneProvider};
