//! Domain types for the rotor pipeline.
//!
//! - Message: the transport envelope
//! - Event: the analytics payload being enriched
//! - Connection: configuration-store records
//! - Context: derived enrichment and metrics metadata
//! - Result: chain execution outcome

pub mod connection;
pub mod context;
pub mod event;
pub mod message;
pub mod result;

// Re-export commonly used types
pub use connection::{ConnectionOptions, EnrichedConnection, FunctionConfig, FunctionRef};
pub use context::{
    ConnectionDescriptor, DestinationDescriptor, Device, DeviceType, EventContext, MetricsMeta,
    NameVersion, SourceDescriptor, UserAgent,
};
pub use event::{AnalyticsEvent, Geo};
pub use message::{IngestMessage, IngestType, Origin, RawMessage, TransportHeaders, CONNECTION_IDS_HEADER};
pub use result::{ChainResult, ErrorClass, FuncLogEntry, FunctionKind, StepError, StepStatus};
