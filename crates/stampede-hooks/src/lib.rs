//! Engine-side hooks: log setup, metrics forwarding, resource monitoring and the
//! bootstrap that ties them to a resolved configuration.

pub mod error;
pub mod host;
pub mod listener;
pub mod logging;
pub mod sink;
pub mod watchdog;

pub use error::{LoggingError, SinkError};
pub use host::EngineHost;
pub use listener::{local_hostname, MetricsListener, REQUESTS_MEASUREMENT, USERS_MEASUREMENT};
pub use logging::init_logging;
pub use sink::{DataPoint, FieldValue, InfluxSink, MemorySink, MetricsSink};
pub use watchdog::{ResourceSample, Watchdog};
