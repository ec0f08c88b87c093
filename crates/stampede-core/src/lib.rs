//! Core building blocks for stampede: layered configuration, declarative scenarios,
//! load shapes, fixture data and run statistics.
//!
//! Everything here is synchronous and file-based except for the run lifecycle and the
//! login helper, which are async and expect a tokio runtime.

pub mod config;
pub mod data;
pub mod discovery;
pub mod error;
pub mod interpolate;
pub mod layout;
pub mod lifecycle;
pub mod scenario;
pub mod session;
pub mod settings;
pub mod shape;
pub mod stats;

pub use config::{deep_merge, ConfigResolver, ConfigTree, ResolvedConfig};
pub use data::{DataFormat, DataLoader, Row};
pub use discovery::{discover, RegisteredActor, ScenarioRegistry};
pub use error::{CoreError, CoreResult};
pub use interpolate::{interpolate_env, interpolate_with};
pub use layout::{
    project_from_env, resolve_env, ProjectLayout, DEFAULT_ENV, ENV_ENV_VAR, PROJECT_ENV_VAR,
    ROOT_ENV_VAR,
};
pub use lifecycle::{RequestEvent, RunContext, RunLifecycle, RunObserver, RunState};
pub use scenario::{
    ActorDescriptor, ResolvedUnit, ScenarioUnit, TaskSpec, UnitLoader, WaitPolicy, PLACEHOLDER_HOST,
};
pub use session::{login, LoginOutcome, LoginSpec};
pub use settings::{
    parse_clock, DingTalkSettings, EmailSettings, EngineSettings, InfluxSettings,
    NotificationSettings, ScheduleMode, SchedulerSettings, WatchdogSettings, WeChatSettings,
};
pub use shape::{LoadShape, ShapeTick, Stage};
pub use stats::{EndpointStat, RunStats};
