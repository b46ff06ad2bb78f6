pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod quota;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::query::{DateSpec, EntityBag, HomeAction, HomeDomain, Query, ThoughtStep};
pub use domain::quota::{
    CategoryUsage, Identity, QuotaCategory, QuotaDecision, QuotaLimits, QuotaStatus, QuotaTiers,
    ResetInfo,
};
pub use domain::tool::{ToolKind, ToolSet};
pub use errors::{ApplicationError, InterfaceError, ToolError};
pub use quota::{QuotaEngine, QuotaStore};
