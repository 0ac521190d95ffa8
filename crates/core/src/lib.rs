pub mod audit;
pub mod calc;
pub mod config;
pub mod domain;
pub mod errors;
pub mod factors;
pub mod report;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use calc::policy::{CategoryPolicy, ClarificationRequest, UnknownCategoryPolicy};
pub use calc::CalculationEngine;
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::activity::{ActivityKind, ActivityRecord, FuelKind, FuelQuantityBasis};
pub use domain::result::EmissionResult;
pub use errors::{ApplicationError, CalculationError, InterfaceError};
pub use factors::{normalize_key, EmissionFactorEntry, FactorTable, FactorUnit, TableError};
pub use report::{format_for_display, render_report, ReportError};
