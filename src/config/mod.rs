mod settings;

pub use settings::{BudgetConfig, BudgetPolicy, Config, ObservabilityConfig, RetryConfig};
