mod compare;

pub use compare::ComparisonWorkflow;
