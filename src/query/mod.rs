pub mod evaluator;
pub mod filter;

pub use evaluator::{EvalContext, FilterEvaluator, FilterRegistry, QueryEvaluator, QueryResult};
pub use filter::{
    PropertyOp, QueryDefinition, QueryFilter, RelationType, SortDirection, SortField, SortSpec,
    TemporalField, TemporalOp,
};
