pub mod definition;
pub mod service;

pub use definition::{Aggregation, ComputedFieldDefinition};
pub use service::{
    ComputedFieldService, ValueCallback, ValueListenerId, FIELD_COMPUTED_DEFINITION, FIELD_COMPUTED_UPDATED_AT,
    FIELD_COMPUTED_VALUE,
};
