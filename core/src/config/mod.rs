pub mod load;
pub mod types;

pub use load::{load_document, request_updated_variables};
pub use types::{
    ClassificationDef, ClassifierDef, ContentCategory, ContentRuleDef, Document, FunctionDef,
    GeneratorDef, GeneratorKind, Phase, VariableDef,
};
