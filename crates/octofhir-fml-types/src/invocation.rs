//! Built-in transform functions
//!
//! Only the result type of a transform matters for validation. Argument checks
//! happen in the validator.

/// How a built-in transform's result type is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformReturn {
    /// The type named by the first string argument (`create('Coding')`)
    NamedByFirstArgument,
    /// The type of the first argument (`copy(v)`)
    FirstArgument,
    /// A fixed FHIR type
    Named(&'static str),
}

/// Look up a built-in transform by name
pub fn builtin_transform(name: &str) -> Option<TransformReturn> {
    let ret = match name {
        "create" => TransformReturn::NamedByFirstArgument,
        "copy" | "translate" => TransformReturn::FirstArgument,
        "truncate" | "escape" | "append" | "reference" | "pointer" => {
            TransformReturn::Named("string")
        }
        "uuid" => TransformReturn::Named("uuid"),
        "cc" => TransformReturn::Named("CodeableConcept"),
        "c" => TransformReturn::Named("Coding"),
        "qty" => TransformReturn::Named("Quantity"),
        "id" => TransformReturn::Named("Identifier"),
        "cp" => TransformReturn::Named("ContactPoint"),
        _ => return None,
    };
    Some(ret)
}
