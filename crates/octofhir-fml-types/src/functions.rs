//! FHIRPath function signatures used for type inference

use crate::system_types::SystemType;

/// Static result type of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    /// A fixed system type
    System(SystemType),
    /// The input collection's type
    SameAsInput,
    /// The type of the argument at this position
    Argument(usize),
    /// The type named by the first argument (`ofType(Quantity)`)
    TypeArgument,
    /// Not statically known
    Unknown,
}

/// Function signature information for type inference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub required_args: usize,
    pub optional_args: usize,
    /// Arguments are evaluated with `$this` bound to each input item
    pub lambda: bool,
    pub return_type: ReturnType,
}

impl FunctionSignature {
    fn new(name: &str, required_args: usize, optional_args: usize, return_type: ReturnType) -> Self {
        Self {
            name: name.to_string(),
            required_args,
            optional_args,
            lambda: false,
            return_type,
        }
    }

    fn lambda(mut self) -> Self {
        self.lambda = true;
        self
    }

    /// Check an argument count against the signature
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.required_args && count <= self.required_args + self.optional_args
    }
}

/// Get function signature by name
pub fn function_signature(name: &str) -> Option<FunctionSignature> {
    use ReturnType::{Argument, SameAsInput, System, TypeArgument, Unknown};
    use SystemType::{Boolean, Date, DateTime, Decimal, Integer, Quantity, String, Time};

    let signature = match name {
        // Existence
        "empty" | "hasValue" | "allTrue" | "anyTrue" | "allFalse" | "anyFalse" | "isDistinct"
        | "not" => FunctionSignature::new(name, 0, 0, System(Boolean)),
        "exists" => FunctionSignature::new(name, 0, 1, System(Boolean)).lambda(),
        "all" => FunctionSignature::new(name, 1, 0, System(Boolean)).lambda(),
        "subsetOf" | "supersetOf" => FunctionSignature::new(name, 1, 0, System(Boolean)),
        "count" => FunctionSignature::new(name, 0, 0, System(Integer)),
        "distinct" => FunctionSignature::new(name, 0, 0, SameAsInput),

        // Filtering and projection
        "where" => FunctionSignature::new(name, 1, 0, SameAsInput).lambda(),
        "select" | "repeat" => FunctionSignature::new(name, 1, 0, Argument(0)).lambda(),
        "ofType" | "as" => FunctionSignature::new(name, 1, 0, TypeArgument),
        "is" => FunctionSignature::new(name, 1, 0, System(Boolean)),

        // Subsetting
        "single" | "first" | "last" | "tail" => FunctionSignature::new(name, 0, 0, SameAsInput),
        "skip" | "take" => FunctionSignature::new(name, 1, 0, SameAsInput),
        "intersect" | "exclude" | "union" | "combine" => {
            FunctionSignature::new(name, 1, 0, SameAsInput)
        }

        // Conversion
        "iif" => FunctionSignature::new(name, 2, 1, Argument(1)),
        "toBoolean" => FunctionSignature::new(name, 0, 0, System(Boolean)),
        "toInteger" => FunctionSignature::new(name, 0, 0, System(Integer)),
        "toDecimal" => FunctionSignature::new(name, 0, 0, System(Decimal)),
        "toString" => FunctionSignature::new(name, 0, 0, System(String)),
        "toDate" => FunctionSignature::new(name, 0, 0, System(Date)),
        "toDateTime" => FunctionSignature::new(name, 0, 0, System(DateTime)),
        "toTime" => FunctionSignature::new(name, 0, 0, System(Time)),
        "toQuantity" => FunctionSignature::new(name, 0, 1, System(Quantity)),
        "convertsToBoolean" | "convertsToInteger" | "convertsToDecimal" | "convertsToString"
        | "convertsToDate" | "convertsToDateTime" | "convertsToTime" => {
            FunctionSignature::new(name, 0, 0, System(Boolean))
        }
        "convertsToQuantity" => FunctionSignature::new(name, 0, 1, System(Boolean)),

        // String manipulation
        "indexOf" => FunctionSignature::new(name, 1, 0, System(Integer)),
        "length" => FunctionSignature::new(name, 0, 0, System(Integer)),
        "substring" => FunctionSignature::new(name, 1, 1, System(String)),
        "startsWith" | "endsWith" | "contains" | "matches" => {
            FunctionSignature::new(name, 1, 0, System(Boolean))
        }
        "upper" | "lower" | "trim" | "toChars" => FunctionSignature::new(name, 0, 0, System(String)),
        "replace" | "replaceMatches" => FunctionSignature::new(name, 2, 0, System(String)),
        "join" => FunctionSignature::new(name, 0, 1, System(String)),
        "encode" | "decode" | "escape" | "unescape" => {
            FunctionSignature::new(name, 1, 0, System(String))
        }

        // Math
        "abs" | "round" => FunctionSignature::new(name, 0, 1, SameAsInput),
        "ceiling" | "floor" | "truncate" => FunctionSignature::new(name, 0, 0, System(Integer)),
        "exp" | "ln" | "sqrt" => FunctionSignature::new(name, 0, 0, System(Decimal)),
        "log" | "power" => FunctionSignature::new(name, 1, 0, System(Decimal)),

        // Date and time
        "now" => FunctionSignature::new(name, 0, 0, System(DateTime)),
        "today" => FunctionSignature::new(name, 0, 0, System(Date)),
        "timeOfDay" => FunctionSignature::new(name, 0, 0, System(Time)),

        // Tree navigation and FHIR extensions
        "children" | "descendants" | "resolve" | "aggregate" => {
            FunctionSignature::new(name, 0, 2, Unknown)
        }
        "extension" => FunctionSignature::new(name, 1, 0, Unknown),
        "trace" => FunctionSignature::new(name, 1, 1, SameAsInput),
        "memberOf" | "conformsTo" | "subsumes" | "subsumedBy" | "htmlChecks" => {
            FunctionSignature::new(name, 0, 1, System(Boolean))
        }

        _ => return None,
    };
    Some(signature)
}
