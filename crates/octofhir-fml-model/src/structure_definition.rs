//! FHIR StructureDefinition resource model
//!
//! A reduced view of StructureDefinition and ElementDefinition covering the fields
//! the element-tree walker and the validator read. Unknown JSON properties are ignored.

use serde::{Deserialize, Serialize};

/// Prefix of FHIR core StructureDefinition canonicals
pub const FHIR_CORE_PREFIX: &str = "http://hl7.org/fhir/StructureDefinition/";

/// Prefix of FHIRPath system type URIs
pub const FHIRPATH_SYSTEM_PREFIX: &str = "http://hl7.org/fhirpath/System.";

/// Canonical URL of the StructureDefinition a type code refers to
///
/// Codes that are already absolute (FHIRPath system types, logical models) are
/// returned unchanged.
pub fn type_canonical(code: &str) -> String {
    if code.contains("://") {
        code.to_string()
    } else {
        format!("{FHIR_CORE_PREFIX}{code}")
    }
}

/// Whether a URI names a FHIRPath system type
pub fn is_system_type(uri: &str) -> bool {
    uri.starts_with(FHIRPATH_SYSTEM_PREFIX)
}

/// FHIR StructureDefinition resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructureDefinition {
    /// Resource type (always "StructureDefinition")
    #[serde(default = "structure_definition_resource_type")]
    pub resource_type: String,

    /// Logical id of this artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Canonical identifier for this structure definition
    pub url: String,

    /// Business version of the structure definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Name for this structure definition (computer friendly)
    #[serde(default)]
    pub name: String,

    /// FHIR version this StructureDefinition targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fhir_version: Option<String>,

    /// primitive-type | complex-type | resource | logical
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<StructureDefinitionKind>,

    /// Whether the structure is abstract
    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,

    /// Type defined or constrained by this structure
    #[serde(rename = "type")]
    pub type_field: String,

    /// Definition that this type is constrained/specialized from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_definition: Option<String>,

    /// specialization | constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivation: Option<String>,

    /// Snapshot view of the structure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ElementList>,

    /// Differential view of the structure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub differential: Option<ElementList>,
}

fn structure_definition_resource_type() -> String {
    "StructureDefinition".to_string()
}

impl StructureDefinition {
    /// Create a StructureDefinition with required fields and no elements
    pub fn new(
        url: impl Into<String>,
        name: impl Into<String>,
        type_field: impl Into<String>,
        kind: StructureDefinitionKind,
    ) -> Self {
        Self {
            resource_type: structure_definition_resource_type(),
            id: None,
            url: url.into(),
            version: None,
            name: name.into(),
            fhir_version: None,
            kind: Some(kind),
            is_abstract: false,
            type_field: type_field.into(),
            base_definition: None,
            derivation: None,
            snapshot: None,
            differential: None,
        }
    }

    /// Whether this defines a primitive datatype
    pub fn is_primitive(&self) -> bool {
        self.kind == Some(StructureDefinitionKind::PrimitiveType)
    }

    /// Set the business version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the FHIR release
    pub fn with_fhir_version(mut self, fhir_version: impl Into<String>) -> Self {
        self.fhir_version = Some(fhir_version.into());
        self
    }

    /// Replace the snapshot element list
    pub fn with_snapshot(mut self, elements: Vec<ElementDefinition>) -> Self {
        self.snapshot = Some(ElementList { element: elements });
        self
    }

    /// Elements the walker navigates: the snapshot, else the differential
    pub fn elements(&self) -> &[ElementDefinition] {
        self.snapshot
            .as_ref()
            .or(self.differential.as_ref())
            .map(|list| list.element.as_slice())
            .unwrap_or_default()
    }

    /// `url|version`, or the bare url when unversioned
    pub fn versioned_url(&self) -> String {
        match &self.version {
            Some(version) => format!("{}|{}", self.url, version),
            None => self.url.clone(),
        }
    }

    /// Find an element by id, falling back to path
    pub fn find_element(&self, key: &str) -> Option<usize> {
        let elements = self.elements();
        elements
            .iter()
            .position(|e| e.id.as_deref() == Some(key))
            .or_else(|| elements.iter().position(|e| e.path == key))
    }
}

/// Kind of structure definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructureDefinitionKind {
    PrimitiveType,
    ComplexType,
    Resource,
    Logical,
}

/// Snapshot or differential element list
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ElementList {
    #[serde(default)]
    pub element: Vec<ElementDefinition>,
}

/// Definition of an element in a resource or data type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinition {
    /// Element id (`Patient.name`, `Observation.component:systolic`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Path of the element in the hierarchy of elements
    pub path: String,

    /// Name of the slice this element defines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice_name: Option<String>,

    /// Minimum cardinality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,

    /// Maximum cardinality ("*" for unbounded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,

    /// Data type(s) for this element
    #[serde(rename = "type", default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<ElementDefinitionType>,

    /// Reference to an element whose subtree this element reuses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_reference: Option<String>,

    /// Slicing rules, on the element that is sliced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slicing: Option<ElementDefinitionSlicing>,

    /// Short description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
}

impl ElementDefinition {
    /// Create an element with only a path
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id: Some(path.clone()),
            path,
            slice_name: None,
            min: None,
            max: None,
            types: Vec::new(),
            content_reference: None,
            slicing: None,
            short: None,
        }
    }

    /// Add type codes
    pub fn with_types(mut self, codes: &[&str]) -> Self {
        self.types
            .extend(codes.iter().map(|code| ElementDefinitionType::new(*code)));
        self
    }

    /// Set cardinality
    pub fn with_cardinality(mut self, min: u32, max: &str) -> Self {
        self.min = Some(min);
        self.max = Some(max.to_string());
        self
    }

    /// Make this element reuse another element's subtree
    pub fn with_content_reference(mut self, reference: impl Into<String>) -> Self {
        self.content_reference = Some(reference.into());
        self
    }

    /// Make this element a named slice
    pub fn with_slice_name(mut self, slice_name: impl Into<String>) -> Self {
        let slice_name = slice_name.into();
        self.id = Some(format!("{}:{}", self.path, slice_name));
        self.slice_name = Some(slice_name);
        self
    }

    /// Mark this element as sliced
    pub fn with_slicing(mut self, slicing: ElementDefinitionSlicing) -> Self {
        self.slicing = Some(slicing);
        self
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    /// Whether this is a choice element (`value[x]`)
    pub fn is_choice(&self) -> bool {
        self.path.ends_with("[x]")
    }

    /// Key used in canonical paths: the id, else the path
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.path)
    }
}

/// Data type for an element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionType {
    /// Data type or resource code
    pub code: String,

    /// Profiles on the type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profile: Vec<String>,

    /// Profiles for reference targets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_profile: Vec<String>,
}

impl ElementDefinitionType {
    /// Create a type with just a code
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            profile: Vec::new(),
            target_profile: Vec::new(),
        }
    }
}

/// Slicing rules
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionSlicing {
    /// Discriminators that tell slices apart
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discriminator: Vec<SlicingDiscriminator>,

    /// Whether slices must appear in order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordered: Option<bool>,

    /// closed | open | openAtEnd
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<String>,
}

/// One slicing discriminator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlicingDiscriminator {
    /// value | exists | pattern | type | profile
    #[serde(rename = "type")]
    pub kind: String,
    /// FHIRPath to the discriminating element
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deserialize_minimal_structure_definition() {
        let json = r##"{
            "resourceType": "StructureDefinition",
            "url": "http://hl7.org/fhir/StructureDefinition/Questionnaire",
            "version": "4.0.1",
            "name": "Questionnaire",
            "kind": "resource",
            "abstract": false,
            "type": "Questionnaire",
            "snapshot": { "element": [
                { "id": "Questionnaire", "path": "Questionnaire" },
                { "id": "Questionnaire.item", "path": "Questionnaire.item",
                  "type": [{ "code": "BackboneElement" }] },
                { "id": "Questionnaire.item.item", "path": "Questionnaire.item.item",
                  "contentReference": "#Questionnaire.item" }
            ]}
        }"##;

        let sd: StructureDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(sd.kind, Some(StructureDefinitionKind::Resource));
        assert_eq!(sd.versioned_url(), "http://hl7.org/fhir/StructureDefinition/Questionnaire|4.0.1");
        assert_eq!(sd.elements().len(), 3);
        assert_eq!(sd.elements()[1].types[0].code, "BackboneElement");
        assert_eq!(
            sd.elements()[2].content_reference.as_deref(),
            Some("#Questionnaire.item")
        );
        assert_eq!(sd.find_element("Questionnaire.item"), Some(1));
    }

    #[test]
    fn test_type_canonical() {
        assert_eq!(type_canonical("HumanName"), "http://hl7.org/fhir/StructureDefinition/HumanName");
        assert_eq!(
            type_canonical("http://hl7.org/fhirpath/System.String"),
            "http://hl7.org/fhirpath/System.String"
        );
        assert!(is_system_type("http://hl7.org/fhirpath/System.String"));
    }

    #[test]
    fn test_element_helpers() {
        let element = ElementDefinition::new("Observation.value[x]").with_types(&["Quantity", "string"]);
        assert!(element.is_choice());
        assert_eq!(element.name(), "value[x]");

        let slice = ElementDefinition::new("Observation.component").with_slice_name("systolic");
        assert_eq!(slice.key(), "Observation.component:systolic");
    }
}
