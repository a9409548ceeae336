//! Structure map (document root) AST nodes

use crate::{FpExpression, GroupDeclaration, MetadataDeclaration, Node};
use indexmap::IndexMap;
use octofhir_fml_diagnostics::TokenSpan;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A complete FML document
///
/// Every map is keyed by the declaration's natural key and keeps declaration
/// order. A key declared twice keeps its first declaration; the repeat is recorded
/// in [`FhirStructureMap::duplicates`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FhirStructureMap {
    /// `/// path = value` metadata, by path
    pub metadata: IndexMap<String, Node<MetadataDeclaration>>,
    /// Embedded concept maps, by url
    pub concept_maps: IndexMap<String, Node<ConceptMapDeclaration>>,
    /// The `map "url" = name` directive
    pub map: Option<Node<MapDeclaration>>,
    /// `uses` declarations, by url
    pub structures: IndexMap<String, Node<StructureDeclaration>>,
    /// `imports` declarations, by url
    pub imports: IndexMap<String, Node<ImportDeclaration>>,
    /// `let` constants, by name
    pub constants: IndexMap<String, Node<ConstantDeclaration>>,
    /// Groups, by name, in declaration order
    pub groups: IndexMap<String, Node<GroupDeclaration>>,
    /// Repeated declarations that were not inserted
    pub duplicates: Vec<DuplicateDeclaration>,
}

impl FhirStructureMap {
    /// Create an empty structure map
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a `uses` declaration by its alias
    pub fn structure_by_alias(&self, alias: &str) -> Option<&Node<StructureDeclaration>> {
        self.structures
            .values()
            .find(|s| s.alias.as_deref() == Some(alias))
    }

    /// Look up a group by name
    pub fn group(&self, name: &str) -> Option<&Node<GroupDeclaration>> {
        self.groups.get(name)
    }

    /// Insert a metadata declaration
    pub fn add_metadata(&mut self, node: Node<MetadataDeclaration>) {
        let key = node.path.clone();
        insert_unique(&mut self.metadata, &mut self.duplicates, DeclarationKind::Metadata, key, node);
    }

    /// Insert an embedded concept map
    pub fn add_concept_map(&mut self, node: Node<ConceptMapDeclaration>) {
        let key = node.url.clone();
        insert_unique(&mut self.concept_maps, &mut self.duplicates, DeclarationKind::ConceptMap, key, node);
    }

    /// Insert a `uses` declaration
    pub fn add_structure(&mut self, node: Node<StructureDeclaration>) {
        let key = node.url.clone();
        insert_unique(&mut self.structures, &mut self.duplicates, DeclarationKind::Structure, key, node);
    }

    /// Insert an `imports` declaration
    pub fn add_import(&mut self, node: Node<ImportDeclaration>) {
        let key = node.url.clone();
        insert_unique(&mut self.imports, &mut self.duplicates, DeclarationKind::Import, key, node);
    }

    /// Insert a `let` constant
    pub fn add_constant(&mut self, node: Node<ConstantDeclaration>) {
        let key = node.name.clone();
        insert_unique(&mut self.constants, &mut self.duplicates, DeclarationKind::Constant, key, node);
    }

    /// Insert a group
    pub fn add_group(&mut self, node: Node<GroupDeclaration>) {
        let key = node.name.clone();
        insert_unique(&mut self.groups, &mut self.duplicates, DeclarationKind::Group, key, node);
    }
}

fn insert_unique<T>(
    map: &mut IndexMap<String, Node<T>>,
    duplicates: &mut Vec<DuplicateDeclaration>,
    kind: DeclarationKind,
    key: String,
    node: Node<T>,
) {
    if map.contains_key(&key) {
        duplicates.push(DuplicateDeclaration {
            kind,
            key,
            span: node.span(),
        });
    } else {
        map.insert(key, node);
    }
}

/// Kind of a top-level declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclarationKind {
    Metadata,
    ConceptMap,
    Structure,
    Import,
    Constant,
    Group,
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Metadata => "metadata",
            Self::ConceptMap => "conceptmap",
            Self::Structure => "uses",
            Self::Import => "imports",
            Self::Constant => "let",
            Self::Group => "group",
        };
        f.write_str(name)
    }
}

/// A declaration whose key was already taken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateDeclaration {
    /// Declaration kind
    pub kind: DeclarationKind,
    /// The repeated key
    pub key: String,
    /// Position of the repeat
    pub span: TokenSpan,
}

/// `map "url" = name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapDeclaration {
    /// Canonical url of the map
    pub url: String,
    /// Map name
    pub identifier: String,
}

/// Model mode of a `uses` declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelMode {
    Source,
    Queried,
    Target,
    Produced,
}

impl ModelMode {
    /// Parse from grammar text
    pub fn from_keyword(text: &str) -> Option<Self> {
        match text {
            "source" => Some(Self::Source),
            "queried" => Some(Self::Queried),
            "target" => Some(Self::Target),
            "produced" => Some(Self::Produced),
            _ => None,
        }
    }

    /// Whether structures with this mode are read by the map
    pub fn is_source_side(&self) -> bool {
        matches!(self, Self::Source | Self::Queried)
    }
}

/// `uses "url" alias Name as source`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureDeclaration {
    /// StructureDefinition canonical url
    pub url: String,
    /// Local alias
    pub alias: Option<String>,
    /// Model mode
    pub mode: ModelMode,
}

/// `imports "url"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDeclaration {
    /// Imported map url (may end in `*`)
    pub url: String,
}

/// `let name = expression;`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantDeclaration {
    /// Constant name
    pub name: String,
    /// Value expression
    pub expression: Node<FpExpression>,
}

/// `conceptmap "url" { prefix ... code maps ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptMapDeclaration {
    /// Concept map url or local name
    pub url: String,
    /// Prefixes, by id
    pub prefixes: IndexMap<String, Node<ConceptMapPrefix>>,
    /// Code mappings in declaration order
    pub mappings: Vec<Node<ConceptMapCodeMap>>,
}

/// `prefix s = "http://system"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptMapPrefix {
    /// Prefix id
    pub id: String,
    /// Code system url
    pub url: String,
}

/// `s:code1 == t:code2`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptMapCodeMap {
    /// Source code
    pub source: ConceptMapCode,
    /// Relationship operator text
    pub relationship: String,
    /// Target code
    pub target: ConceptMapCode,
}

/// `prefix:code`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptMapCode {
    /// Prefix id
    pub prefix: String,
    /// Code
    pub code: String,
}
