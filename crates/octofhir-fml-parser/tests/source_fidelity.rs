//! Raw text and span invariants
//!
//! Every AST node's raw text must equal the source slice between its start and
//! stop offsets, and every child span must lie within its parent's span.

use octofhir_fml_ast::{FhirStructureMap, FmlNode};
use octofhir_fml_parser::parse;
use proptest::prelude::*;

const MAP: &str = r#"/// url = 'http://example.org/fml/fidelity'
map "http://example.org/fml/fidelity" = fidelity

uses "http://hl7.org/fhir/StructureDefinition/Patient" alias P as source
uses "http://hl7.org/fhir/StructureDefinition/Basic" alias Q as target

let limit = 3 + 4;

group fidelity(source src : P, target tgt : Q) {
  // leading
  src.id -> tgt.id; /* trailing */
  src.name as n where n.given.count() <= %limit -> tgt.name as t then {
    n.given as g -> t.given = (g & '-' & g.length().toString()) "given";
  }
  src.telecom first as tc -> tgt.telecom = copy(tc);
  src.birthDate.exists() implies (src.deceased is boolean);
}
"#;

fn assert_raw_text_matches(map: &FhirStructureMap, source: &str) {
    let mut count = 0;
    map.for_each_node(&mut |node: &FmlNode| {
        count += 1;
        let slice = &source[node.span.start_index..=node.span.stop_index];
        assert_eq!(node.raw_text, slice, "span {} of `{}`", node.span, node.raw_text);
    });
    assert!(count > 0);
}

fn assert_children_contained(map: &FhirStructureMap) {
    for (parent, child) in map.node_pairs() {
        assert!(
            parent.span.contains(&child.span),
            "`{}` ({}) escapes `{}` ({})",
            child.raw_text,
            child.span,
            parent.raw_text,
            parent.span
        );
    }
}

#[test]
fn test_raw_text_equals_source_slice() {
    let map = parse(MAP).unwrap();
    assert_raw_text_matches(&map, MAP);
}

#[test]
fn test_child_spans_within_parent() {
    let map = parse(MAP).unwrap();
    assert_children_contained(&map);
}

#[test]
fn test_spans_are_line_and_column_addressable() {
    let map = parse(MAP).unwrap();
    let group = map.group("fidelity").unwrap();
    assert_eq!((group.span().line, group.span().column), (9, 1));
    assert_eq!((group.rules[1].span().line, group.rules[1].span().column), (12, 3));
}

fn identifier() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,6}".prop_map(|s| format!("x_{s}"))
}

fn separator() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![" ", "  ", "\n", "\t", " /* c */ ", " // c\n", "\n\n"])
}

proptest! {
    #[test]
    fn prop_raw_text_matches_for_generated_maps(
        group in identifier(),
        src in identifier(),
        tgt in identifier(),
        fields in prop::collection::vec((identifier(), identifier()), 0..5),
        sep in separator(),
    ) {
        let mut source = format!("group {group}({sep}source {src},{sep}target {tgt}){sep}{{{sep}");
        for (a, b) in &fields {
            source.push_str(&format!("{src}.{a}{sep}->{sep}{tgt}.{b};{sep}"));
            source.push_str(&format!("{src}.{a} as v{sep}->{sep}{tgt}.{b} = v;{sep}"));
        }
        source.push('}');

        let map = parse(&source).unwrap();
        prop_assert_eq!(map.groups.len(), 1);
        prop_assert_eq!(map.groups[0].rules.len(), fields.len() * 2);
        assert_raw_text_matches(&map, &source);
        assert_children_contained(&map);
    }
}
