//! Parser benchmarks using divan
//!
//! Benchmarks for lexing, parsing and AST building across expression and map sizes.

use octofhir_fml_parser::{lex, parse, parse_expression, parse_tree};

fn main() {
    divan::main();
}

const TUTORIAL: &str = r#"map "http://example.org/fml/tutorial" = tutorial

uses "http://hl7.org/fhir/StructureDefinition/Patient" alias Patient as source
uses "http://hl7.org/fhir/StructureDefinition/Basic" alias Basic as target

group tutorial(source src : Patient, target tgt : Basic) {
  src.id -> tgt.id;
  src.name as n where n.given.exists() -> tgt.subject = create('Reference') as r then {
    n.family as f -> r.display = f "family";
  }
  src.gender as g -> tgt.code = translate(g, 'http://example.org/cm', 'code');
}
"#;

fn generated_map(rules: usize) -> String {
    let mut source = String::from("group big(source src, target tgt) {\n");
    for i in 0..rules {
        source.push_str(&format!(
            "  src.field{i} as v{i} where v{i}.exists() -> tgt.field{i} = (v{i} + 1) \"rule{i}\";\n"
        ));
    }
    source.push('}');
    source
}

// === Expression Benchmarks ===

mod expressions {
    use super::*;

    #[divan::bench]
    fn literal(bencher: divan::Bencher) {
        bencher.bench_local(|| parse_expression(divan::black_box("42")));
    }

    #[divan::bench]
    fn path(bencher: divan::Bencher) {
        bencher.bench_local(|| parse_expression(divan::black_box("Patient.name.given")));
    }

    #[divan::bench]
    fn function_chain(bencher: divan::Bencher) {
        bencher.bench_local(|| {
            parse_expression(divan::black_box(
                "name.where(use = 'official').given.first().length() > 3",
            ))
        });
    }

    #[divan::bench]
    fn boolean_logic(bencher: divan::Bencher) {
        bencher.bench_local(|| {
            parse_expression(divan::black_box(
                "a and (b or c) implies d xor e.exists() and f is string",
            ))
        });
    }
}

// === Structure Map Benchmarks ===

mod structure_maps {
    use super::*;

    #[divan::bench]
    fn lex_tutorial(bencher: divan::Bencher) {
        bencher.bench_local(|| lex(divan::black_box(TUTORIAL)));
    }

    #[divan::bench]
    fn parse_tree_tutorial(bencher: divan::Bencher) {
        bencher.bench_local(|| parse_tree(divan::black_box(TUTORIAL)));
    }

    #[divan::bench]
    fn parse_tutorial(bencher: divan::Bencher) {
        bencher.bench_local(|| parse(divan::black_box(TUTORIAL)));
    }

    #[divan::bench(args = [10, 100, 1000])]
    fn parse_generated(bencher: divan::Bencher, rules: usize) {
        let source = generated_map(rules);
        bencher.bench_local(|| parse(divan::black_box(&source)));
    }
}
