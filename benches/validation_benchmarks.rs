use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::path::Path;

use cmd_validator::engine::{DocumentSource, XmlDocument};
use cmd_validator::Validator;
use url::Url;

fn schema_url() -> Url {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/schema/component.xsd");
    Url::from_file_path(path).expect("fixture path is absolute")
}

/// Generate a component specification with `elements` elements, every
/// `violation_every`-th one with an invalid cardinality range
fn generate_profile(elements: usize, violation_every: Option<usize>) -> String {
    let mut profile = String::from(
        "<ComponentSpec isProfile=\"true\"><Header><Name>Generated</Name>\
         <Description>Generated profile</Description></Header><Component name=\"Generated\">",
    );
    for i in 0..elements {
        let (min, max) = match violation_every {
            Some(n) if i % n == 0 => (3, 1),
            _ => (0, 1 + i % 5),
        };
        profile.push_str(&format!(
            "<Element name=\"E{i}\" CardinalityMin=\"{min}\" CardinalityMax=\"{max}\"/>"
        ));
    }
    profile.push_str("</Component></ComponentSpec>");
    profile
}

/// Benchmark validation with different violation densities
fn bench_violation_density(c: &mut Criterion) {
    let validator = Validator::new(schema_url());
    validator.prepare().expect("fixture grammar compiles");

    let scenarios = [("all_valid", None), ("every_tenth", Some(10)), ("every_second", Some(2))];
    let mut group = c.benchmark_group("violation_density");

    for (scenario, violation_every) in scenarios {
        let document = XmlDocument::parse(generate_profile(500, violation_every), None).expect("well-formed");
        group.throughput(Throughput::Elements(500));
        group.bench_with_input(BenchmarkId::new("scenario", scenario), &document, |b, document| {
            let mut session = validator.session();
            b.iter(|| {
                let valid = session.validate_document(black_box(document)).expect("validation runs");
                black_box((valid, session.findings().len()))
            })
        });
    }

    group.finish();
}

/// Benchmark validation scalability with different profile sizes
fn bench_profile_size(c: &mut Criterion) {
    let validator = Validator::new(schema_url());
    validator.prepare().expect("fixture grammar compiles");

    let mut group = c.benchmark_group("profile_size");
    for size in [10, 100, 1_000, 5_000] {
        let text = generate_profile(size, Some(50));
        group.throughput(Throughput::Bytes(text.len() as u64));
        let source = DocumentSource::text(text);
        group.bench_with_input(BenchmarkId::new("elements", size), &source, |b, source| {
            let mut session = validator.session();
            b.iter(|| black_box(session.validate(black_box(source)).expect("validation runs")))
        });
    }
    group.finish();
}

/// Benchmark compiling the grammar and the rule evaluator from scratch
fn bench_compilation(c: &mut Criterion) {
    c.bench_function("compile_grammar_and_rules", |b| {
        b.iter(|| {
            let validator = Validator::new(schema_url());
            validator.prepare().expect("fixture grammar compiles");
            black_box(validator)
        })
    });
}

criterion_group!(benches, bench_violation_density, bench_profile_size, bench_compilation);
criterion_main!(benches);
