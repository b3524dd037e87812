//! Benchmarks for sandboxed path resolution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use patentflow::registry;
use patentflow::store::ArtifactStore;
use patentflow::core::Project;

fn resolve_benchmark(c: &mut Criterion) {
    let Ok(dir) = tempfile::TempDir::new() else {
        return;
    };
    let Ok(store) = ArtifactStore::open(dir.path()) else {
        return;
    };
    let Ok(project) = Project::new("bench", store.root()) else {
        return;
    };
    let inside = project.artifact_path("04_content", "claims.md");
    let escaping = project.root().join("../../../etc/passwd");

    c.bench_function("resolve_inside", |b| {
        b.iter(|| black_box(store.resolve(black_box(&inside)).is_ok()));
    });
    c.bench_function("resolve_escaping", |b| {
        b.iter(|| black_box(store.resolve(black_box(&escaping)).is_err()));
    });
    c.bench_function("stage_paths", |b| {
        b.iter(|| {
            for stage in registry::stages() {
                black_box(stage.output_paths(&project));
            }
        });
    });
}

criterion_group!(benches, resolve_benchmark);
criterion_main!(benches);
