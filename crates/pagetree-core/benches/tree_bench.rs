//! # Tree Benchmarks
//!
//! Performance benchmarks for pagetree-core operations.
//!
//! Run with: `cargo bench -p pagetree-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use pagetree_core::{
    Ancestors, NodeDraft, NodeId, NodeStore, Position, RequestContext, Session,
};
use std::hint::black_box;

/// A parked session with `sections` top-level pages of `per_section` children each.
fn create_site(sections: usize, per_section: usize) -> (Session, Vec<NodeId>) {
    let admin = RequestContext::admin("bench");
    let mut session = Session::new();
    session.park(&[]).expect("park");
    let root = session
        .store()
        .get_by_path("/")
        .expect("get")
        .map(|n| n.id)
        .expect("root");

    let mut section_ids = Vec::with_capacity(sections);
    for s in 0..sections {
        let section = session
            .insert(&admin, root, NodeDraft::new(format!("section-{}", s)))
            .expect("insert");
        for p in 0..per_section {
            session
                .insert(&admin, section.id, NodeDraft::new(format!("page-{}", p)))
                .expect("insert");
        }
        section_ids.push(section.id);
    }
    (session, section_ids)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for size in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(create_site(1, size)));
        });
    }

    group.finish();
}

fn bench_subtree_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("subtree_scan");

    for size in [100, 1000].iter() {
        let (session, _) = create_site(10, size / 10);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(session.store().scan_subtree("/section-3")));
        });
    }

    group.finish();
}

fn bench_cursor_ancestors(c: &mut Criterion) {
    let (session, _) = create_site(10, 100);
    let anon = RequestContext::anonymous();

    c.bench_function("cursor_ancestors_children", |b| {
        b.iter(|| {
            black_box(
                session
                    .find(&anon)
                    .path("/section-5/page-50")
                    .ancestors(Ancestors::All)
                    .ancestors_children(true)
                    .to_object(),
            )
        });
    });
}

fn bench_move_subtree(c: &mut Criterion) {
    let mut group = c.benchmark_group("move_subtree");
    let admin = RequestContext::admin("bench");

    for size in [10, 100, 500].iter() {
        let (mut session, sections) = create_site(2, *size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                session
                    .move_node(&admin, sections[0], sections[1], Position::Inside)
                    .expect("move");
                session
                    .move_node(&admin, sections[0], sections[1], Position::Before)
                    .expect("move back");
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_subtree_scan,
    bench_cursor_ancestors,
    bench_move_subtree,
);
criterion_main!(benches);
