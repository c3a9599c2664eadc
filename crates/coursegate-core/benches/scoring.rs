use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use coursegate_core::model::{
    ContentItem, CourseStructure, Level, ModuleSpec, ProgressKey, ProgressRecord,
};
use coursegate_core::progress::compute_progress;
use coursegate_core::skill::{skill_delta, EvaluationKind};
use coursegate_core::tiering::tier_for;

fn make_course(modules: usize, items: usize) -> CourseStructure {
    CourseStructure {
        id: "bench".into(),
        name: "Bench".into(),
        level: Level::Intermediate,
        modules: (0..modules)
            .map(|i| ModuleSpec {
                title: format!("Module {i}"),
                level: None,
                content: (0..items)
                    .map(|j| ContentItem {
                        title: format!("Item {j}"),
                        kind: None,
                    })
                    .collect(),
                has_quiz: true,
            })
            .collect(),
        has_final: true,
    }
}

fn make_record(course: &CourseStructure, completed: usize) -> ProgressRecord {
    let now = Utc::now();
    let mut record = ProgressRecord::new(&ProgressKey::new("bench-user", &course.id), now);
    for m in 0..course.module_count() {
        for c in 0..course.content_count(m).unwrap_or(0) {
            record.mark_viewed(m, c, now);
        }
        if m < completed {
            record.record_module_attempt(m, 85.0, None, now);
        }
    }
    record.mark_viewed(completed.min(course.module_count() - 1), 0, now);
    record
}

fn bench_tier_for(c: &mut Criterion) {
    let mut group = c.benchmark_group("tier_for");

    group.bench_function("low", |b| b.iter(|| tier_for(black_box(5.0))));
    group.bench_function("excellent", |b| b.iter(|| tier_for(black_box(97.0))));
    group.bench_function("out_of_range", |b| b.iter(|| tier_for(black_box(140.0))));

    group.finish();
}

fn bench_progress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_progress");

    group.bench_function("modules=5,items=10", |b| {
        let course = make_course(5, 10);
        let record = make_record(&course, 2);
        b.iter(|| compute_progress(black_box(&record), black_box(&course), 99))
    });

    group.bench_function("modules=40,items=50", |b| {
        let course = make_course(40, 50);
        let record = make_record(&course, 20);
        b.iter(|| compute_progress(black_box(&record), black_box(&course), 99))
    });

    group.finish();
}

fn bench_skill_delta(c: &mut Criterion) {
    c.bench_function("skill_delta", |b| {
        b.iter(|| {
            skill_delta(
                black_box(3.2),
                black_box(Level::Advanced),
                black_box(88.0),
                black_box(EvaluationKind::Final),
            )
        })
    });
}

criterion_group!(benches, bench_tier_for, bench_progress, bench_skill_delta);
criterion_main!(benches);
