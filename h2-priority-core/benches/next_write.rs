//! Write loop benchmarks: select the next stream and count its write.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use h2_priority_core::tree::{Node, NodeStatus, PriorityTree, StatusUpdate, WriteCountAction};

fn build_tree(width: u32, depth: u32) -> PriorityTree<u32> {
    let tree = PriorityTree::new();
    let mut next_id = 1;
    let mut level = vec![0];
    for _ in 0..depth {
        let mut next_level = Vec::new();
        for &parent in &level {
            for i in 0..width {
                let id = next_id;
                next_id += 2;
                let node = Node::new(id)
                    .with_weight((i % 256 + 1) as u16)
                    .with_status(NodeStatus::RequestingWrite)
                    .with_payload(id);
                tree.add(node, parent, false);
                next_level.push(id);
            }
        }
        level = next_level;
    }
    tree
}

fn bench_write_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_loop");
    for width in [4u32, 16, 64] {
        let tree = build_tree(width, 1);
        group.bench_with_input(BenchmarkId::new("flat", width), &tree, |b, tree| {
            b.iter(|| {
                let id = tree.next_write_entry().unwrap();
                tree.update(id, StatusUpdate::NoChange, WriteCountAction::Increment, None);
                black_box(id)
            })
        });
    }
    group.finish();
}

fn bench_reprioritize(c: &mut Criterion) {
    let tree = build_tree(8, 3);
    let mut flip = false;
    c.bench_function("change_parent_nested", |b| {
        b.iter(|| {
            flip = !flip;
            let parent = if flip { 3 } else { 5 };
            black_box(tree.change_parent(1, 32, parent, flip))
        })
    });
}

criterion_group!(benches, bench_write_loop, bench_reprioritize);
criterion_main!(benches);
