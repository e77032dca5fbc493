//! Batch-assignment partition properties.

use logictree::assign_batch;

#[test]
fn ten_tasks_over_three_ranks_split_four_three_three() {
    let counts: Vec<usize> = (0..3).map(|rank| assign_batch(10, 3, rank).len()).collect();
    assert_eq!(counts.iter().sum::<usize>(), 10);
    let mut sorted = counts.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![3, 3, 4]);

    let mut owned = vec![0u32; 10];
    for rank in 0..3 {
        for index in assign_batch(10, 3, rank) {
            owned[index] += 1;
        }
    }
    assert!(owned.iter().all(|&n| n == 1));
}

#[test]
fn every_shape_partitions_exactly_once() {
    for num_tasks in 0..80 {
        for size in 1..12 {
            let mut owned = vec![0u32; num_tasks];
            for rank in 0..size {
                for index in assign_batch(num_tasks, size, rank) {
                    owned[index] += 1;
                }
            }
            assert!(
                owned.iter().all(|&n| n == 1),
                "gap or overlap for T={num_tasks}, P={size}"
            );
        }
    }
}

#[test]
fn block_sizes_differ_by_at_most_one() {
    for num_tasks in [0, 1, 7, 100, 1013] {
        for size in [1, 2, 5, 16] {
            let lens: Vec<usize> = (0..size)
                .map(|rank| assign_batch(num_tasks, size, rank).len())
                .collect();
            let max = lens.iter().max().unwrap();
            let min = lens.iter().min().unwrap();
            assert!(max - min <= 1, "unbalanced for T={num_tasks}, P={size}");
        }
    }
}

#[test]
fn ranks_beyond_task_count_own_empty_blocks() {
    for rank in 5..9 {
        assert!(assign_batch(5, 9, rank).is_empty());
    }
    // the first five ranks own one task each
    for rank in 0..5 {
        assert_eq!(assign_batch(5, 9, rank).len(), 1);
    }
}
