use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use heatlink::{
    annotate, cluster, map_dendrogram, recover_descriptor, to_long, CategoryOrder,
    DendrogramOptions, DistanceMetric, Linkage, ObservationTable, SplitSpec, Template,
};

fn random_table(rng: &mut StdRng, rows: usize, cols: usize) -> ObservationTable {
    let mut headers = vec!["id".to_string(), "locus".to_string()];
    headers.extend((0..cols).map(|c| format!("t{c}")));
    let rows = (0..rows)
        .map(|r| {
            let start: u32 = rng.gen_range(1..1_000_000);
            let mut row = vec![
                format!("E{r}"),
                format!("chr{}:{}-{}", rng.gen_range(1..23), start, start + rng.gen_range(1..5000)),
            ];
            // integers keep ties likely
            row.extend((0..cols).map(|_| rng.gen_range(0..6).to_string()));
            row
        })
        .collect();
    ObservationTable::new(headers, rows).unwrap()
}

fn value_columns(cols: usize) -> Vec<String> {
    (0..cols).map(|c| format!("t{c}")).collect()
}

#[test]
fn leaf_order_is_a_contiguous_permutation() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..40 {
        let n = rng.gen_range(2..14);
        let cols = rng.gen_range(1..5);
        let table = random_table(&mut rng, n, cols);
        for linkage in [Linkage::Ward, Linkage::Complete, Linkage::Single, Linkage::Average] {
            for metric in [DistanceMetric::Euclidean, DistanceMetric::Manhattan] {
                let result = cluster(&table, &value_columns(cols), metric, linkage).unwrap();
                let mut sorted = result.order().to_vec();
                sorted.sort_unstable();
                assert_eq!(sorted, (0..n).collect::<Vec<_>>());
                assert_eq!(result.merges().len(), n - 1);
                assert!(result.has_contiguous_subtrees(), "{linkage} {metric}");
            }
        }
    }
}

#[test]
fn dendrogram_has_two_edges_per_merge_right_of_grid() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..30 {
        let n = rng.gen_range(2..20);
        let cols = rng.gen_range(1..6);
        let table = random_table(&mut rng, n, cols);
        let result = cluster(&table, &value_columns(cols), DistanceMetric::Euclidean, Linkage::Ward).unwrap();
        let options = DendrogramOptions {
            axis_length: cols,
            padding: rng.gen_range(0.0..0.5),
            ..DendrogramOptions::default()
        };
        let set = map_dendrogram(&result, &options).unwrap();
        assert_eq!(set.edges.len(), 2 * (n - 1));
        for s in set.iter() {
            assert!(s.x >= cols as f64 && s.xend >= cols as f64);
            assert!(s.y >= 1.0 && s.yend <= n as f64);
        }
    }
}

#[test]
fn action_string_round_trips_to_descriptor() {
    let mut rng = StdRng::seed_from_u64(3);
    let split = SplitSpec::parse(&[":=chrom,rest", "-=start,end"]).unwrap();
    let link = Template::parse(
        "https://genome.ucsc.edu/cgi-bin/hgTracks?db=hg19&position={chrom}:{start}-{end}&hgt.out=<{id}>",
    )
    .unwrap();
    let table = random_table(&mut rng, 50, 2);
    let annotated = annotate(&table, "id", "locus", &split, &link).unwrap();
    let action_idx = annotated.table.column_index("action", heatlink::Stage::Annotate).unwrap();
    for row in 0..table.n_rows() {
        let action = annotated.table.cell(row, action_idx);
        assert!(!action.contains('<') && !action.contains('"'));
        assert_eq!(
            recover_descriptor(&split, &link, action).as_deref(),
            Some(table.cell(row, 1))
        );
    }
}

#[test]
fn long_format_ignores_value_column_order_but_follows_category_order() {
    let mut rng = StdRng::seed_from_u64(5);
    let table = random_table(&mut rng, 6, 4);
    let ids = vec!["id".to_string()];
    let values = value_columns(4);
    let order = CategoryOrder::new(["t2", "t0", "t3", "t1"]).unwrap();

    let base = to_long(&table, &ids, &values, &order).unwrap();
    assert_eq!(base.len(), 6 * 4);

    let mut shuffled = values.clone();
    shuffled.shuffle(&mut rng);
    assert_eq!(to_long(&table, &ids, &shuffled, &order).unwrap(), base);

    let reversed = to_long(&table, &ids, &values, &order.reversed()).unwrap();
    let blocks = |long: &heatlink::LongTable| -> Vec<Vec<(String, String)>> {
        long.rows()
            .chunks(6)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|r| (r.ids[0].clone(), long.categories().label(r.category).to_string()))
                    .collect()
            })
            .collect()
    };
    let mut expected = blocks(&base);
    expected.reverse();
    assert_eq!(blocks(&reversed), expected);
}

#[test]
fn long_row_count_is_rows_times_columns() {
    let mut rng = StdRng::seed_from_u64(9);
    for _ in 0..20 {
        let n = rng.gen_range(1..15);
        let cols = rng.gen_range(1..7);
        let table = random_table(&mut rng, n, cols);
        let values = value_columns(cols);
        let order = CategoryOrder::new(values.iter().cloned()).unwrap();
        let long = to_long(&table, &["id".to_string(), "locus".to_string()], &values, &order).unwrap();
        assert_eq!(long.len(), n * cols);
        for id in long.row_ids() {
            let count = long.rows().iter().filter(|r| r.ids[0] == id).count();
            assert_eq!(count, cols);
        }
    }
}
