use crate::annotate::{annotate, AnnotatedTable, SplitSpec};
use crate::cluster::{cluster, ClusteringResult};
use crate::config::PipelineConfig;
use crate::dendrogram::{map_dendrogram, SegmentSet};
use crate::error::{Result, Stage};
use crate::logger::Logger;
use crate::reshape::{to_long, CategoryOrder, LongTable};
use crate::table::ObservationTable;
use crate::template::Template;

/// Everything the renderers need, plus the intermediate clustering.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub clustering: ClusteringResult,
    /// Clustered, annotated wide table
    pub annotated: AnnotatedTable,
    pub long: LongTable,
    pub segments: Option<SegmentSet>,
}

/// Measurement columns: configured ones, or every numeric column other
/// than the id and descriptor.
pub fn value_columns(config: &PipelineConfig, table: &ObservationTable) -> Vec<String> {
    if config.value_columns.is_empty() {
        table.numeric_columns(&[config.id_column.as_str(), config.descriptor_column.as_str()])
    } else {
        config.value_columns.clone()
    }
}

/// Every non-value column of the annotated table, row id first.
fn id_columns(config: &PipelineConfig, annotated: &ObservationTable, values: &[String]) -> Vec<String> {
    let mut ids = vec![config.id_column.clone()];
    ids.extend(
        annotated
            .headers()
            .iter()
            .filter(|h| **h != config.id_column && !values.contains(h))
            .cloned(),
    );
    ids
}

/// Cluster, annotate and reshape `table`.
pub fn run(config: &PipelineConfig, table: &ObservationTable, logger: &mut Logger) -> Result<PipelineOutput> {
    table.ensure_unique(&config.id_column, Stage::Reshape)?;
    let values = value_columns(config, table);
    let metric = config.metric()?;
    let linkage = config.linkage()?;
    let split = SplitSpec::parse(&config.split)?;
    let link = Template::parse(&config.link_template)?;
    let tooltip = Template::parse(&config.tooltip_template())?;
    let order = if config.category_order.is_empty() {
        CategoryOrder::new(values.iter().cloned())?
    } else {
        CategoryOrder::new(config.category_order.iter().cloned())?
    };

    logger.log(&format!("Value Columns: {}", values.join(",")))?;
    logger.log(&format!("Category Order: {}", order.levels().join(",")))?;
    logger.log_and_progress(&format!(
        "Clustering {} rows ({} distance, {} linkage)...",
        table.n_rows(),
        metric,
        linkage
    ))?;
    let clustering = cluster(table, &values, metric, linkage)?;
    let ordered = clustering.reorder(table)?;
    logger.log(&format!(
        "Leaf order: {}",
        clustering
            .order()
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",")
    ))?;

    logger.log_and_progress("Annotating rows...")?;
    let annotated = annotate(&ordered, &config.id_column, &config.descriptor_column, &split, &link)?;
    logger.log(&format!("Component fields: {}", annotated.components.join(",")))?;

    logger.log_and_progress("Reshaping to long format...")?;
    let id_columns = id_columns(config, &annotated.table, &values);
    logger.log(&format!("Id Columns: {}", id_columns.join(",")))?;
    let long = to_long(&annotated.table, &id_columns, &values, &order)?.with_tooltips(&tooltip)?;
    logger.log(&format!("Long table rows: {}", long.len()))?;

    let segments = if config.dendrogram.enabled {
        let set = map_dendrogram(&clustering, &config.dendrogram_options(order.len()))?;
        logger.log(&format!(
            "Dendrogram: {} edges, {} bars",
            set.edges.len(),
            set.bars.len()
        ))?;
        Some(set)
    } else {
        None
    };
    logger.finish_progress()?;

    Ok(PipelineOutput {
        clustering,
        annotated,
        long,
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::table::{read_table, LoadOptions};

    const EVENTS: &str = "id\tlocus\tt0\tt1\n\
                          E1\tchr1:100-200\t1\t2\n\
                          E2\tchr2:300-400\t3\t4\n\
                          E3\tchr1:500-600\t5\t6\n";

    fn events() -> ObservationTable {
        read_table(EVENTS.as_bytes(), &LoadOptions::default()).unwrap()
    }

    #[test]
    fn three_event_example() {
        let config = PipelineConfig::default();
        let out = run(&config, &events(), &mut Logger::silent()).unwrap();

        assert_eq!(out.clustering.merges().len(), 2);
        assert_eq!(out.long.len(), 6);
        let records = out.long.cell_records(&out.annotated.action_column).unwrap();
        let e1 = records.iter().find(|r| r.row_id == "E1").unwrap();
        assert!(e1.action.contains("chr1"));
        assert!(e1.action.contains("100-200"));
        assert_eq!(e1.tooltip, "E1 t0: 1");
        assert_eq!(out.segments.as_ref().map(|s| s.edges.len()), Some(4));
    }

    #[test]
    fn long_rows_follow_cluster_order() {
        let out = run(&PipelineConfig::default(), &events(), &mut Logger::silent()).unwrap();
        let expected: Vec<String> = out
            .clustering
            .order()
            .iter()
            .map(|&i| events().cell(i, 0).to_string())
            .collect();
        assert_eq!(out.long.row_ids(), expected);
    }

    #[test]
    fn explicit_category_order_and_disabled_dendrogram() {
        let mut config = PipelineConfig::default();
        config.category_order = vec!["t1".to_string(), "t0".to_string()];
        config.dendrogram.enabled = false;
        let out = run(&config, &events(), &mut Logger::silent()).unwrap();
        assert_eq!(out.long.categories().levels(), &["t1", "t0"]);
        assert_eq!(out.long.rows()[0].category, 0);
        assert!(out.segments.is_none());
    }

    #[test]
    fn repeated_identifier_is_rejected_before_clustering() {
        let table = read_table(
            "id\tlocus\tt0\nE1\tchr1:1-2\t1\nE1\tchr2:3-4\t9\nE3\tchr3:5-6\t4\n".as_bytes(),
            &LoadOptions::default(),
        )
        .unwrap();
        let err = run(&PipelineConfig::default(), &table, &mut Logger::silent()).unwrap_err();
        assert!(err.to_string().starts_with("[reshape]"));
        assert!(err.to_string().contains("'E1'"));
    }

    #[test]
    fn descriptor_columns_carry_into_long_table() {
        let table = read_table(
            "gene\tid\tlocus\tt0\tt1\n\
             Ptbp1\tE1\tchr1:1-2\t1\t2\n\
             Nova2\tE2\tchr2:3-4\t3\t4\n"
                .as_bytes(),
            &LoadOptions::default(),
        )
        .unwrap();
        let mut config = PipelineConfig::default();
        config.tooltip_template = Some("{id} ({gene}) {category}: {value}".to_string());
        let out = run(&config, &table, &mut Logger::silent()).unwrap();
        assert_eq!(
            out.long.id_columns(),
            &["id", "gene", "locus", "chrom", "start", "end", "action"]
        );
        let records = out.long.cell_records(&out.annotated.action_column).unwrap();
        let e2 = records.iter().find(|r| r.row_id == "E2" && r.category == "t1").unwrap();
        assert_eq!(e2.tooltip, "E2 (Nova2) t1: 4");
    }

    #[test]
    fn stage_errors_propagate() {
        let table = read_table(
            "id\tlocus\tt0\nE1\tchr1-100\t1\nE2\tchr1:1-2\t2\n".as_bytes(),
            &LoadOptions::default(),
        )
        .unwrap();
        let err = run(&PipelineConfig::default(), &table, &mut Logger::silent()).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedDescriptor { .. }));
    }
}
