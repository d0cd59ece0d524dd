//! Segment charts and console reports using Plotters

use crate::linkage::MergeTree;
use crate::model::{PipelineSnapshot, SnapshotSummary};
use plotters::prelude::*;
use std::path::{Path, PathBuf};

/// Color palette for segments, reused cyclically past its length
const SEGMENT_COLORS: [RGBColor; 6] = [RED, BLUE, GREEN, MAGENTA, CYAN, RGBColor(255, 140, 0)];

fn segment_color(label: usize) -> RGBColor {
    SEGMENT_COLORS[(label - 1) % SEGMENT_COLORS.len()]
}

/// `base` with `suffix` appended to its file stem, keeping the extension (png if none)
fn sibling_path(base: &str, suffix: &str) -> PathBuf {
    let base = Path::new(base);
    let stem = base.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let extension = base.extension().map(|e| e.to_string_lossy()).unwrap_or("png".into());
    base.with_file_name(format!("{}{}.{}", stem, suffix, extension))
}

/// Bar chart of customers per segment
pub fn create_cluster_size_chart(summary: &SnapshotSummary, output_path: &str) -> anyhow::Result<()> {
    let max_size = summary.cluster_sizes.iter().copied().max().unwrap_or(1).max(1) as f64;

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Segment Sizes", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0.5f64..(summary.k as f64 + 0.5), 0f64..(max_size * 1.1))?;

    chart
        .configure_mesh()
        .x_desc("Segment")
        .y_desc("Number of Customers")
        .x_labels(summary.k)
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (i, &size) in summary.cluster_sizes.iter().enumerate() {
        let label = i + 1;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(label as f64 - 0.4, 0.0), (label as f64 + 0.4, size as f64)],
            segment_color(label).filled(),
        )))?;
    }

    root.present()?;
    println!("Segment size chart saved to: {}", output_path);

    Ok(())
}

/// Merge height against merge index; a sharp rise marks a natural cut
pub fn create_merge_height_chart(tree: &MergeTree, output_path: &str) -> anyhow::Result<()> {
    let heights = tree.heights();
    let steps = heights.len().max(1) as f64;
    let top = heights.iter().copied().fold(0.0, f64::max).max(1e-6);

    let root = BitMapBackend::new(output_path, (800, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Dendrogram Merge Heights", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..steps, 0f64..(top * 1.1))?;

    chart
        .configure_mesh()
        .x_desc("Merge")
        .y_desc("Gower Distance")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(LineSeries::new(
        heights.iter().enumerate().map(|(i, &h)| (i as f64, h)),
        &BLUE,
    ))?;
    chart.draw_series(
        heights
            .iter()
            .enumerate()
            .map(|(i, &h)| Circle::new((i as f64, h), 3, BLUE.filled())),
    )?;

    root.present()?;
    println!("Merge height chart saved to: {}", output_path);

    Ok(())
}

/// Print segment statistics to console
pub fn print_segment_statistics(summary: &SnapshotSummary) {
    println!("\n=== Segment Statistics ===");
    println!("Number of segments: {}", summary.k);
    println!("Total customers: {}", summary.n);
    println!("Linkage: {}", summary.linkage);
    println!("Reference date: {}", summary.reference_date);
    println!("Normalization: {}", summary.normalization);

    println!("\n  Segment |  Size |  Share | Tenure (d) | Tier       | Gender   | Location");
    println!("  --------|-------|--------|------------|------------|----------|---------");
    for segment in &summary.segments {
        let share = segment.size as f64 / summary.n.max(1) as f64 * 100.0;
        println!(
            "  {:7} | {:5} | {:5.1}% | {:10.1} | {:10} | {:8} | {}",
            segment.label,
            segment.size,
            share,
            segment.mean_tenure_days,
            segment.dominant_tier,
            segment.dominant_gender,
            segment.dominant_location
        );
    }
}

/// Write both charts next to `base_output_path` and print statistics
pub fn generate_visualization_report(
    snapshot: &PipelineSnapshot,
    base_output_path: &str,
) -> anyhow::Result<()> {
    let summary = snapshot.summary()?;

    create_cluster_size_chart(&summary, base_output_path)?;

    let heights_path = sibling_path(base_output_path, "_heights");
    create_merge_height_chart(snapshot.tree(), &heights_path.to_string_lossy())?;

    print_segment_statistics(&summary);

    Ok(())
}
