use textplots::{Chart, Plot, Shape};

/// Chart width in dots; traces longer than this are averaged down.
const CHART_WIDTH: u32 = 256;
const CHART_HEIGHT: u32 = 32;

/// Terminal line chart of a per-batch accuracy trace.
pub struct AccuracyPlot {
    values: Vec<f32>,
}

impl AccuracyPlot {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Renders the trace against its batch index, preceded by a title line.
    pub fn render(&self, title: &str) -> String {
        if self.values.is_empty() {
            return title.to_string();
        }

        let points = smooth_values(&self.values, CHART_WIDTH as usize);
        let chart = Chart::new(
            CHART_WIDTH,
            CHART_HEIGHT,
            0.0,
            self.values.len().max(1) as f32,
        )
        .lineplot(&Shape::Lines(&points))
        .to_string();

        format!("{title}\n{chart}")
    }
}

/// Averages the trace over fixed windows so at most `size_approx` points are
/// plotted, keeping the x coordinate of each point at the start of its window.
fn smooth_values(values: &[f32], size_approx: usize) -> Vec<(f32, f32)> {
    let window = values.len().div_ceil(size_approx);

    values
        .chunks(window)
        .enumerate()
        .map(|(i, chunk)| {
            let mean = chunk.iter().sum::<f32>() / chunk.len() as f32;
            ((i * window) as f32, mean)
        })
        .collect()
}
