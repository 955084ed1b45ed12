//! Candlestick chart over a [`SeriesView`]

use chrono::DateTime;
use egui::{Color32, RichText, Stroke, Ui};
use egui_plot::{BoxElem, BoxPlot, BoxSpread, Corner, GridMark, Legend, Plot, VLine};
use std::ops::RangeInclusive;

use crate::consumer::SeriesView;
use crate::index::SECONDS_PER_DAY;
use crate::types::Record;

pub const BULL_COLOR: Color32 = Color32::from_rgb(0, 255, 112);
pub const BEAR_COLOR: Color32 = Color32::from_rgb(217, 13, 79);

/// Candle body width as a fraction of one day
const BODY_WIDTH: f64 = 0.5;

/// Render settings for the chart
#[derive(Debug, Clone)]
pub struct CandlestickChart {
    pub show_grid: bool,
    pub height: Option<f32>,
}

impl Default for CandlestickChart {
    fn default() -> Self {
        Self {
            show_grid: true,
            height: None,
        }
    }
}

/// Body bounds of a candle, lower then upper
pub fn body(record: &Record) -> (f64, f64) {
    if record.open <= record.close {
        (record.open, record.close)
    } else {
        (record.close, record.open)
    }
}

pub fn candle_color(record: &Record) -> Color32 {
    if record.is_bearish() {
        BEAR_COLOR
    } else {
        BULL_COLOR
    }
}

/// Format an epoch-seconds value as a calendar date
pub fn format_date(timestamp: f64) -> String {
    if !timestamp.is_finite() {
        return String::new();
    }
    DateTime::from_timestamp(timestamp.floor() as i64, 0)
        .map(|dt| dt.format("%d/%m/%Y").to_string())
        .unwrap_or_default()
}

fn candle(record: &Record) -> BoxElem {
    let (lower, upper) = body(record);
    let color = candle_color(record);
    BoxElem::new(
        record.timestamp,
        BoxSpread::new(record.low, lower, (lower + upper) / 2.0, upper, record.high),
    )
    .name(format_date(record.timestamp))
    .box_width(SECONDS_PER_DAY * BODY_WIDTH)
    .whisker_width(0.0)
    .fill(color)
    .stroke(Stroke::new(1.0, color))
}

impl CandlestickChart {
    /// Draw the chart and a readout of the record under the pointer
    pub fn render(&self, ui: &mut Ui, view: &SeriesView) {
        let mut plot = Plot::new("ohlc_chart")
            .allow_zoom(true)
            .allow_drag(true)
            .show_axes(true)
            .show_grid(self.show_grid)
            .x_axis_label("Date")
            .y_axis_label("Price ($)")
            .x_axis_formatter(|mark: GridMark, _range: &RangeInclusive<f64>| {
                format_date(mark.value)
            })
            .y_axis_formatter(|mark: GridMark, _range: &RangeInclusive<f64>| {
                format!("${:.0}", mark.value)
            })
            .legend(Legend::default().position(Corner::LeftTop));
        if let Some(height) = self.height {
            plot = plot.height(height);
        }

        let response = plot.show(ui, |plot_ui| {
            if view.is_empty() {
                return None;
            }

            let (bull, bear): (Vec<_>, Vec<_>) =
                view.records().iter().partition(|record| !record.is_bearish());
            plot_ui.box_plot(BoxPlot::new("Rising", bull.into_iter().map(candle).collect()));
            plot_ui.box_plot(BoxPlot::new("Falling", bear.into_iter().map(candle).collect()));

            let pointer = plot_ui.pointer_coordinate()?;
            let hovered = view.hovered(pointer.x)?;
            plot_ui.vline(
                VLine::new("", hovered.timestamp)
                    .color(Color32::from_rgba_unmultiplied(128, 128, 128, 64))
                    .width(4.0),
            );
            Some(*hovered)
        });

        if response.response.hovered() {
            if let Some(record) = response.inner {
                response.response.on_hover_ui_at_pointer(|ui| readout(ui, &record));
            }
        }
    }
}

/// Date, volume and prices of one record
fn readout(ui: &mut Ui, record: &Record) {
    ui.label(RichText::new(format!("Date:   {}", format_date(record.timestamp))).monospace());
    ui.label(RichText::new(format!("Volume: {}", record.volume)).monospace());
    ui.label(RichText::new(format!("Open:   ${:.2}", record.open)).monospace());
    ui.label(RichText::new(format!("Close:  ${:.2}", record.close)).monospace());
    ui.label(RichText::new(format!("High:   ${:.2}", record.high)).monospace());
    ui.label(RichText::new(format!("Low:    ${:.2}", record.low)).monospace());
}
