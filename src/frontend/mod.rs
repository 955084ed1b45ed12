//! Live candlestick viewer
//!
//! The viewer is a pure consumer of the [`TimeSeriesStore`]: each frame it
//! refreshes its [`SeriesView`] (which only copies when the ready signal is
//! set) and draws from that copy. Closing the window cancels the shared
//! token so the ingest thread winds down too.

pub mod chart;
pub mod status_bar;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::consumer::SeriesView;
use crate::store::TimeSeriesStore;
use chart::CandlestickChart;
use status_bar::{render_status_bar, FeedStatus, StatusBarContext};

pub const WINDOW_TITLE: &str = "OHLCV Relay";

pub struct ViewerApp {
    store: Arc<TimeSeriesStore>,
    cancel: CancelToken,
    view: SeriesView,
    chart: CandlestickChart,
    channel: String,
    stream_id: i32,
    refresh_interval: Duration,
    last_update: Option<Instant>,
}

impl ViewerApp {
    pub fn new(
        store: Arc<TimeSeriesStore>,
        cancel: CancelToken,
        channel: impl Into<String>,
        stream_id: i32,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            store,
            cancel,
            view: SeriesView::new(),
            chart: CandlestickChart::default(),
            channel: channel.into(),
            stream_id,
            refresh_interval,
            last_update: None,
        }
    }

    pub fn view(&self) -> &SeriesView {
        &self.view
    }

    fn status(&self) -> FeedStatus {
        FeedStatus::classify(
            self.cancel.is_cancelled(),
            self.last_update.map(|at| at.elapsed()),
        )
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.view.refresh(&self.store) {
            self.last_update = Some(Instant::now());
        }

        // Ctrl-C in the terminal also closes the window
        if self.cancel.is_cancelled() {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            render_status_bar(
                ui,
                &StatusBarContext {
                    status: self.status(),
                    channel: &self.channel,
                    stream_id: self.stream_id,
                    view: &self.view,
                },
            );
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.view.is_empty() {
                ui.centered_and_justified(|ui| {
                    ui.label("Waiting for data...");
                });
            } else {
                self.chart.render(ui, &self.view);
            }
        });

        ctx.request_repaint_after(self.refresh_interval);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        tracing::debug!(records = self.view.len(), "Viewer closed");
        self.cancel.cancel();
    }
}

/// Open the viewer window and block until it is closed
pub fn run(app: ViewerApp) -> eframe::Result<()> {
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_min_inner_size([640.0, 400.0])
            .with_title(WINDOW_TITLE),
        ..Default::default()
    };

    eframe::run_native(WINDOW_TITLE, native_options, Box::new(|_cc| Ok(Box::new(app))))
}
