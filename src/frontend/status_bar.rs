//! Status bar: feed state, channel and series stats

use egui::{Color32, RichText, Ui};
use std::time::Duration;

use crate::consumer::SeriesView;

/// A feed that delivered nothing for this long is shown as idle
pub const STALE_AFTER: Duration = Duration::from_secs(2);

/// State of the incoming feed as seen by the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Waiting,
    Receiving,
    Idle,
    Stopped,
}

impl FeedStatus {
    /// Classify from the time since the view last changed
    pub fn classify(stopped: bool, since_update: Option<Duration>) -> Self {
        if stopped {
            return FeedStatus::Stopped;
        }
        match since_update {
            None => FeedStatus::Waiting,
            Some(elapsed) if elapsed <= STALE_AFTER => FeedStatus::Receiving,
            Some(_) => FeedStatus::Idle,
        }
    }

    fn display(self) -> (Color32, &'static str) {
        match self {
            FeedStatus::Waiting => (Color32::YELLOW, "Waiting"),
            FeedStatus::Receiving => (Color32::GREEN, "Receiving"),
            FeedStatus::Idle => (Color32::GRAY, "Idle"),
            FeedStatus::Stopped => (Color32::RED, "Stopped"),
        }
    }
}

pub struct StatusBarContext<'a> {
    pub status: FeedStatus,
    pub channel: &'a str,
    pub stream_id: i32,
    pub view: &'a SeriesView,
}

pub fn render_status_bar(ui: &mut Ui, ctx: &StatusBarContext<'_>) {
    ui.horizontal(|ui| {
        ui.spacing_mut().item_spacing.x = 8.0;

        let (status_color, status_text) = ctx.status.display();
        ui.colored_label(status_color, "●");
        let feed = format!("{}: {} #{}", status_text, ctx.channel, ctx.stream_id);
        ui.label(RichText::new(feed).small());

        ui.separator();

        ui.label(RichText::new(format!("Records: {}", ctx.view.len())).small());

        ui.separator();

        ui.label(RichText::new(format!("Updates: {}", ctx.view.refreshes())).small());

        if let Some(latest) = ctx.view.latest() {
            ui.separator();
            let color = super::chart::candle_color(latest);
            ui.colored_label(color, RichText::new(format!("Last: ${:.2}", latest.close)).small());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_status_classification() {
        assert_eq!(FeedStatus::classify(false, None), FeedStatus::Waiting);
        assert_eq!(
            FeedStatus::classify(false, Some(Duration::from_millis(100))),
            FeedStatus::Receiving
        );
        assert_eq!(
            FeedStatus::classify(false, Some(Duration::from_secs(10))),
            FeedStatus::Idle
        );
        assert_eq!(FeedStatus::classify(true, None), FeedStatus::Stopped);
    }
}
