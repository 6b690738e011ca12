/// What the loading indicator shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LoadProgress {
    #[default]
    Pending,
    Loading { loaded: u64, total: Option<u64> },
    Done,
    Failed(String),
}

impl LoadProgress {
    pub fn update(&mut self, loaded: u64, total: Option<u64>) {
        if matches!(self, LoadProgress::Done | LoadProgress::Failed(_)) {
            return;
        }
        *self = LoadProgress::Loading { loaded, total };
    }

    pub fn finish(&mut self) {
        *self = LoadProgress::Done;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        *self = LoadProgress::Failed(message.into());
    }

    /// Completed fraction in 0..=1, when the total size is known.
    pub fn ratio(&self) -> Option<f32> {
        match self {
            LoadProgress::Pending => Some(0.0),
            LoadProgress::Loading {
                loaded,
                total: Some(total),
            } if *total > 0 => Some((*loaded as f64 / *total as f64).clamp(0.0, 1.0) as f32),
            LoadProgress::Loading { .. } => None,
            LoadProgress::Done => Some(1.0),
            LoadProgress::Failed(_) => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            LoadProgress::Failed(_) => "LOADING FAILED".to_string(),
            LoadProgress::Loading { loaded, .. } if self.ratio().is_none() => {
                format!("LOADING {} bytes", loaded)
            }
            _ => {
                let percent = (self.ratio().unwrap_or(0.0) * 100.0).round() as u32;
                format!("LOADING {}/100", percent)
            }
        }
    }

    /// The indicator is hidden once the asset is in the scene.
    pub fn is_visible(&self) -> bool {
        !matches!(self, LoadProgress::Done)
    }

    pub fn draw_ui(&self, ui: &imgui::Ui, display_size: [f32; 2]) {
        if !self.is_visible() {
            return;
        }

        ui.window("Progress")
            .position(
                [display_size[0] * 0.5, display_size[1] * 0.5],
                imgui::Condition::Always,
            )
            .position_pivot([0.5, 0.5])
            .title_bar(false)
            .resizable(false)
            .movable(false)
            .always_auto_resize(true)
            .build(|| {
                ui.text(self.label());
                if let Some(ratio) = self.ratio() {
                    imgui::ProgressBar::new(ratio)
                        .size([200.0, 0.0])
                        .build(ui);
                }
                if let LoadProgress::Failed(message) = self {
                    ui.text_wrapped(message);
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_counts_up_to_one_hundred() {
        let mut progress = LoadProgress::default();
        assert_eq!(progress.label(), "LOADING 0/100");

        progress.update(1, Some(3));
        assert_eq!(progress.label(), "LOADING 33/100");

        progress.update(3, Some(3));
        assert_eq!(progress.label(), "LOADING 100/100");
    }

    #[test]
    fn ratio_is_clamped() {
        let mut progress = LoadProgress::default();
        progress.update(500, Some(100));
        assert_eq!(progress.ratio(), Some(1.0));
    }

    #[test]
    fn unknown_total_reports_bytes() {
        let mut progress = LoadProgress::default();
        progress.update(2048, None);
        assert_eq!(progress.ratio(), None);
        assert_eq!(progress.label(), "LOADING 2048 bytes");

        progress.update(10, Some(0));
        assert_eq!(progress.label(), "LOADING 10 bytes");
    }

    #[test]
    fn indicator_hides_when_done_and_stays_on_failure() {
        let mut progress = LoadProgress::default();
        progress.update(10, Some(10));
        assert!(progress.is_visible());

        progress.finish();
        assert!(!progress.is_visible());

        let mut failed = LoadProgress::default();
        failed.fail("No such file");
        assert!(failed.is_visible());
        assert_eq!(failed.label(), "LOADING FAILED");
    }

    #[test]
    fn late_progress_does_not_reopen_finished_load() {
        let mut progress = LoadProgress::default();
        progress.finish();
        progress.update(1, Some(2));
        assert_eq!(progress, LoadProgress::Done);
    }
}
