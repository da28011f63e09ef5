//! Command-line arguments and their translation into configuration and
//! per-job edits.

use std::path::PathBuf;

use clap::Parser;
use veditor_compositor::CompositorConfig;
use veditor_core::effects::{preset_color, Rgb};
use veditor_core::job::ParamEdit;
use veditor_core::media::{MediaFile, MediaKind};
use veditor_orchestrator::OrchestratorConfig;

/// Replace the background of one or more videos using the remote
/// compositing service.
#[derive(Debug, Parser)]
#[command(name = "veditor", version)]
pub struct Cli {
    /// Videos to process (.mp4, .mov or .avi).
    #[arg(required = true)]
    pub videos: Vec<PathBuf>,

    /// Origin of the compositing service.
    #[arg(long, env = "VEDITOR_SERVICE_URL")]
    pub service_url: Option<String>,

    /// Background colour as R,G,B.
    #[arg(long, value_parser = parse_color, conflicts_with = "preset")]
    pub color: Option<Rgb>,

    /// Named background colour: green, blue, white or black.
    #[arg(long, value_parser = parse_preset)]
    pub preset: Option<Rgb>,

    /// Background image (.jpg, .jpeg or .png). Applied after the colour.
    #[arg(long)]
    pub background: Option<PathBuf>,

    /// Background blur in percent (0-100).
    #[arg(long, allow_negative_numbers = true)]
    pub blur: Option<i64>,

    /// Lighting adjustment in percent (0-100).
    #[arg(long, allow_negative_numbers = true)]
    pub lighting: Option<i64>,

    /// Render a single-frame preview of every video before processing.
    #[arg(long)]
    pub preview: bool,

    /// Stop after the previews; do not submit anything for processing.
    #[arg(long, requires = "preview")]
    pub preview_only: bool,

    /// Download finished videos into this directory.
    #[arg(long)]
    pub download: Option<PathBuf>,

    /// Server-side output directory sent with each submission.
    #[arg(long, env = "VEDITOR_OUTPUT_DIR")]
    pub output_dir: Option<String>,

    /// Maximum number of uploads in flight.
    #[arg(long, env = "VEDITOR_MAX_CONCURRENT_SUBMISSIONS")]
    pub max_concurrent: Option<usize>,
}

impl Cli {
    /// Environment-derived client config with flag overrides applied.
    pub fn compositor_config(&self) -> CompositorConfig {
        let mut config = CompositorConfig::from_env();
        if let Some(url) = &self.service_url {
            config.base_url = CompositorConfig::with_base_url(url).base_url;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = Some(dir.clone());
        }
        config
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::from_env();
        if let Some(max) = self.max_concurrent {
            config.max_concurrent_submissions = max.max(1);
        }
        config
    }

    /// The edits every queued video receives, in application order.
    ///
    /// Loads the background image, so an unreadable or unsupported file
    /// is reported before anything is uploaded.
    pub async fn edits(&self) -> anyhow::Result<Vec<ParamEdit>> {
        let mut edits = Vec::new();
        if let Some(color) = self.color.or(self.preset) {
            edits.push(ParamEdit::BackgroundColor(color));
        }
        if let Some(path) = &self.background {
            let image = MediaFile::load(MediaKind::BackgroundImage, path).await?;
            edits.push(ParamEdit::BackgroundImage(image));
        }
        if let Some(blur) = self.blur {
            edits.push(ParamEdit::BlurRadius(blur));
        }
        if let Some(lighting) = self.lighting {
            edits.push(ParamEdit::LightingStrength(lighting));
        }
        Ok(edits)
    }
}

fn parse_color(s: &str) -> Result<Rgb, String> {
    Rgb::parse(s).map_err(|e| e.to_string())
}

fn parse_preset(s: &str) -> Result<Rgb, String> {
    preset_color(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_colour_and_effects() {
        let cli = Cli::try_parse_from([
            "veditor", "--color", "10, 20, 30", "--blur", "35", "--lighting", "50", "a.mp4",
            "b.mov",
        ])
        .unwrap();
        assert_eq!(cli.color, Some(Rgb::new(10, 20, 30)));
        assert_eq!(cli.blur, Some(35));
        assert_eq!(cli.videos.len(), 2);
    }

    #[test]
    fn preset_and_color_conflict() {
        let result = Cli::try_parse_from(["veditor", "--color", "1,2,3", "--preset", "blue", "a.mp4"]);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_preset_is_rejected() {
        assert!(Cli::try_parse_from(["veditor", "--preset", "mauve", "a.mp4"]).is_err());
    }

    #[test]
    fn preview_only_requires_preview() {
        assert!(Cli::try_parse_from(["veditor", "--preview-only", "a.mp4"]).is_err());
        assert!(Cli::try_parse_from(["veditor", "--preview", "--preview-only", "a.mp4"]).is_ok());
    }

    #[tokio::test]
    async fn edits_follow_flag_order() {
        let cli = Cli::try_parse_from(["veditor", "--preset", "white", "--lighting", "80", "a.mp4"])
            .unwrap();
        let edits = cli.edits().await.unwrap();
        assert_eq!(edits.len(), 2);
        assert!(matches!(edits[0], ParamEdit::BackgroundColor(c) if c == Rgb::new(255, 255, 255)));
        assert!(matches!(edits[1], ParamEdit::LightingStrength(80)));
    }
}
