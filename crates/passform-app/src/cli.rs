// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use passform_core::{OverlayRect, Rotation};

#[derive(Parser, Debug)]
#[command(name = "passform")]
#[command(author, version, about = "Check camera frames against a document template")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a single image and print the result as JSON.
    Check {
        /// Reference template image.
        template: PathBuf,
        /// Image to validate.
        image: PathBuf,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Feed a directory of images through the stream analyzer.
    Replay {
        /// Reference template image.
        template: PathBuf,
        /// Directory of frames, replayed in file-name order.
        dir: PathBuf,
        /// Frames per second to submit.
        #[arg(long, default_value_t = 10.0)]
        fps: f64,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Analyze the platform camera until it stops delivering frames.
    Live {
        /// Reference template image.
        template: PathBuf,
        /// Frames per second to submit.
        #[arg(long, default_value_t = 10.0)]
        fps: f64,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Alignment guide as `x,y,width,height` in upright frame pixels.
    #[arg(long, value_parser = parse_overlay)]
    pub overlay: Option<OverlayRect>,
    /// JSON configuration file; missing keys keep their defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Clockwise degrees needed to bring frames upright.
    #[arg(long, default_value_t = 0, value_parser = parse_rotation)]
    pub rotation: i32,
}

impl CommonArgs {
    pub fn rotation(&self) -> Rotation {
        Rotation::from_degrees(self.rotation)
    }
}

fn parse_overlay(raw: &str) -> Result<OverlayRect, String> {
    let values = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("overlay must be four numbers: {e}"))?;
    match values.as_slice() {
        &[x, y, w, h] if w > 0.0 && h > 0.0 => Ok(OverlayRect::new(x, y, w, h)),
        &[_, _, _, _] => Err("overlay width and height must be positive".into()),
        _ => Err(format!("expected x,y,width,height, got {} values", values.len())),
    }
}

fn parse_rotation(raw: &str) -> Result<i32, String> {
    match raw.parse::<i32>() {
        Ok(d @ (0 | 90 | 180 | 270)) => Ok(d),
        Ok(d) => Err(format!("rotation must be 0, 90, 180 or 270, got {d}")),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn overlay_parses_four_numbers() {
        assert_eq!(
            parse_overlay("10, 20,300,200").unwrap(),
            OverlayRect::new(10.0, 20.0, 300.0, 200.0)
        );
        assert!(parse_overlay("1,2,3").is_err());
        assert!(parse_overlay("1,2,0,4").is_err());
        assert!(parse_overlay("a,b,c,d").is_err());
    }

    #[test]
    fn replay_arguments() {
        let cli = Cli::try_parse_from([
            "passform", "replay", "card.png", "frames", "--fps", "5", "--rotation", "90",
        ])
        .unwrap();
        let Commands::Replay { fps, common, dir, .. } = cli.command else {
            panic!("expected replay");
        };
        assert_eq!(fps, 5.0);
        assert_eq!(dir, PathBuf::from("frames"));
        assert_eq!(common.rotation(), Rotation::Deg90);
        assert!(common.overlay.is_none());
    }

    #[test]
    fn live_arguments() {
        let cli = Cli::try_parse_from(["passform", "live", "card.png", "--overlay", "0,0,640,400"]).unwrap();
        let Commands::Live { template, fps, common } = cli.command else {
            panic!("expected live");
        };
        assert_eq!(template, PathBuf::from("card.png"));
        assert_eq!(fps, 10.0);
        assert_eq!(common.overlay, Some(OverlayRect::new(0.0, 0.0, 640.0, 400.0)));
    }

    #[test]
    fn odd_rotation_is_rejected() {
        assert!(Cli::try_parse_from(["passform", "check", "a.png", "b.png", "--rotation", "45"]).is_err());
    }
}
