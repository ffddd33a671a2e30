//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::genai::AspectRatio;

/// Parse an aspect ratio ("16:9" or "9:16")
pub fn parse_aspect_ratio(s: &str) -> Result<AspectRatio, String> {
    s.parse()
}

/// veo-director: AI video director for the terminal
#[derive(Parser, Debug)]
#[command(name = "veo-director")]
#[command(version, about = "Turn ideas into AI-generated videos")]
#[command(long_about = "Expand a rough idea (and optionally a reference image) into \
    detailed video prompts, then generate a video from the chosen prompt and save it \
    locally.")]
#[command(after_help = "EXAMPLES:
    # Get three detailed prompt suggestions for an idea
    veo-director suggest \"a cat driving a sports car\"

    # Base suggestions on a reference image
    veo-director suggest \"make it rain\" --image street.jpg

    # Generate a vertical video and save it
    veo-director generate \"a lighthouse in a storm\" --aspect-ratio 9:16 -o storm.mp4

    # Interactive idea -> prompt -> video flow
    veo-director studio

ENVIRONMENT:
    API_KEY    Generative Language API key (may be placed in .env)
    RUST_LOG   Log filter, e.g. veo_director=debug")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Expand an idea into three detailed video prompts
    Suggest {
        /// The rough idea to expand
        #[arg(default_value = "")]
        idea: String,

        /// Reference image the suggestions should be based on
        #[arg(long, short)]
        image: Option<PathBuf>,
    },

    /// Generate a video from a prompt and save it
    Generate {
        /// The text prompt describing the video
        prompt: String,

        /// Reference image to animate
        #[arg(long, short)]
        image: Option<PathBuf>,

        /// Aspect ratio: 16:9 or 9:16
        #[arg(long, short, value_parser = parse_aspect_ratio)]
        aspect_ratio: Option<AspectRatio>,

        /// Output file (default from config, else ai-generated-video.mp4)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Interactive flow: idea, pick a suggestion, generate
    Studio {
        /// Reference image used for suggestions and generation
        #[arg(long, short)]
        image: Option<PathBuf>,

        /// Aspect ratio: 16:9 or 9:16
        #[arg(long, short, value_parser = parse_aspect_ratio)]
        aspect_ratio: Option<AspectRatio>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}
