//! Subcommand handlers for suggest, generate, studio and config actions.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::args::ConfigAction;
use crate::config::{self, Config, DEFAULT_CONFIG_TEMPLATE};
use crate::genai::{
    AspectRatio, GenAiClient, GenerationRequest, PollOptions, PromptSuggester, VideoGenerator,
    VideoJobClient,
};
use crate::lifecycle::{ControllerError, GenerationController, LifecycleSnapshot, LifecycleState};
use crate::media::{self, ImageInput};

/// Format seconds as `m:ss`.
pub fn format_elapsed(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Resolve a studio step 2 answer: a suggestion number or a custom prompt.
///
/// Returns `None` for a blank answer or an out-of-range number.
pub fn choose_prompt(input: &str, suggestions: &[String]) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    match input.parse::<usize>() {
        Ok(n) if (1..=suggestions.len()).contains(&n) => Some(suggestions[n - 1].clone()),
        Ok(_) => None,
        Err(_) => Some(input.to_string()),
    }
}

/// Build the API client from the environment credential and config.
pub fn build_client(cfg: &Config) -> Result<GenAiClient, String> {
    let api_key = config::api_key_from_env().map_err(|e| {
        format!(
            "{}.\n\n\
            Add your API key to a .env file:\n    \
                echo 'API_KEY=your-api-key-here' >> .env\n\n\
            Or set it as an environment variable:\n    \
                export API_KEY=\"your-api-key-here\"",
            e
        )
    })?;
    GenAiClient::from_config(api_key, &cfg.api)
        .map_err(|e| format!("Failed to create API client: {}", e))
}

async fn load_image(path: Option<&Path>) -> Result<Option<ImageInput>, String> {
    match path {
        Some(path) => media::encode_file(path).await.map(Some).map_err(|e| e.to_string()),
        None => Ok(None),
    }
}

/// Print numbered suggestions for an idea.
pub async fn run_suggest(cfg: &Config, idea: &str, image: Option<&Path>) -> Result<(), String> {
    let client = build_client(cfg)?;
    let image = load_image(image).await?;
    let suggester = PromptSuggester::new(client);

    let prompts = suggester
        .suggest(idea, image.as_ref())
        .await
        .map_err(|e| format!("Failed to get suggestions: {}", e))?;

    if prompts.is_empty() {
        println!("Enter an idea or pass --image to get suggestions.");
        return Ok(());
    }
    for (i, prompt) in prompts.iter().enumerate() {
        println!("{}. {}", i + 1, prompt);
        println!();
    }
    Ok(())
}

/// Cancel an in-flight generation on Ctrl+C; exit otherwise.
///
/// Can only be installed once per process.
fn install_ctrlc_handler<G>(controller: Arc<GenerationController<G>>) -> Result<(), String>
where
    G: VideoGenerator + 'static,
{
    ctrlc::set_handler(move || {
        if controller.state() == LifecycleState::Loading {
            eprintln!("\nReceived Ctrl+C, cancelling generation...");
            controller.reset();
        } else {
            eprintln!("\nReceived Ctrl+C, exiting.");
            std::process::exit(130);
        }
    })
    .map_err(|e| format!("Failed to install Ctrl+C handler: {}", e))
}

/// Render Loading snapshots as a single updating stderr line.
fn spawn_progress(mut updates: watch::Receiver<LifecycleSnapshot>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if snapshot.state != LifecycleState::Loading {
                break;
            }
            eprint!(
                "\r\x1b[2K{} ({})",
                snapshot.status_message,
                format_elapsed(snapshot.elapsed_secs)
            );
            std::io::stderr().flush().ok();
        }
    })
}

/// Run one generation while showing progress.
async fn generate_with_progress<G: VideoGenerator>(
    controller: &GenerationController<G>,
    request: GenerationRequest,
) -> Result<LifecycleState, ControllerError> {
    let progress = spawn_progress(controller.subscribe());
    let result = controller.generate(request).await;
    progress.abort();
    eprintln!();
    result
}

/// Save the controller's video to `dest`.
fn save_video<G>(controller: &GenerationController<G>, dest: &Path) -> Result<PathBuf, String> {
    controller
        .with_video(|video| video.save(dest))
        .ok_or_else(|| "No video to save".to_string())?
        .map_err(|e| format!("Failed to save video to {}: {}", dest.display(), e))
}

fn job_client(cfg: &Config) -> Result<VideoJobClient, String> {
    let client = build_client(cfg)?;
    Ok(VideoJobClient::with_options(
        client,
        PollOptions::from(&cfg.generation),
    ))
}

/// Generate a single video and write it to `output`.
pub async fn run_generate(
    cfg: &Config,
    prompt: &str,
    image: Option<&Path>,
    aspect_ratio: Option<AspectRatio>,
    output: Option<PathBuf>,
) -> Result<(), String> {
    let controller = Arc::new(GenerationController::new(job_client(cfg)?));
    install_ctrlc_handler(Arc::clone(&controller))?;

    let mut request = GenerationRequest::new(prompt);
    if let Some(image) = load_image(image).await? {
        request = request.with_image(image);
    }
    if let Some(ratio) = aspect_ratio.or(cfg.generation.aspect_ratio) {
        request = request.with_aspect_ratio(ratio);
    }
    let output = output.unwrap_or_else(|| PathBuf::from(&cfg.output.filename));

    println!("Generating video for: \"{}\"", prompt);
    match generate_with_progress(&controller, request).await {
        Ok(LifecycleState::Success) => {
            let saved = save_video(&controller, &output)?;
            println!("Saved: {}", saved.display());
            controller.reset();
            Ok(())
        }
        Ok(_) => Err(controller
            .error()
            .unwrap_or_else(|| "Video generation failed".to_string())),
        Err(e) => Err(e.to_string()),
    }
}

/// Line-oriented stdin prompter for the studio flow.
struct Prompter {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompter {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Ask a question. Returns `None` at end of input.
    async fn ask(&mut self, question: &str) -> Result<Option<String>, String> {
        print!("{} ", question);
        std::io::stdout().flush().ok();
        self.lines
            .next_line()
            .await
            .map(|line| line.map(|l| l.trim().to_string()))
            .map_err(|e| format!("Failed to read input: {}", e))
    }

    /// Ask with a default shown in brackets; a blank answer keeps it.
    async fn ask_with_default(&mut self, question: &str, current: &str) -> Result<Option<String>, String> {
        let question = if current.is_empty() {
            format!("{}:", question)
        } else {
            format!("{} [{}]:", question, current)
        };
        Ok(self.ask(&question).await?.map(|answer| {
            if answer.is_empty() {
                current.to_string()
            } else {
                answer
            }
        }))
    }
}

/// Interactive flow: idea, pick a prompt, refine, generate, save.
pub async fn run_studio(
    cfg: &Config,
    image: Option<PathBuf>,
    aspect_ratio: Option<AspectRatio>,
) -> Result<(), String> {
    let client = build_client(cfg)?;
    let suggester = PromptSuggester::new(client.clone());
    let controller = Arc::new(GenerationController::new(VideoJobClient::with_options(
        client,
        PollOptions::from(&cfg.generation),
    )));
    install_ctrlc_handler(Arc::clone(&controller))?;

    let mut prompter = Prompter::new();
    let mut idea = String::new();
    let mut image_path = image
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let mut ratio = aspect_ratio
        .or(cfg.generation.aspect_ratio)
        .unwrap_or(AspectRatio::Widescreen);

    println!("veo-director studio. Press Ctrl+D to quit.");
    loop {
        // Step 1: idea and optional image
        println!();
        println!("Step 1: Describe your idea");
        let Some(answer) = prompter.ask_with_default("Idea", &idea).await? else {
            break;
        };
        idea = answer;
        let Some(answer) = prompter
            .ask_with_default("Reference image path (optional, '-' for none)", &image_path)
            .await?
        else {
            break;
        };
        image_path = if answer == "-" { String::new() } else { answer };

        let image = match load_image((!image_path.is_empty()).then(|| Path::new(&image_path))).await {
            Ok(image) => image,
            Err(e) => {
                println!("Error: {}", e);
                continue;
            }
        };
        if idea.is_empty() && image.is_none() {
            println!("Enter an idea or an image to get suggestions.");
            continue;
        }

        println!("Getting suggestions...");
        let suggestions = match suggester.suggest(&idea, image.as_ref()).await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                println!("Error: {}", e);
                continue;
            }
        };

        // Step 2: pick a suggestion or type a custom prompt
        println!();
        println!("Step 2: Choose a prompt");
        for (i, suggestion) in suggestions.iter().enumerate() {
            println!("  {}. {}", i + 1, suggestion);
        }
        let prompt = loop {
            let Some(answer) = prompter
                .ask("Pick a number or type your own prompt:")
                .await?
            else {
                return Ok(());
            };
            if let Some(prompt) = choose_prompt(&answer, &suggestions) {
                break prompt;
            }
        };

        // Step 3: refine and generate
        println!();
        println!("Step 3: Refine and generate");
        let Some(prompt) = prompter.ask_with_default("Prompt", &prompt).await? else {
            break;
        };
        let Some(answer) = prompter
            .ask_with_default("Aspect ratio (16:9 or 9:16)", ratio.as_str())
            .await?
        else {
            break;
        };
        match answer.parse::<AspectRatio>() {
            Ok(parsed) => ratio = parsed,
            Err(e) => println!("{}; keeping {}", e, ratio),
        }

        let mut request = GenerationRequest::new(prompt).with_aspect_ratio(ratio);
        if let Some(image) = image {
            request = request.with_image(image);
        }

        match generate_with_progress(&controller, request).await {
            Ok(LifecycleState::Success) => {
                println!("Your video is ready!");
                loop {
                    let Some(choice) = prompter
                        .ask("[s]ave, [n]ew video, [q]uit:")
                        .await?
                    else {
                        controller.reset();
                        return Ok(());
                    };
                    match choice.to_ascii_lowercase().as_str() {
                        "s" | "save" => match save_video(&controller, Path::new(&cfg.output.filename)) {
                            Ok(saved) => println!("Saved: {}", saved.display()),
                            Err(e) => println!("Error: {}", e),
                        },
                        "n" | "new" => {
                            controller.reset();
                            idea.clear();
                            image_path.clear();
                            break;
                        }
                        "q" | "quit" => {
                            controller.reset();
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            }
            Ok(_) => {
                println!(
                    "Error: {}",
                    controller.error().unwrap_or_else(|| "Video generation failed".to_string())
                );
                println!("Adjust your inputs and try again.");
            }
            Err(e) => println!("{}", e),
        }
    }

    controller.reset();
    Ok(())
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, config_path: Option<&Path>) -> Result<(), String> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(config::default_path);

    match action {
        ConfigAction::Show => {
            let cfg = Config::load(Some(&config_path)).map_err(|e| e.to_string())?;
            println!("Current configuration:");
            println!("  Base URL: {}", cfg.api.base_url);
            println!("  Text model: {}", cfg.api.text_model);
            println!("  Video model: {}", cfg.api.video_model);
            println!("  Poll interval: {}s", cfg.generation.poll_interval().as_secs());
            match cfg.generation.max_wait_secs {
                Some(secs) => println!("  Max wait: {}s", secs),
                None => println!("  Max wait: unlimited"),
            }
            println!(
                "  Aspect ratio: {}",
                cfg.generation
                    .aspect_ratio
                    .map(|r| r.as_str())
                    .unwrap_or("model default")
            );
            println!("  Output file: {}", cfg.output.filename);
            println!(
                "  API key: {}",
                if config::api_key_from_env().is_ok() { "set" } else { "not set" }
            );
            println!();

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
            Ok(())
        }
        ConfigAction::Init => {
            if config_path.exists() {
                return Err(format!(
                    "Config file already exists: {}\nUse 'veo-director config show' to view current settings.",
                    config_path.display()
                ));
            }

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Error creating config directory: {}", e))?;
            }

            std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)
                .map_err(|e| format!("Error writing config file: {}", e))?;

            println!("Created config file: {}", config_path.display());
            Ok(())
        }
    }
}
