use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use spark_contracts::chat::{parse_intent, Session, CHAT_HELP_COMMANDS, EXPORT_FILE_NAME};
use spark_contracts::events::{new_session_id, EventWriter};
use spark_contracts::generation::{validate_credential, GenerationRequest, Scheduler};
use spark_engine::{
    generated_image_filename, load_attachment, resolve_prompt, Clipboard, EngineConfig,
    NoClipboard, NoVoiceInput, ProviderMode, RenderMode, Rendered, SleepPacer, SparkEngine,
};

#[derive(Debug, Parser)]
#[command(name = "spark", version, about = "Multi Spark: chat, vision and text-to-image")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat session.
    Chat(ChatArgs),
    /// Send one prompt (optionally with an image) and print the reply.
    Ask(AskArgs),
    /// Generate images from a prompt.
    Imagine(ImagineArgs),
}

#[derive(Debug, Args)]
struct EngineArgs {
    /// Append structured session events to this JSONL file.
    #[arg(long)]
    events: Option<PathBuf>,
    /// Use offline providers instead of Gemini and Replicate.
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    text_model: Option<String>,
    #[arg(long)]
    vision_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
    /// Delay between streamed words, in milliseconds.
    #[arg(long)]
    stream_delay_ms: Option<u64>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    engine: EngineArgs,
    /// Image provider token (defaults to REPLICATE_API_TOKEN).
    #[arg(long)]
    token: Option<String>,
}

#[derive(Debug, Parser)]
struct AskArgs {
    #[command(flatten)]
    engine: EngineArgs,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    image: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ImagineArgs {
    #[command(flatten)]
    engine: EngineArgs,
    #[arg(long, default_value = spark_contracts::generation::DEFAULT_IMAGE_PROMPT)]
    prompt: String,
    #[arg(long, default_value_t = 1024)]
    width: u32,
    #[arg(long, default_value_t = 1024)]
    height: u32,
    #[arg(long, default_value_t = 1)]
    count: u32,
    #[arg(long, default_value = "K_EULER")]
    scheduler: String,
    #[arg(long, default_value_t = 50)]
    steps: u32,
    #[arg(long, default_value_t = 0.8)]
    strength: f64,
    /// Image provider token (defaults to REPLICATE_API_TOKEN).
    #[arg(long)]
    token: Option<String>,
    /// Save each generated image into this directory.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Print a self-contained HTML download link for each image.
    #[arg(long)]
    links: bool,
}

const REFERENCE_DISPLAY_MAX_CHARS: usize = 96;

fn main() {
    let _ = dotenvy::dotenv();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("spark error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Ask(args) => run_ask(args),
        Command::Imagine(args) => run_imagine(args),
    }
}

fn build_engine(args: &EngineArgs) -> Result<SparkEngine> {
    let mut config = EngineConfig::from_env();
    if args.dryrun {
        config.provider_mode = ProviderMode::Dryrun;
    }
    if let Some(model) = args.text_model.clone() {
        config.text_model = model;
    }
    if let Some(model) = args.vision_model.clone() {
        config.vision_model = model;
    }
    if let Some(model) = args.image_model.clone() {
        config.image_model = model;
    }
    if let Some(millis) = args.stream_delay_ms {
        config.stream_delay = Duration::from_millis(millis);
    }
    let session_id = new_session_id();
    let events = match args.events.as_ref() {
        Some(path) => EventWriter::new(path, session_id),
        None => EventWriter::disabled(session_id),
    };
    SparkEngine::new(config, events)
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let engine = build_engine(&args.engine)?;
    let clipboard = NoClipboard;
    let mut voice = NoVoiceInput;
    let mut session = Session::new();
    let mut image_request = GenerationRequest::default();
    let mut token = args
        .token
        .clone()
        .or_else(|| engine.config().replicate_api_token.clone());

    let stdin = io::stdin();
    let mut line = String::new();

    println!("Multi Spark chat started. Type /help for commands.");
    match engine.events().path() {
        Some(path) => println!(
            "Session {} logging to {}",
            engine.events().session_id(),
            path.display()
        ),
        None => println!("Session {}", engine.events().session_id()),
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);

        match intent.action.as_str() {
            "noop" | "chat" => {
                let Some(prompt) = resolve_prompt(intent.prompt.as_deref(), &mut voice) else {
                    continue;
                };
                chat_turn(&engine, &mut session, &prompt, &clipboard)?;
            }
            "help" => {
                println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
            }
            "reset" => {
                engine.reset(&mut session);
                println!("Started a new chat.");
            }
            "attach_image" => {
                let Some(path) = value_as_non_empty_string(intent.command_args.get("path")) else {
                    println!("/image requires a path");
                    continue;
                };
                match load_attachment(Path::new(&path)) {
                    Ok(image) => {
                        println!("Attached {} for your next message.", image.name);
                        session.attach_image(image);
                    }
                    Err(err) => println!("Attach failed: {err:#}"),
                }
            }
            "describe" => {
                let requested = value_as_non_empty_string(intent.command_args.get("path"));
                let image = match requested {
                    Some(path) => match load_attachment(Path::new(&path)) {
                        Ok(image) => image,
                        Err(err) => {
                            println!("Describe failed: {err:#}");
                            continue;
                        }
                    },
                    None => match session.pending_image().cloned() {
                        Some(image) => image,
                        None => {
                            println!("/describe requires a path (or attach one with /image)");
                            continue;
                        }
                    },
                };
                println!("Thinking...");
                match engine.describe(&mut session, &image) {
                    Ok(description) => {
                        println!("> {description}");
                        clipboard.offer(&description);
                    }
                    Err(err) => println!("{err}"),
                }
            }
            "export" => {
                if session.is_empty() {
                    println!("Nothing to export yet.");
                    continue;
                }
                let path = value_as_non_empty_string(intent.command_args.get("path"))
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(EXPORT_FILE_NAME));
                write_export(&path, &engine.export(&session))?;
                println!("Chat exported to {}", path.display());
            }
            "imagine" => {
                let request = match intent.prompt.as_deref() {
                    Some(prompt) => image_request.with_prompt(prompt),
                    None => image_request.clone(),
                };
                println!("Generating ({})...", request.summary());
                match engine.generate_images(&mut session, &request, token.as_deref()) {
                    Ok(images) => print_generated(&images),
                    Err(err) => println!("{err}"),
                }
            }
            "list_images" => {
                if session.generated_images().is_empty() {
                    println!("No generated images yet.");
                } else {
                    print_generated(session.generated_images());
                }
            }
            "set_image_setting" => {
                for (name, value) in &intent.settings_update {
                    let raw = value.as_str().unwrap_or_default();
                    match image_request.apply_setting(name, raw) {
                        Ok(()) => println!("Image settings: {}", image_request.summary()),
                        Err(err) => println!("/{name}: {err}"),
                    }
                }
            }
            "set_token" => {
                let value = value_as_non_empty_string(intent.command_args.get("token"));
                match validate_credential(value.as_deref()) {
                    Ok(valid) => {
                        token = Some(valid.to_string());
                        println!("Token set.");
                    }
                    Err(err) => println!("Enter valid token: {err}"),
                }
            }
            "unknown" => {
                let command = value_as_non_empty_string(intent.command_args.get("command"))
                    .unwrap_or_default();
                println!("Unknown command /{command}. Type /help for commands.");
            }
            other => {
                println!("Unhandled action: {other}");
            }
        }
    }

    Ok(())
}

fn run_ask(args: AskArgs) -> Result<i32> {
    let engine = build_engine(&args.engine)?;
    let mut session = Session::new();
    if let Some(path) = args.image.as_ref() {
        session.attach_image(load_attachment(path)?);
    }
    let prompt = resolve_prompt(Some(args.prompt.as_str()), &mut NoVoiceInput);
    match engine.chat(&mut session, prompt.as_deref()) {
        Ok(outcome) => {
            print_reply(&engine, &args.prompt, &outcome.text)?;
            Ok(0)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(1)
        }
    }
}

fn run_imagine(args: ImagineArgs) -> Result<i32> {
    let engine = build_engine(&args.engine)?;
    let scheduler: Scheduler = match args.scheduler.parse() {
        Ok(scheduler) => scheduler,
        Err(err) => {
            eprintln!("{err}");
            return Ok(2);
        }
    };
    let request = GenerationRequest {
        prompt: args.prompt.clone(),
        width: args.width,
        height: args.height,
        num_outputs: args.count,
        scheduler,
        steps: args.steps,
        strength: args.strength,
    };

    let job = engine.run_image_job(&request, args.token.as_deref());
    let trail = job.trail().join(" -> ");
    let images = match job.into_result() {
        Ok(images) => images,
        Err(err) => {
            eprintln!("{err}");
            eprintln!("job: {trail}");
            return Ok(1);
        }
    };
    print_generated(&images);

    for (idx, url) in images.iter().enumerate() {
        let filename = generated_image_filename(idx);
        if let Some(dir) = args.out.as_ref() {
            let destination = dir.join(&filename);
            if engine.downloader().download_file(url, &destination) {
                println!("Saved {}", destination.display());
            } else {
                println!("Download failed: {filename}");
            }
        }
        if args.links {
            println!("{}", engine.downloader().image_download_link(url, &filename));
        }
    }
    Ok(0)
}

fn chat_turn(
    engine: &SparkEngine,
    session: &mut Session,
    prompt: &str,
    clipboard: &dyn Clipboard,
) -> Result<()> {
    println!("Thinking...");
    match engine.chat(session, Some(prompt)) {
        Ok(outcome) => {
            print_reply(engine, prompt, &outcome.text)?;
            clipboard.offer(&outcome.text);
        }
        Err(err) => println!("{err}"),
    }
    Ok(())
}

fn print_reply(engine: &SparkEngine, prompt: &str, text: &str) -> Result<()> {
    let mut stdout = io::stdout();
    match engine
        .renderer()
        .render(text, RenderMode::for_prompt(prompt), SleepPacer)
    {
        Rendered::Block(body) => {
            writeln!(stdout, "```\n{}\n```", body.trim_end())?;
        }
        Rendered::Stream(chunks) => {
            for chunk in chunks {
                write!(stdout, "{chunk}")?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn print_generated(images: &[String]) {
    for (idx, url) in images.iter().enumerate() {
        println!(
            "Image {} ({}): {}",
            idx + 1,
            generated_image_filename(idx),
            display_reference(url)
        );
    }
}

fn write_export(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

fn display_reference(url: &str) -> String {
    if url.chars().count() <= REFERENCE_DISPLAY_MAX_CHARS {
        return url.to_string();
    }
    let head: String = url.chars().take(REFERENCE_DISPLAY_MAX_CHARS).collect();
    format!("{head}… ({} chars)", url.chars().count())
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    let raw = value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}
