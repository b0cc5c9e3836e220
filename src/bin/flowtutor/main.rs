use std::io::Write;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use flowtutor::chat::store::ConversationStore;
use flowtutor::chat::{CURRICULUM, find_topic};
use flowtutor::config::Config;
use flowtutor::error::TutorError;

#[derive(Parser)]
#[command(
    name = "flowtutor",
    about = "Learn workflow automation by chatting or talking with a tutor",
    long_about = "Flowtutor is a tutor for the Make (formerly Integromat) automation \
        platform. It walks through a curated curriculum in a text chat, streaming \
        answers and rendering the diagrams the tutor asks for, and offers a \
        realtime voice conversation over the Gemini Live API with gapless \
        playback and barge-in."
)]
struct Cli {
    /// Path to config file
    ///
    /// Defaults to ~/.config/flowtutor/config.yaml if not specified.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    ///
    /// Sets the log level to debug for the flowtutor crate, showing the
    /// connection lifecycle, playback scheduling, and API requests.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Talk with the tutor (foreground)
    ///
    /// Opens the microphone and speakers and holds a live spoken
    /// conversation. Speaking while the tutor talks interrupts it.
    /// Runs until interrupted with Ctrl+C.
    Voice,

    /// Chat with the tutor in the terminal
    ///
    /// Continues the saved conversation. Replies stream as they arrive
    /// and any diagrams the tutor requests are generated and saved
    /// next to the conversation.
    Chat {
        /// Start by selecting a curriculum topic (see `flowtutor topics`)
        #[arg(long)]
        topic: Option<String>,
    },

    /// List the curriculum topics
    Topics,

    /// Forget the saved conversation and active topic
    Clear,

    /// List available audio input devices
    ///
    /// Shows all audio input devices recognized by the system. Use --pick
    /// to interactively select one and save it to your config file, or
    /// use --set to write a device name directly.
    Devices {
        /// Write the chosen device name to the config file
        #[arg(long, conflicts_with = "pick")]
        set: Option<String>,

        /// Interactively pick a device and save it to the config file
        #[arg(long, conflicts_with = "set")]
        pick: bool,
    },

    /// Create a new configuration file
    ///
    /// Walks through an interactive setup for the API key, audio input,
    /// tutor voice, and where conversations are kept.
    Init,

    /// Generate shell completions
    ///
    /// Prints a completion script for the given shell to stdout.
    /// Source or install the output to enable tab completion.
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, elvish, powershell)
        shell: Shell,
    },
}

fn load_config(cli: &Cli) -> Result<Config, TutorError> {
    Config::load_or_default(cli.config.as_deref())
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(Config::default_path)
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("flowtutor=debug,info")
    } else {
        EnvFilter::new("flowtutor=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    install_completions_if_missing();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    // wss:// needs a process-wide crypto provider.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let result = run(cli);
    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

/// Auto-install shell completions for `$SHELL` if the completion file does not
/// already exist. Errors are ignored so a missing directory or an unsupported
/// shell never blocks normal operation.
fn install_completions_if_missing() {
    let Ok(shell_env) = std::env::var("SHELL") else {
        return;
    };

    let Some(home) = dirs::home_dir() else {
        return;
    };

    let (shell, path) = if shell_env.ends_with("/bash") {
        let dir = home.join(".local/share/bash-completion/completions");
        (Shell::Bash, dir.join("flowtutor"))
    } else if shell_env.ends_with("/zsh") {
        (Shell::Zsh, home.join(".zfunc/_flowtutor"))
    } else if shell_env.ends_with("/fish") {
        (
            Shell::Fish,
            home.join(".config/fish/completions/flowtutor.fish"),
        )
    } else {
        return;
    };

    if path.exists() {
        return;
    }

    if let Some(parent) = path.parent()
        && std::fs::create_dir_all(parent).is_err()
    {
        return;
    }

    let mut buf = Vec::new();
    generate(shell, &mut Cli::command(), "flowtutor", &mut buf);

    let _ = std::fs::write(&path, buf);
}

fn run(cli: Cli) -> Result<(), TutorError> {
    match cli.command {
        Command::Devices { ref set, pick } => run_devices(&cli, set.as_deref(), pick),
        Command::Init => run_init(&cli),
        Command::Topics => {
            print_topics();
            Ok(())
        }
        Command::Completions { shell } => {
            generate(
                shell,
                &mut Cli::command(),
                "flowtutor",
                &mut std::io::stdout(),
            );
            Ok(())
        }
        _ => run_with_config(cli),
    }
}

fn print_topics() {
    for topic in &CURRICULUM {
        println!("  {:<22} {} [{}]", topic.id, topic.title, topic.difficulty);
        println!("  {:<22} {}", "", topic.description);
    }
}

fn list_devices() -> Result<(Vec<String>, Option<String>), TutorError> {
    let devices = flowtutor::audio::capture::list_input_devices()?;
    let default_name = flowtutor::audio::capture::default_input_device_name();
    Ok((devices, default_name))
}

fn print_device_list(devices: &[String], default_name: Option<&str>) {
    for (i, name) in devices.iter().enumerate() {
        let marker = if default_name == Some(name.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("  {}: {name}{marker}", i + 1);
    }
}

fn run_devices(cli: &Cli, set: Option<&str>, pick: bool) -> Result<(), TutorError> {
    if let Some(device_name) = set {
        let path = config_path(cli);
        Config::set_input_device(&path, device_name)?;
        println!("Set input device to: {device_name}");
        return Ok(());
    }

    let (devices, default_name) = list_devices()?;

    if devices.is_empty() {
        println!("No audio input devices found.");
        return Ok(());
    }

    if pick {
        println!("Available audio input devices:");
        print_device_list(&devices, default_name.as_deref());
        println!();

        let input = prompt(&format!("Select device [1-{}]: ", devices.len()))?;
        let choice: usize = input
            .parse()
            .map_err(|_| TutorError::Other("invalid selection: enter a number".to_string()))?;

        if choice < 1 || choice > devices.len() {
            return Err(TutorError::Other(format!(
                "selection out of range: pick 1-{}",
                devices.len()
            )));
        }

        let selected = &devices[choice - 1];
        let path = config_path(cli);
        Config::set_input_device(&path, selected)?;
        println!("Set input device to: {selected}");
    } else {
        print_device_list(&devices, default_name.as_deref());
    }

    Ok(())
}

fn run_with_config(cli: Cli) -> Result<(), TutorError> {
    let config = load_config(&cli)?;

    match cli.command {
        Command::Voice => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(flowtutor::voice::run_voice_session(&config))
        }
        Command::Chat { topic } => {
            if let Some(id) = topic.as_deref()
                && find_topic(id).is_none()
            {
                return Err(TutorError::Config(format!(
                    "unknown topic: {id} (see `flowtutor topics`)"
                )));
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(flowtutor::tutoring::run_chat(&config, topic.as_deref()))
        }
        Command::Clear => {
            let store =
                ConversationStore::open(Config::expand_path(&config.storage.directory))?;
            store.clear()?;
            println!("Conversation cleared.");
            Ok(())
        }
        Command::Devices { .. }
        | Command::Init
        | Command::Topics
        | Command::Completions { .. } => unreachable!(),
    }
}

// ---------------------------------------------------------------------------
// Prompt helpers
// ---------------------------------------------------------------------------

fn prompt(msg: &str) -> Result<String, TutorError> {
    print!("{msg}");
    std::io::stdout()
        .flush()
        .map_err(|e| TutorError::Other(format!("failed to flush stdout: {e}")))?;
    let mut buf = String::new();
    std::io::stdin()
        .read_line(&mut buf)
        .map_err(|e| TutorError::Other(format!("failed to read input: {e}")))?;
    Ok(buf.trim().to_string())
}

fn prompt_default(msg: &str, default: &str) -> Result<String, TutorError> {
    let input = prompt(&format!("{msg} [{default}]: "))?;
    if input.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(input)
    }
}

fn prompt_yes_no(msg: &str, default_yes: bool) -> Result<bool, TutorError> {
    let hint = if default_yes { "Y/n" } else { "y/N" };
    let input = prompt(&format!("{msg} [{hint}]: "))?;
    if input.is_empty() {
        return Ok(default_yes);
    }
    match input.to_lowercase().as_str() {
        "y" | "yes" => Ok(true),
        "n" | "no" => Ok(false),
        _ => Ok(default_yes),
    }
}

fn yaml_section<'a>(
    root: &'a mut serde_yaml_ng::Mapping,
    key: &str,
) -> Result<&'a mut serde_yaml_ng::Mapping, TutorError> {
    let k = serde_yaml_ng::Value::String(key.to_string());
    root.entry(k)
        .or_insert_with(|| serde_yaml_ng::Value::Mapping(serde_yaml_ng::Mapping::new()))
        .as_mapping_mut()
        .ok_or_else(|| TutorError::Config(format!("{key} section is not a mapping")))
}

// ---------------------------------------------------------------------------
// flowtutor init
// ---------------------------------------------------------------------------

fn run_init(cli: &Cli) -> Result<(), TutorError> {
    use serde_yaml_ng::{Mapping, Value};

    let path = config_path(cli);

    if path.exists() {
        let overwrite = prompt_yes_no(
            &format!("Config file already exists at {}. Overwrite?", path.display()),
            false,
        )?;
        if !overwrite {
            println!("Aborted.");
            return Ok(());
        }
    }

    let defaults = Config::default();
    let mut root = Mapping::new();

    // API key
    println!();
    let api_key = prompt("Gemini API key (Enter to use GEMINI_API_KEY): ")?;
    if !api_key.is_empty() {
        root.insert(
            Value::String("api_key".to_string()),
            Value::String(api_key),
        );
    }

    // Audio device
    println!();
    if prompt_yes_no("Pick an audio input device?", true)? {
        let (devices, default_name) = list_devices()?;
        if devices.is_empty() {
            println!("No audio input devices found, skipping.");
        } else {
            println!("Available audio input devices:");
            print_device_list(&devices, default_name.as_deref());
            println!();
            let input = prompt(&format!(
                "Select device [1-{}] (Enter to skip): ",
                devices.len()
            ))?;
            if let Ok(choice) = input.parse::<usize>()
                && choice >= 1
                && choice <= devices.len()
            {
                let audio = yaml_section(&mut root, "audio")?;
                audio.insert(
                    Value::String("input_device".to_string()),
                    Value::String(devices[choice - 1].clone()),
                );
            }
        }
    }

    // Voice
    println!();
    let voice = prompt_default("Tutor voice", &defaults.live.voice)?;
    if voice != defaults.live.voice {
        let live = yaml_section(&mut root, "live")?;
        live.insert(Value::String("voice".to_string()), Value::String(voice));
    }

    // Diagrams
    println!();
    if !prompt_yes_no("Generate diagrams in text chat?", true)? {
        let chat = yaml_section(&mut root, "chat")?;
        chat.insert(Value::String("images".to_string()), Value::Bool(false));
    }

    // Storage
    println!();
    let dir = prompt_default("Conversation directory", &defaults.storage.directory)?;
    if dir != defaults.storage.directory {
        let storage = yaml_section(&mut root, "storage")?;
        storage.insert(Value::String("directory".to_string()), Value::String(dir));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            TutorError::Config(format!(
                "failed to create config directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    let yaml = serde_yaml_ng::to_string(&Value::Mapping(root))
        .map_err(|e| TutorError::Config(format!("failed to serialize config: {e}")))?;

    std::fs::write(&path, &yaml).map_err(|e| {
        TutorError::Config(format!(
            "failed to write config file {}: {e}",
            path.display()
        ))
    })?;

    println!();
    println!("Config written to {}", path.display());
    println!("Run `flowtutor chat` or `flowtutor voice` to start learning.");

    Ok(())
}
