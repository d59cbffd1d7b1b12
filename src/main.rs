use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use dynamic_forms::{ComponentRegistry, FormInstance, Mounted, mount};
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dynamic-forms")]
#[command(about = "Resolve and mount dynamic form components")]
struct Cli {
    #[command(flatten)]
    mode: ModeArgs,

    /// Additional component definition files (.toml)
    definitions: Vec<PathBuf>,

    /// Do not register the built-in forms
    #[arg(long)]
    no_builtins: bool,

    /// Field value applied before validation, as FIELD=VALUE
    #[arg(long = "set", value_name = "FIELD=VALUE", requires = "mount")]
    set: Vec<String>,

    /// Give up on a slow component load after this many milliseconds
    #[arg(long, value_name = "MS", requires = "mount")]
    timeout: Option<u64>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ModeArgs {
    /// List registered component keys
    #[arg(long, short)]
    list: bool,

    /// Resolve and mount a component, then print its output and validation result
    #[arg(long, short, value_name = "KEY")]
    mount: Option<String>,

    /// Start interactive session for mounting and filling in forms
    #[arg(long, short)]
    interactive: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered component keys
    List,
    /// Resolve and mount a component
    Mount { key: String },
    /// Set a field on the mounted form
    Set { field: String, value: String },
    /// Validate the mounted form
    Validate,
    /// Print the mounted form's values
    Value,
    /// Unmount the current form
    Unmount,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut builder = ComponentRegistry::builder();
    if !cli.no_builtins {
        builder = builder.with_builtin_forms();
    }
    for path in &cli.definitions {
        builder = builder.load_file(path);
    }
    let registry = builder.build()?;

    if cli.mode.list {
        for key in registry.keys() {
            println!("- {key}");
        }
    } else if let Some(key) = &cli.mode.mount {
        run_mount(&registry, key, &cli.set, cli.timeout).await?;
    } else if cli.mode.interactive {
        run_interactive_session(&registry).await?;
    }

    Ok(())
}

async fn run_mount(
    registry: &ComponentRegistry,
    key: &str,
    assignments: &[String],
    timeout: Option<u64>,
) -> Result<()> {
    let token = CancellationToken::new();
    if let Some(ms) = timeout {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            token.cancel();
        });
    }

    println!("Resolving {key}...");
    let definition = registry.resolve_cancellable(key, &token).await?;
    let mounted = mount(&definition);
    print!("{}", mounted.output());

    let Some(instance) = mounted.instance().get() else {
        println!("Component '{key}' did not register an instance.");
        return Ok(());
    };
    for assignment in assignments {
        let (field, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Expected FIELD=VALUE, got '{assignment}'"))?;
        instance.set_field(field, parse_value(value))?;
    }
    print_validation(instance.as_ref());
    println!("{}", serde_json::to_string_pretty(&instance.value())?);
    Ok(())
}

async fn run_interactive_session(registry: &ComponentRegistry) -> Result<()> {
    println!(
        "Registry has {} components. Type 'help' for commands.",
        registry.len()
    );
    let mut current: Option<Mounted> = None;
    let mut rl = Editor::<(), DefaultHistory>::new()?;
    loop {
        let readline = rl.readline("> ");
        match readline {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                if handle_command(line, registry, &mut current).await.is_err() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err:?}");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_command(
    line: String,
    registry: &ComponentRegistry,
    current: &mut Option<Mounted>,
) -> Result<(), ()> {
    let parts = parse_quoted_args(&line);

    let Some(command_str) = parts.first() else {
        return Ok(());
    };
    let command = match command_str.as_str() {
        "list" => Some(Commands::List),
        "mount" => parts.get(1).map_or_else(
            || {
                eprintln!("Usage: mount <key>");
                None
            },
            |key| Some(Commands::Mount { key: key.clone() }),
        ),
        "set" => match (parts.get(1), parts.get(2)) {
            (Some(field), Some(value)) => Some(Commands::Set {
                field: field.clone(),
                value: value.clone(),
            }),
            _ => {
                eprintln!("Usage: set <field> <value>");
                None
            }
        },
        "validate" => Some(Commands::Validate),
        "value" => Some(Commands::Value),
        "unmount" => Some(Commands::Unmount),
        "help" => {
            println!("Available commands:");
            println!("  list                    - List registered component keys");
            println!("  mount <key>             - Resolve and mount a component");
            println!("  set <field> <value>     - Set a field on the mounted form");
            println!("  validate                - Validate the mounted form");
            println!("  value                   - Print the mounted form's values");
            println!("  unmount                 - Unmount the current form");
            println!("  help                    - Show this help message");
            println!("  exit, quit              - Exit the interactive session");
            None
        }
        "exit" | "quit" => return Err(()),
        _ => {
            eprintln!("Unknown command. Type 'help' for a list of commands.");
            None
        }
    };

    let Some(command) = command else {
        return Ok(());
    };
    match command {
        Commands::List => {
            for key in registry.keys() {
                println!("- {key}");
            }
        }
        Commands::Mount { key } => {
            println!("Resolving {key}...");
            match registry.resolve(&key).await {
                Ok(definition) => {
                    // Replacing the previous mount tears it down
                    let mounted = mount(&definition);
                    print!("{}", mounted.output());
                    *current = Some(mounted);
                }
                Err(e) => eprintln!("Error: {:#}", anyhow::Error::from(e)),
            }
        }
        Commands::Set { field, value } => {
            if let Some(instance) = mounted_instance(current) {
                if let Err(e) = instance.set_field(&field, parse_value(&value)) {
                    eprintln!("Error: {e}");
                }
            }
        }
        Commands::Validate => {
            if let Some(instance) = mounted_instance(current) {
                print_validation(instance.as_ref());
            }
        }
        Commands::Value => {
            if let Some(instance) = mounted_instance(current) {
                match serde_json::to_string_pretty(&instance.value()) {
                    Ok(json) => println!("{json}"),
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
        }
        Commands::Unmount => match current.take() {
            Some(mounted) => {
                println!("Unmounted {}", mounted.component_name());
                mounted.unmount();
            }
            None => eprintln!("Nothing is mounted."),
        },
    }
    Ok(())
}

fn mounted_instance(
    current: &Option<Mounted>,
) -> Option<std::sync::Arc<dyn FormInstance>> {
    let Some(mounted) = current else {
        eprintln!("Nothing is mounted. Use 'mount <key>' first.");
        return None;
    };
    let instance = mounted.instance().get();
    if instance.is_none() {
        eprintln!(
            "Component '{}' has not registered an instance.",
            mounted.component_name()
        );
    }
    instance
}

fn print_validation(instance: &dyn FormInstance) {
    match instance.validate() {
        Ok(()) => println!("Valid."),
        Err(errors) => {
            println!("Invalid:");
            for error in &errors.errors {
                println!("- {error}");
            }
        }
    }
}

/// Parse as any valid JSON value, falling back to a string.
fn parse_value(raw: &str) -> serde_json::Value {
    let trimmed = raw.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| serde_json::Value::String(trimmed.to_string()))
}

fn parse_quoted_args(line: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote_char: Option<char> = None;

    for ch in line.trim().chars() {
        match (ch, quote_char) {
            ('"', None) | ('\'', None) => {
                quote_char = Some(ch);
            }
            (ch, Some(open_char)) if ch == open_char => {
                quote_char = None;
            }
            (' ', None) => {
                if !current.is_empty() {
                    parts.push(current);
                    current = String::new();
                }
            }
            (ch, _) => {
                current.push(ch);
            }
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
