use facet::Facet;
use figue as args;
use lastcall::OverrideStore;

mod scenarios;

type AnyResult<T> = Result<T, String>;

const DEFAULT_CAPACITY: usize = 4;

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    /// Buffer size of the channels the scenario creates.
    #[facet(args::named, default)]
    capacity: Option<usize>,
    /// Print the overrides still installed as JSON once the scenario finishes.
    #[facet(args::named, default)]
    dump_store: bool,
    #[facet(args::subcommand)]
    command: CommandKind,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum CommandKind {
    /// A worker pool drains its queue, then every worker sees the shutdown value.
    DrainThenOverride,
    /// Multi-way receive where only one channel carries an override.
    SelectOverride,
    /// Close and receive through `&dyn Reflect`, including rejected closes.
    ReflectRecv,
    /// Cancelling an override brings back the plain closed behaviour.
    CancelRestores,
}

pub(crate) struct Config {
    pub(crate) capacity: usize,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> AnyResult<()> {
    let cli = parse_cli()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = Config {
        capacity: cli.capacity.unwrap_or(DEFAULT_CAPACITY),
    };
    tracing::info!(scenario = ?cli.command, capacity = cfg.capacity, "running scenario");

    dispatch_command(&cfg, cli.command).await?;

    if cli.dump_store {
        let snapshot = OverrideStore::global().snapshot();
        let json = facet_json::to_string(&snapshot)
            .map_err(|e| format!("failed to serialise override store: {e}"))?;
        println!("{json}");
    }
    Ok(())
}

fn parse_cli() -> AnyResult<Cli> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("lastcall-examples")
                .description("Run close-with-value scenarios as subcommands")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();

    args::Driver::new(figue_config)
        .run()
        .into_result()
        .map(|v| v.value)
        .map_err(|e| e.to_string())
}

async fn dispatch_command(cfg: &Config, command: CommandKind) -> AnyResult<()> {
    match command {
        CommandKind::DrainThenOverride => scenarios::drain_then_override::run(cfg).await,
        CommandKind::SelectOverride => scenarios::select_override::run(cfg).await,
        CommandKind::ReflectRecv => scenarios::reflect_recv::run(cfg).await,
        CommandKind::CancelRestores => scenarios::cancel_restores::run(cfg).await,
    }
}
