use anyhow::{Context, Result};
use clap::Parser;
use llm_client::client::{ChatClient, EmbeddingClient};
use llm_client::config::{ChatConfig, ClientConfig, EmbeddingConfig};
use llm_client::runtime::{RealRuntime, Runtime};
use llm_client::tokenizer;
use std::path::PathBuf;

/// llm-client - chat completion and embeddings from the command line
///
/// Requests are retried with exponential backoff on rate limiting (429) and
/// other API errors.
///
/// Environment:
///   OPENAI_API_KEY      API key (required for chat and embed)
///   OPENAI_TIMEOUT      seconds, or "connect,read" seconds (default 30)
///   OPENAI_BACKOFF      base backoff in seconds (default 2)
///   OPENAI_MAX_RETRIES  total attempts per request, including the first (default 6)
#[derive(Parser, Debug)]
#[command(author, version = env!("LLM_CLIENT_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Count the tokens in a text
    Count(CountArgs),

    /// Send a message to the chat completion endpoint
    Chat(ChatArgs),

    /// Print embedding vectors, one JSON array per text
    Embed(EmbedArgs),
}

#[derive(clap::Args, Debug)]
struct CountArgs {
    /// Encoding name, or pretrained tokenizer id/path with --pretrained
    #[arg(long, short = 't', default_value = "cl100k_base")]
    tokenizer: String,

    /// Use the pretrained (HuggingFace) tokenizer instead of tiktoken
    #[arg(long)]
    pretrained: bool,

    #[arg(value_name = "TEXT")]
    text: String,
}

#[derive(clap::Args, Debug)]
struct ChatArgs {
    /// Chat completions endpoint
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    #[arg(long, value_name = "NAME")]
    model: Option<String>,

    /// File with earlier turns ("Human: ..." / "Assistant: ..." lines)
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,

    /// Log the rendered prompt
    #[arg(long)]
    verbose: bool,

    #[arg(value_name = "MESSAGE")]
    message: String,
}

#[derive(clap::Args, Debug)]
struct EmbedArgs {
    /// Embeddings endpoint
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    #[arg(long, value_name = "NAME")]
    model: Option<String>,

    /// Count input tokens with tiktoken instead of the pretrained gpt2 tokenizer
    #[arg(long)]
    tiktoken: bool,

    #[arg(value_name = "TEXT", required = true)]
    texts: Vec<String>,
}

fn count(args: CountArgs) -> Result<usize> {
    let handle = tokenizer::load(&args.tokenizer, !args.pretrained)
        .with_context(|| format!("Failed to load tokenizer '{}'", args.tokenizer))?;
    Ok(handle.count(&args.text))
}

async fn chat<R: Runtime>(runtime: &R, args: ChatArgs) -> Result<String> {
    let client_config = ClientConfig::from_runtime(runtime)?;

    let mut config = ChatConfig {
        verbose: args.verbose,
        ..Default::default()
    };
    if let Some(url) = args.url {
        config.url = url;
    }
    if let Some(model) = args.model {
        config.model_name = model;
    }

    let history = match &args.history {
        Some(path) => runtime.read_to_string(path)?,
        None => String::new(),
    };

    let client = ChatClient::from_config(&client_config, config)?;
    let reply = client
        .complete(&args.message, &history)
        .await
        .context("Chat request failed")?;
    Ok(reply.content)
}

async fn embed<R: Runtime>(runtime: &R, args: EmbedArgs) -> Result<Vec<String>> {
    let client_config = ClientConfig::from_runtime(runtime)?;

    let mut config = EmbeddingConfig {
        use_tiktoken: args.tiktoken,
        ..Default::default()
    };
    if let Some(url) = args.url {
        config.url = url;
    }
    if let Some(model) = args.model {
        config.model = model;
    }

    let client = EmbeddingClient::from_config(&client_config, config)?;
    let vectors = client
        .embed(args.texts.as_slice())
        .await
        .context("Embedding request failed")?;

    vectors
        .iter()
        .map(|v| serde_json::to_string(v).context("Failed to encode embedding"))
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = RealRuntime;

    match cli.command {
        Commands::Count(args) => println!("{}", count(args)?),
        Commands::Chat(args) => println!("{}", chat(&runtime, args).await?),
        Commands::Embed(args) => {
            for line in embed(&runtime, args).await? {
                println!("{}", line);
            }
        }
    }
    Ok(())
}
