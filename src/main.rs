use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use lexcrm_api::commands::{self, Options, token};
use lexcrm_api::http::{Method, user_message_for};

/// lexcrm-api - command-line client for the LexCRM backend API
///
/// Sends authenticated requests to the CRM services. The bearer token is read
/// from the session file (see `token set`) and cleared when the API rejects it.
///
/// Examples:
///   lexcrm-api token set eyJhbGciOi...
///   lexcrm-api get /clientes -q page=2
///   lexcrm-api post /clientes --data '{"nome": "Ana"}'
///   lexcrm-api download /documentos/42/arquivo --output contrato.pdf
#[derive(Parser, Debug)]
#[command(author, version = env!("LEXCRM_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the API (defaults to http://localhost:3001/api)
    #[arg(long = "base-url", env = "LEXCRM_API_URL", value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Per-attempt timeout in milliseconds
    #[arg(long = "timeout-ms", value_name = "MS", global = true)]
    pub timeout_ms: Option<u64>,

    /// How many times a failed request is retried
    #[arg(long, value_name = "N", global = true)]
    pub retries: Option<u32>,

    /// Session file holding the bearer token
    #[arg(
        long = "token-file",
        env = "LEXCRM_TOKEN_FILE",
        value_name = "PATH",
        global = true
    )]
    pub token_file: Option<PathBuf>,

    /// Extra request header, may be repeated
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE", global = true)]
    pub headers: Vec<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Send a GET request and print the body
    Get(QueryArgs),

    /// Send a DELETE request and print the body
    Delete(QueryArgs),

    /// Send a POST request with a JSON body
    Post(BodyArgs),

    /// Send a PUT request with a JSON body
    Put(BodyArgs),

    /// Send a PATCH request with a JSON body
    Patch(BodyArgs),

    /// Upload a file as multipart form data
    Upload(UploadArgs),

    /// Download a response body to a file
    Download(DownloadArgs),

    /// Manage the stored bearer token
    Token {
        #[command(subcommand)]
        action: TokenCommand,
    },
}

#[derive(clap::Args, Debug)]
pub struct QueryArgs {
    /// Endpoint path appended to the base URL, e.g. /clientes/42
    pub endpoint: String,

    /// Query parameter, may be repeated
    #[arg(short = 'q', long = "query", value_name = "KEY=VALUE")]
    pub query: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct BodyArgs {
    pub endpoint: String,

    /// JSON request body
    #[arg(short = 'd', long, value_name = "JSON")]
    pub data: Option<String>,

    #[arg(short = 'q', long = "query", value_name = "KEY=VALUE")]
    pub query: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    pub endpoint: String,

    /// File to upload
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    pub endpoint: String,

    /// Where to write the body
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: PathBuf,

    #[arg(short = 'q', long = "query", value_name = "KEY=VALUE")]
    pub query: Vec<String>,
}

#[derive(clap::Subcommand, Debug)]
enum TokenCommand {
    /// Store a bearer token
    Set {
        #[arg(value_name = "TOKEN")]
        value: String,
    },

    /// Remove the stored token
    Clear,

    /// Print the stored token
    Show,
}

impl Cli {
    fn options(&self) -> Options {
        Options {
            base_url: self.base_url.clone(),
            timeout_ms: self.timeout_ms,
            retries: self.retries,
            token_file: self.token_file.clone(),
            headers: self.headers.clone(),
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let options = cli.options();

    match cli.command {
        Commands::Get(args) => {
            commands::fetch(&options, Method::GET, &args.endpoint, &args.query, None).await
        }
        Commands::Delete(args) => {
            commands::fetch(&options, Method::DELETE, &args.endpoint, &args.query, None).await
        }
        Commands::Post(args) => send(&options, Method::POST, args).await,
        Commands::Put(args) => send(&options, Method::PUT, args).await,
        Commands::Patch(args) => send(&options, Method::PATCH, args).await,
        Commands::Upload(args) => commands::upload(&options, &args.endpoint, &args.file).await,
        Commands::Download(args) => {
            commands::download(&options, &args.endpoint, &args.query, &args.output).await
        }
        Commands::Token { action } => match action {
            TokenCommand::Set { value } => token::set(&options, &value),
            TokenCommand::Clear => token::clear(&options),
            TokenCommand::Show => token::show(&options),
        },
    }
}

async fn send(options: &Options, method: Method, args: BodyArgs) -> Result<()> {
    commands::fetch(
        options,
        method,
        &args.endpoint,
        &args.query,
        args.data.as_deref(),
    )
    .await
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error: &(dyn std::error::Error + 'static) = e.as_ref();
            eprintln!("{}", user_message_for(error));
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
