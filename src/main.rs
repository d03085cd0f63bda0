use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use readahead::auth::AuthError;
use readahead::config::{AppConfig, ConfigError};
use readahead::context::{AppContext, ContextError};
use readahead::library::{Book, ListKind, add_book, remove_book};
use readahead::storage::StoreError;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("output encoding failed: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "readahead", about = "Keep track of liked books and a reading list")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the signed-in user.
    Whoami,
    /// Sign in with email and password.
    SignIn(Credentials),
    /// Create an account and sign in.
    SignUp(Credentials),
    /// Forget the stored session.
    SignOut,
    /// Add a book to the liked list.
    Like(BookArgs),
    /// Remove a book from the liked list.
    Unlike { id: String },
    /// Manage the reading list.
    Readlist {
        #[command(subcommand)]
        action: ReadlistAction,
    },
    /// Print a list (`liked` or `readlist`).
    List {
        kind: ListKind,
        #[arg(long)]
        json: bool,
    },
    /// Upload both lists to your account.
    Push,
    /// Replace local lists with the ones stored in your account.
    Pull,
}

#[derive(Subcommand, Debug)]
enum ReadlistAction {
    Add(BookArgs),
    Remove { id: String },
}

#[derive(Args, Debug)]
struct Credentials {
    #[arg(long)]
    email: String,
    #[arg(long, env = "READAHEAD_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args, Debug)]
struct BookArgs {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long = "author")]
    authors: Vec<String>,
}

impl BookArgs {
    fn into_book(self) -> Book {
        let mut book = Book::new(self.id).with_authors(self.authors);
        book.title = self.title;
        book
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), CliError> {
    let ctx = AppContext::init(AppConfig::from_env()?)?;
    let library = ctx.library();

    match command {
        Command::Whoami => match ctx.mirror().snapshot() {
            Some(user) => println!("{} {}", user.uid, user.email.unwrap_or_default()),
            None => println!("not signed in"),
        },
        Command::SignIn(c) => {
            let user = ctx.auth().sign_in_with_password(&c.email, &c.password).await?;
            println!("signed in as {}", user.uid);
        }
        Command::SignUp(c) => {
            let user = ctx.auth().sign_up(&c.email, &c.password).await?;
            println!("created account {}", user.uid);
        }
        Command::SignOut => {
            ctx.auth().sign_out()?;
            println!("signed out");
        }
        Command::Like(args) => report(add_book(library.liked(), args.into_book())?, "liked", "already liked"),
        Command::Unlike { id } => report(remove_book(library.liked(), &id)?, "removed", "not in liked"),
        Command::Readlist { action: ReadlistAction::Add(args) } => {
            report(add_book(library.readlist(), args.into_book())?, "added", "already on readlist");
        }
        Command::Readlist { action: ReadlistAction::Remove { id } } => {
            report(remove_book(library.readlist(), &id)?, "removed", "not on readlist");
        }
        Command::List { kind, json } => {
            let books = library.list(kind).get();
            if json {
                println!("{}", serde_json::to_string_pretty(&books)?);
            } else {
                for book in &books {
                    println!("{book}");
                }
            }
        }
        Command::Push => {
            ctx.push().await?;
            println!("pushed");
        }
        Command::Pull => {
            let summary = ctx.pull().await?;
            if summary.found {
                println!("pulled {} liked, {} on readlist", summary.liked, summary.readlist);
            } else {
                println!("nothing stored remotely");
            }
        }
    }
    Ok(())
}

fn report(changed: bool, done: &str, unchanged: &str) {
    println!("{}", if changed { done } else { unchanged });
}
