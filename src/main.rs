//! `realm-agent` command line.
//!
//! Resolves realm classpaths and exercises a realm against a TOML user directory.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use realm_agent::classpath::ClasspathResolver;
use realm_agent::config::{ConfigLoader, LoaderMode};
use realm_agent::engine::InMemoryEngine;
use realm_agent::logging::{init_logging, LogConfig};
use realm_agent::realm::RealmBuilder;
use realm_agent::IdentityTokenBridge;
use secrecy::SecretSlice;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroize;

/// Isolated realm plugin loader.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the realm config file.
    #[arg(short, long, global = true, env = "REALM_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter directive.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a classpath value and print its locations.
    Classpath {
        /// Classpath value; the configured classpath otherwise.
        value: Option<String>,

        /// Path-list delimiter; the platform's otherwise.
        #[arg(long)]
        separator: Option<String>,
    },

    /// Authenticate a user and print the issued token.
    Login {
        #[command(flatten)]
        realm: RealmArgs,

        /// Print the session as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Authenticate a user and check one role.
    CheckRole {
        #[command(flatten)]
        realm: RealmArgs,

        /// Role name, matched exactly.
        role: String,
    },

    /// List roles authorized for a user without a password check.
    Roles {
        /// TOML user directory.
        #[arg(short, long)]
        directory: PathBuf,

        user: String,

        #[arg(long, value_enum)]
        mode: Option<Mode>,
    },
}

#[derive(clap::Args, Debug)]
struct RealmArgs {
    /// TOML user directory.
    #[arg(short, long)]
    directory: PathBuf,

    /// User id.
    #[arg(short, long)]
    user: String,

    /// Password.
    #[arg(long, env = "REALM_PASSWORD", hide_env_values = true)]
    password: String,

    /// Comma-delimited roles to scope activation to.
    #[arg(long)]
    default_roles: Option<String>,

    #[arg(long, value_enum)]
    mode: Option<Mode>,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Mode {
    /// Child-first over the classpath.
    Isolated,
    /// Parent-first over the classpath.
    Delegating,
    /// Host types only.
    Host,
}

impl From<Mode> for LoaderMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Isolated => LoaderMode::Isolated,
            Mode::Delegating => LoaderMode::Delegating,
            Mode::Host => LoaderMode::Host,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = ConfigLoader::new()
        .load_from_file(args.config.clone())
        .load_from_env()
        .build()
        .context("failed to load realm configuration")?;
    let mut log_config = LogConfig::from_logging_config(&config.logging);
    if let Some(level) = args.log_level {
        log_config = log_config.with_level(level);
    }
    let _guard = init_logging(&log_config)?;

    match args.command {
        Command::Classpath { value, separator } => {
            let resolver = separator
                .map(ClasspathResolver::with_separator)
                .unwrap_or_default();
            let value = value
                .or(config.classpath)
                .context("no classpath given or configured")?;
            for location in resolver.resolve(&value)?.iter() {
                println!("{}", location);
            }
        }
        Command::Login { mut realm, json } => {
            let password = take_password(&mut realm);
            let facade = build_realm(config, &realm).await?;
            let token = facade
                .authenticate(&realm.user, &password)
                .await
                .context("access denied")?;
            let session = token.session().context("token carries no session")?;
            if json {
                println!("{}", serde_json::to_string_pretty(session.as_ref())?);
                return Ok(ExitCode::SUCCESS);
            }
            println!("subject:  {}", token.subject());
            println!("context:  {}", session.context_id);
            println!(
                "roles:    {}",
                session
                    .activated_roles
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(",")
            );
            let snapshot = IdentityTokenBridge::text_to_bytes(&token.to_string())?;
            println!("snapshot: {} bytes", snapshot.len());
        }
        Command::CheckRole { mut realm, role } => {
            let password = take_password(&mut realm);
            let facade = build_realm(config, &realm).await?;
            let granted = match facade
                .authenticate(&realm.user, &password)
                .await
            {
                Some(token) => facade.has_role(&token, &role).await,
                None => false,
            };
            println!("{}", if granted { "granted" } else { "denied" });
            if !granted {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Roles {
            directory,
            user,
            mode,
        } => {
            if let Some(mode) = mode {
                config.loader_mode = mode.into();
            }
            let engine = InMemoryEngine::from_toml_file(&directory).await?;
            let facade = RealmBuilder::new(config).engine(Arc::new(engine)).build()?;
            for role in facade.authorized_roles(&user).await? {
                println!("{}", role);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn build_realm(
    mut config: realm_agent::config::RealmConfig,
    args: &RealmArgs,
) -> Result<realm_agent::RealmFacade> {
    if let Some(mode) = args.mode {
        config.loader_mode = mode.into();
    }
    if args.default_roles.is_some() {
        config.default_roles = args.default_roles.clone();
    }
    debug!(directory = %args.directory.display(), "Loading user directory");
    let engine = InMemoryEngine::from_toml_file(&args.directory).await?;
    Ok(RealmBuilder::new(config).engine(Arc::new(engine)).build()?)
}

/// Move the password out of the parsed arguments, wiping the original
fn take_password(args: &mut RealmArgs) -> SecretSlice<u8> {
    let mut raw = std::mem::take(&mut args.password);
    let secret = SecretSlice::from(raw.as_bytes().to_vec());
    raw.zeroize();
    secret
}
