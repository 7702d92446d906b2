mod client;
mod session;

use clap::{Parser, Subcommand};
use client::NexusClient;
use session::SessionStore;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "spike-admin")]
#[command(about = "Admin CLI for SPIKE Nexus")]
struct Cli {
    /// Nexus admin API base URL
    #[arg(long, env = "SPIKE_NEXUS_URL", default_value = "http://127.0.0.1:8553")]
    nexus_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the admin password and generate the first root key
    Init,
    /// Log in and save the session token
    Login,
    /// Forget the saved session token
    Logout,
    /// Show initialization and root key availability
    Status,
    /// Show per-Keeper replication status
    Keepers,
    /// Recover the root key from Keepers
    Recover,
    /// Replace the root key with a fresh one
    RotateRootKey,
    /// Change the admin password
    ChangePassword,
}

fn read_password(prompt: &str) -> anyhow::Result<Zeroizing<String>> {
    let password = Zeroizing::new(rpassword::read_password_from_tty(Some(prompt))?);
    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    Ok(password)
}

fn read_new_password() -> anyhow::Result<Zeroizing<String>> {
    let password = read_password("New admin password: ")?;
    let confirm = read_password("Confirm password: ")?;
    if *password != *confirm {
        anyhow::bail!("passwords do not match");
    }
    Ok(password)
}

fn session_token(store: &SessionStore) -> anyhow::Result<Zeroizing<String>> {
    store
        .load()?
        .ok_or_else(|| anyhow::anyhow!("not logged in; run `spike-admin login` first"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let client = NexusClient::new(&cli.nexus_url);
    let store = SessionStore::new()?;

    match cli.command {
        Commands::Init => {
            let password = read_new_password()?;
            let resp = client.init(&password).await?;
            println!("Nexus initialized (root key epoch {})", resp.epoch);
        }
        Commands::Login => {
            let password = read_password("Admin password: ")?;
            let token = Zeroizing::new(client.login(&password).await?);
            store.save(&token)?;
            println!("Logged in");
        }
        Commands::Logout => {
            store.clear()?;
            println!("Logged out");
        }
        Commands::Status => {
            let status = client.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Keepers => {
            let token = session_token(&store)?;
            let keepers = client.keepers(&token).await?;
            println!("{}", serde_json::to_string_pretty(&keepers)?);
        }
        Commands::Recover => {
            let token = session_token(&store)?;
            let resp = client.recover(&token).await?;
            println!("Root key available (epoch {})", resp.epoch);
        }
        Commands::RotateRootKey => {
            let token = session_token(&store)?;
            let resp = client.rotate_root_key(&token).await?;
            println!("Root key rotated (epoch {})", resp.epoch);
        }
        Commands::ChangePassword => {
            let token = session_token(&store)?;
            let password = read_new_password()?;
            client.change_password(&token, &password).await?;
            println!("Password changed; existing sessions remain valid until they expire");
        }
    }

    Ok(())
}
