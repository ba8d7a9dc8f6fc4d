// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::PathBuf;
use std::sync::Arc;

use ampexp_core::cookie::MemoryCookieJar;
use ampexp_core::overrides::EXPERIMENT_COOKIE;
use ampexp_core::page::{Location, StaticDocument, OPT_IN_META, ORIGIN_TOKEN_META};
use ampexp_core::random::{OsRandom, SeededRandom};
use ampexp_core::{
    experiment_toggles, is_origin_experiment_on, toggle_experiment, Ed25519Verifier, HostConfig,
    Session,
};
use ampexp_token::{encode_token, signing_key_from_hex, TokenConfig, TokenEnvelope};
use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ampexpctl")]
#[command(about = "Inspect experiment cookies and origin-experiment tokens")]
struct Cli {
    #[arg(long, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    Token {
        #[command(subcommand)]
        cmd: TokenCmd,
    },
    /// Print the resolved state of every known experiment.
    Resolve {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Flip or set one experiment and print the rewritten cookie.
    Toggle {
        #[command(flatten)]
        page: PageArgs,
        #[arg(long)]
        name: String,
        #[arg(long, conflicts_with = "off")]
        on: bool,
        #[arg(long)]
        off: bool,
        #[arg(long)]
        transient: bool,
    },
}

#[derive(Subcommand)]
enum TokenCmd {
    Mint {
        /// Hex-encoded 32-byte Ed25519 seed.
        #[arg(long)]
        seed_hex: String,
        #[arg(long)]
        origin: String,
        #[arg(long)]
        experiment: String,
        #[arg(long, default_value_t = 30)]
        expires_in_days: i64,
    },
    /// Decode a token without checking its signature.
    Inspect {
        #[arg(long)]
        token: String,
    },
    Verify {
        #[arg(long)]
        public_key_hex: String,
        #[arg(long)]
        token: String,
        /// Page URL the token is presented on.
        #[arg(long)]
        url: String,
        #[arg(long)]
        experiment: String,
    },
}

#[derive(clap::Args)]
struct PageArgs {
    /// Flat host config JSON file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Current `AMP_EXP` cookie value.
    #[arg(long, default_value = "")]
    cookie: String,
    #[arg(long, default_value = "https://localhost/")]
    url: String,
    /// Comma-separated content of the document opt-in meta tag.
    #[arg(long)]
    opt_in: Option<String>,
    /// Seed for reproducible frequency draws.
    #[arg(long)]
    seed: Option<u64>,
}

impl PageArgs {
    fn session(&self, jar: MemoryCookieJar) -> Result<Session> {
        let config = match &self.config {
            Some(path) => HostConfig::load(path)
                .with_context(|| format!("failed to load host config {}", path.display()))?,
            None => HostConfig::default(),
        };
        let mut document = StaticDocument::new();
        if let Some(opt_in) = &self.opt_in {
            document = document.with_meta(OPT_IN_META, opt_in);
        }
        let builder = Session::builder(Location::parse(&self.url)?)
            .config(config)
            .document(document)
            .cookies(jar);
        let builder = match self.seed {
            Some(seed) => builder.random(SeededRandom::new(seed)),
            None => builder.random(OsRandom),
        };
        Ok(builder.build())
    }

    fn jar(&self) -> MemoryCookieJar {
        let jar = MemoryCookieJar::new();
        if self.cookie.is_empty() {
            jar
        } else {
            jar.with_cookie(EXPERIMENT_COOKIE, &self.cookie)
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .with_writer(std::io::stderr)
        .init();

    let out = match cli.cmd {
        Command::Token { cmd } => run_token(cmd).await,
        Command::Resolve { page } => run_resolve(&page),
        Command::Toggle {
            page,
            name,
            on,
            off,
            transient,
        } => {
            let force = match (on, off) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            run_toggle(&page, &name, force, transient)
        }
    };
    match out {
        Ok(v) => println!("{v}"),
        Err(err) => {
            println!("{}", json!({"error": format!("{err:#}")}));
            std::process::exit(1);
        }
    }
}

async fn run_token(cmd: TokenCmd) -> Result<Value> {
    match cmd {
        TokenCmd::Mint {
            seed_hex,
            origin,
            experiment,
            expires_in_days,
        } => {
            let key = signing_key_from_hex(&seed_hex)?;
            let expiration = Duration::try_days(expires_in_days)
                .and_then(|ttl| Utc::now().checked_add_signed(ttl))
                .ok_or_else(|| anyhow!("expiration out of range"))?
                .timestamp_millis();
            let config = TokenConfig::new(origin, experiment, expiration);
            let token = encode_token(&config, &key)?;
            Ok(json!({
                "token": token,
                "config": config,
                "public_key_hex": hex::encode(key.verifying_key().to_bytes()),
            }))
        }
        TokenCmd::Inspect { token } => {
            let envelope = TokenEnvelope::decode(&token)?;
            let config = envelope.config()?;
            Ok(json!({
                "version": envelope.version(),
                "config": config,
                "signature_hex": hex::encode(envelope.signature()),
            }))
        }
        TokenCmd::Verify {
            public_key_hex,
            token,
            url,
            experiment,
        } => {
            let verifier = Arc::new(Ed25519Verifier::from_hex(&public_key_hex)?);
            let location = Location::parse(&url)?;
            let origin = location.origin();
            let mut session = Session::builder(location)
                .document(StaticDocument::new().with_meta(ORIGIN_TOKEN_META, &token))
                .verifier(verifier)
                .build();
            let enabled = is_origin_experiment_on(&mut session, &experiment, false).await;
            tracing::debug!(origin = %origin, experiment = %experiment, enabled, "verified token");
            Ok(json!({
                "origin": origin,
                "experiment": experiment,
                "enabled": enabled,
            }))
        }
    }
}

fn run_resolve(page: &PageArgs) -> Result<Value> {
    let mut session = page.session(page.jar())?;
    let toggles = experiment_toggles(&mut session);
    Ok(json!({
        "experiments": toggles,
        "canary": session.config().is_canary(),
        "binary_type": session.config().binary_type(),
    }))
}

fn run_toggle(page: &PageArgs, name: &str, force: Option<bool>, transient: bool) -> Result<Value> {
    let jar = page.jar();
    let mut session = page.session(jar.clone())?;
    let on = toggle_experiment(&mut session, name, force, transient);
    let stored = jar.stored(EXPERIMENT_COOKIE);
    let set_cookie = stored
        .as_ref()
        .and_then(|cookie| {
            cookie
                .attributes
                .as_ref()
                .map(|attrs| attrs.set_cookie_header(EXPERIMENT_COOKIE, &cookie.value))
        });
    Ok(json!({
        "experiment": name,
        "on": on,
        "cookie": stored.map(|cookie| cookie.value),
        "set_cookie": set_cookie,
    }))
}
